//! `BackwardReader` — yields log lines from end-of-file toward the start in
//! bounded memory (spec.md §4.1).
//!
//! Grounded on `original_source/OSCR/oscr_read_file_backwards.py`: read a
//! fixed-size block ending at the current cursor, prepend any leftover
//! partial line from the previous (later) block, split on `\n`, keep the
//! leftmost partial line as the new remainder, and yield the rest in
//! reverse. Adapted from `core/src/combat_log/reader.rs`'s line-boundary
//! scanning (which uses `memchr` over an mmap'd forward buffer) — here the
//! buffer is read backward with plain `Read + Seek` instead of mmap, since
//! the contract explicitly forbids materializing the whole file.
//!
//! Gzip inputs (detected via the 0x1f 0x8b magic, spec.md §4.1) cannot be
//! seeked directly; they are transparently inflated once into a scratch
//! temp file at `open()` time and then treated identically to a plain file.
//! This keeps the steady-state memory bounded to one block even though the
//! initial inflate pass is sequential — documented as a deliberate,
//! pragmatic resolution in DESIGN.md.

use crate::error::ReaderError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const DEFAULT_BLOCK_SIZE: usize = 80 * 1024;

pub struct BackwardReader {
    file: File,
    path: PathBuf,
    filesize: u64,
    offset: u64,
    block_size: usize,
    /// Absolute byte position in `file` marking the start of the region not
    /// yet loaded into `remainder`/`pending`.
    position: u64,
    /// Leftover partial line bytes from the block closer to EOF.
    remainder: Vec<u8>,
    /// Buffered lines ready to yield, in reverse-chronological (yield) order.
    pending: std::collections::VecDeque<String>,
    bytes_yielded: u64,
    last_yielded_len: u64,
    exhausted: bool,
    _gz_temp: Option<PathBuf>,
}

impl BackwardReader {
    /// Opens `path` and positions the cursor `offset` bytes before
    /// end-of-file. `offset = 0` starts at the very end of the file.
    pub fn open(path: &Path, offset: u64) -> Result<Self, ReaderError> {
        Self::open_with_block_size(path, offset, DEFAULT_BLOCK_SIZE)
    }

    pub fn open_with_block_size(
        path: &Path,
        offset: u64,
        block_size: usize,
    ) -> Result<Self, ReaderError> {
        if !path.exists() {
            return Err(ReaderError::PathNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(ReaderError::NotAFile(path.to_path_buf()));
        }

        let mut raw = File::open(path).map_err(|e| ReaderError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut magic = [0u8; 2];
        let is_gzip = raw.read(&mut magic).map(|n| n == 2 && magic == [0x1f, 0x8b]).unwrap_or(false);

        let (mut file, gz_temp) = if is_gzip {
            let temp_path = path.with_extension("oscr-inflated-tmp");
            let mut decoder = GzDecoder::new(File::open(path).map_err(|e| ReaderError::Io {
                path: path.to_path_buf(),
                source: e,
            })?);
            let mut out = File::create(&temp_path).map_err(|e| ReaderError::Io {
                path: temp_path.clone(),
                source: e,
            })?;
            std::io::copy(&mut decoder, &mut out).map_err(|e| ReaderError::Io {
                path: temp_path.clone(),
                source: e,
            })?;
            drop(out);
            let f = File::open(&temp_path).map_err(|e| ReaderError::Io {
                path: temp_path.clone(),
                source: e,
            })?;
            (f, Some(temp_path))
        } else {
            raw.rewind().map_err(|e| ReaderError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            (raw, None)
        };

        let filesize = file
            .seek(SeekFrom::End(0))
            .map_err(|e| ReaderError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        if filesize == 0 {
            return Err(ReaderError::EmptyLog(path.to_path_buf()));
        }

        let position = filesize.saturating_sub(offset);
        file.seek(SeekFrom::Start(position)).map_err(|e| ReaderError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(BackwardReader {
            file,
            path: path.to_path_buf(),
            filesize,
            offset,
            block_size,
            position,
            remainder: Vec::new(),
            pending: std::collections::VecDeque::new(),
            bytes_yielded: 0,
            last_yielded_len: 0,
            exhausted: false,
            _gz_temp: gz_temp,
        })
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    /// Bytes not yet consumed from the start of the file (current cursor).
    pub fn byte_position(&self) -> u64 {
        self.position
    }

    /// Bytes consumed by this reading session (excludes the initial
    /// `offset` skip), optionally excluding the most recently yielded line
    /// so a caller can mark a resume point that doesn't depend on whether
    /// that line is itself complete (spec.md §4.1).
    pub fn bytes_read(&self, ignore_last_line: bool) -> u64 {
        if ignore_last_line {
            self.bytes_yielded.saturating_sub(self.last_yielded_len)
        } else {
            self.bytes_yielded
        }
    }

    fn fill_chunk(&mut self) -> Result<bool, ReaderError> {
        if self.position == 0 {
            if self.remainder.is_empty() {
                return Ok(false);
            }
            let text = String::from_utf8_lossy(&self.remainder).into_owned();
            self.remainder.clear();
            if !text.is_empty() {
                self.pending.push_back(text);
            }
            return Ok(!self.pending.is_empty());
        }

        let read_len = self.block_size.min(self.position as usize);
        let new_position = self.position - read_len as u64;
        self.file.seek(SeekFrom::Start(new_position)).map_err(|e| ReaderError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let mut buf = vec![0u8; read_len];
        self.file.read_exact(&mut buf).map_err(|e| ReaderError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        buf.extend_from_slice(&self.remainder);
        self.remainder.clear();
        self.position = new_position;

        if new_position == 0 {
            // Entire remaining file is in `buf`; flush every line.
            let text = String::from_utf8_lossy(&buf).into_owned();
            for line in text.split_inclusive('\n').rev() {
                if !line.is_empty() {
                    self.pending.push_back(line.to_string());
                }
            }
            return Ok(!self.pending.is_empty());
        }

        match buf.iter().position(|&b| b == b'\n') {
            Some(idx) => {
                self.remainder = buf[..=idx].to_vec();
                let rest = &buf[idx + 1..];
                let text = String::from_utf8_lossy(rest).into_owned();
                for line in text.split_inclusive('\n').rev() {
                    if !line.is_empty() {
                        self.pending.push_back(line.to_string());
                    }
                }
            }
            None => {
                // No newline in this block yet; keep accumulating.
                self.remainder = buf;
            }
        }

        Ok(!self.pending.is_empty() || self.position > 0 || !self.remainder.is_empty())
    }

    fn next_inner(&mut self) -> Result<Option<String>, ReaderError> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                self.last_yielded_len = line.len() as u64;
                self.bytes_yielded += self.last_yielded_len;
                return Ok(Some(line));
            }
            if self.exhausted {
                return Ok(None);
            }
            if !self.fill_chunk()? {
                self.exhausted = true;
                return Ok(None);
            }
        }
    }
}

impl Iterator for BackwardReader {
    type Item = Result<String, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_inner().transpose()
    }
}

impl Drop for BackwardReader {
    fn drop(&mut self) {
        if let Some(path) = self._gz_temp.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut f = File::create(path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
    }

    #[test]
    fn yields_lines_in_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        write_lines(&path, &["one", "two", "three"]);

        let reader = BackwardReader::open(&path, 0).unwrap();
        let lines: Vec<String> = reader.map(|r| r.unwrap().trim_end().to_string()).collect();
        assert_eq!(lines, vec!["three", "two", "one"]);
    }

    #[test]
    fn byte_accounting_sums_to_file_minus_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        write_lines(&path, &["alpha", "beta", "gamma", "delta"]);
        let filesize = std::fs::metadata(&path).unwrap().len();

        let offset = 0u64;
        let mut reader = BackwardReader::open(&path, offset).unwrap();
        let mut total = 0u64;
        while let Some(line) = reader.next() {
            total += line.unwrap().len() as u64;
        }
        assert_eq!(total, filesize - offset);
    }

    #[test]
    fn works_across_small_block_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let many: Vec<String> = (0..200).map(|i| format!("line-{i}")).collect();
        let refs: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
        write_lines(&path, &refs);

        let reader = BackwardReader::open_with_block_size(&path, 0, 37).unwrap();
        let lines: Vec<String> = reader.map(|r| r.unwrap().trim_end().to_string()).collect();
        let expected: Vec<String> = many.into_iter().rev().collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        assert!(matches!(
            BackwardReader::open(&path, 0),
            Err(ReaderError::PathNotFound(_))
        ));
    }

    #[test]
    fn empty_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        File::create(&path).unwrap();
        assert!(matches!(BackwardReader::open(&path, 0), Err(ReaderError::EmptyLog(_))));
    }
}
