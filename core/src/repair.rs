//! `LogRepair` — byte-exact range extraction and fixed-rule text repair for
//! malformed multi-line log entries (spec.md §4.8, §6).

use crate::error::RepairError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A single-line literal substitution (spec.md §6 "Patches").
struct LineSubstitution {
    find: &'static str,
    replace: &'static str,
}

const SINGLE_LINE_SUBSTITUTIONS: &[LineSubstitution] = &[LineSubstitution {
    find: "Rehona, Sister of the Qowat Milat",
    replace: "Rehona - Sister of the Qowat Milat",
}];

/// A fold-N-lines-into-one rule: lines starting with `identifier` are
/// accumulated for `span` consecutive (non-empty) lines, joined with
/// internal whitespace stripped, and replaced wholesale if the joined form
/// contains `pattern` (spec.md §6, §4.8).
struct MultiLineRule {
    identifier: &'static str,
    pattern: &'static str,
    replacement: &'static str,
    span: usize,
}

const MULTI_LINE_RULES: &[MultiLineRule] = &[MultiLineRule {
    identifier: "\"Nanite Infection",
    pattern: "Nanite Infection<br>Causes damage to nearby players and Kobayashi Maru",
    replacement: "\"Nanite Infection - Causes damage to nearby players and Kobayashi Maru\"",
    span: 3,
}];

pub struct LogRepair;

impl LogRepair {
    /// Copies bytes `[start, end)` from `src` into `dst`, transparently
    /// inflating gzip input first (spec.md §4.8).
    pub fn extract_bytes(src: &Path, dst: &Path, start: u64, end: u64) -> Result<(), RepairError> {
        let data = Self::read_span(src, start, end)?;
        let mut out = File::create(dst).map_err(|e| RepairError::Io { path: dst.to_path_buf(), source: e })?;
        out.write_all(&data).map_err(|e| RepairError::Io { path: dst.to_path_buf(), source: e })
    }

    /// Copies several disjoint byte intervals from `src`, concatenated in
    /// order, into `dst` via a temp file that is then atomically renamed
    /// into place (spec.md §4.8).
    pub fn compose_logfile(src: &Path, dst: &Path, intervals: &[(u64, u64)]) -> Result<(), RepairError> {
        let tempdir = dst.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = tempdir.join(format!(".{}.tmp", dst.file_name().and_then(|n| n.to_str()).unwrap_or("compose")));
        {
            let mut temp = File::create(&temp_path).map_err(|e| RepairError::Io { path: temp_path.clone(), source: e })?;
            for &(start, end) in intervals {
                let chunk = Self::read_span(src, start, end)?;
                temp.write_all(&chunk).map_err(|e| RepairError::Io { path: temp_path.clone(), source: e })?;
            }
        }
        std::fs::rename(&temp_path, dst).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                RepairError::Permission { path: dst.to_path_buf(), temp_path: temp_path.clone() }
            } else {
                RepairError::Io { path: dst.to_path_buf(), source: e }
            }
        })
    }

    /// Scans `path` and applies the fixed substitution/fold rules, writing
    /// the repaired text into a file under `tempdir` and atomically
    /// replacing `path` with it. Returns the final path (`path` itself) on
    /// success; the temp file survives a `PermissionError` so no work is
    /// lost (spec.md §4.8, §7).
    pub fn repair_logfile(path: &Path, tempdir: &Path) -> Result<PathBuf, RepairError> {
        let file = File::open(path).map_err(|e| RepairError::Io { path: path.to_path_buf(), source: e })?;
        let reader = BufReader::new(file);
        let lines: Vec<String> = reader
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepairError::Io { path: path.to_path_buf(), source: e })?
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect();

        let repaired = apply_rules(&lines);

        std::fs::create_dir_all(tempdir).map_err(|e| RepairError::Io { path: tempdir.to_path_buf(), source: e })?;
        let temp_path = tempdir.join(format!(
            "{}.repair.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("log")
        ));
        {
            let mut temp = File::create(&temp_path).map_err(|e| RepairError::Io { path: temp_path.clone(), source: e })?;
            for line in &repaired {
                writeln!(temp, "{line}").map_err(|e| RepairError::Io { path: temp_path.clone(), source: e })?;
            }
        }

        std::fs::rename(&temp_path, path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                RepairError::Permission { path: path.to_path_buf(), temp_path: temp_path.clone() }
            } else {
                RepairError::Io { path: path.to_path_buf(), source: e }
            }
        })?;
        Ok(path.to_path_buf())
    }

    fn read_span(src: &Path, start: u64, end: u64) -> Result<Vec<u8>, RepairError> {
        if start > end {
            return Err(RepairError::InvalidRange { path: src.to_path_buf(), start, end });
        }

        let mut file = File::open(src).map_err(|e| RepairError::Io { path: src.to_path_buf(), source: e })?;
        let mut magic = [0u8; 2];
        let peeked = file.read(&mut magic).map_err(|e| RepairError::Io { path: src.to_path_buf(), source: e })?;
        file.seek(SeekFrom::Start(0)).map_err(|e| RepairError::Io { path: src.to_path_buf(), source: e })?;

        let full = if peeked == 2 && magic == GZIP_MAGIC {
            let mut decoder = GzDecoder::new(file);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf).map_err(|e| RepairError::Io { path: src.to_path_buf(), source: e })?;
            buf
        } else {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).map_err(|e| RepairError::Io { path: src.to_path_buf(), source: e })?;
            buf
        };

        let start = (start as usize).min(full.len());
        let end = (end as usize).min(full.len());
        Ok(full[start..end].to_vec())
    }
}

fn apply_rules(lines: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if let Some(rule) = MULTI_LINE_RULES.iter().find(|r| line.starts_with(r.identifier)) {
            if i + rule.span <= lines.len() {
                let joined: String = lines[i..i + rule.span].iter().map(|l| l.trim()).collect();
                if joined.contains(rule.pattern) {
                    out.push(rule.replacement.to_string());
                    i += rule.span;
                    continue;
                }
            }
        }
        out.push(apply_single_line_substitutions(line));
        i += 1;
    }
    out
}

fn apply_single_line_substitutions(line: &str) -> String {
    let mut result = line.to_string();
    for sub in SINGLE_LINE_SUBSTITUTIONS {
        if result.contains(sub.find) {
            result = result.replace(sub.find, sub.replace);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn single_line_rule_replaces_comma_with_dash() {
        let lines = vec!["Rehona, Sister of the Qowat Milat appears".to_string()];
        let repaired = apply_rules(&lines);
        assert_eq!(repaired, vec!["Rehona - Sister of the Qowat Milat appears".to_string()]);
    }

    #[test]
    fn nanite_infection_three_lines_fold_into_one() {
        let lines = vec![
            "\"Nanite Infection".to_string(),
            "<br>Causes damage to nearby players and".to_string(),
            "Kobayashi Maru\"".to_string(),
        ];
        let repaired = apply_rules(&lines);
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0], "\"Nanite Infection - Causes damage to nearby players and Kobayashi Maru\"");
    }

    #[test]
    fn unrelated_lines_pass_through_unchanged() {
        let lines = vec!["24:03:15:12:00:00.0::a,b,c,d,e,f,g,h,i,j,1,2".to_string()];
        let repaired = apply_rules(&lines);
        assert_eq!(repaired, lines);
    }

    #[test]
    fn extract_bytes_rejects_inverted_range() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.log");
        std::fs::write(&src, b"0123456789").unwrap();
        let dst = dir.path().join("dst.log");
        let err = LogRepair::extract_bytes(&src, &dst, 5, 2).unwrap_err();
        assert!(matches!(err, RepairError::InvalidRange { start: 5, end: 2, .. }));
        assert!(!dst.exists());
    }

    #[test]
    fn extract_bytes_copies_plain_span() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.log");
        std::fs::write(&src, b"0123456789").unwrap();
        let dst = dir.path().join("dst.log");
        LogRepair::extract_bytes(&src, &dst, 2, 5).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"234");
    }

    #[test]
    fn repair_logfile_drops_empty_lines_and_rewrites_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("combat.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "24:03:15:12:00:00.0::a,b,c,d,e,f,g,h,i,j,1,2").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "Rehona, Sister of the Qowat Milat arrives").unwrap();
        drop(file);

        let tempdir_path = dir.path().join("tmp");
        LogRepair::repair_logfile(&path, &tempdir_path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "Rehona - Sister of the Qowat Milat arrives");
    }
}
