//! `Orchestrator` — the public façade: drives the `BackwardReader` and
//! `CombatSplitter` to isolate combats, dispatches them to a worker pool
//! running the `Analyzer`, and caches results by combat id (spec.md §2,
//! §5).
//!
//! Grounded on `core/src/combat_log/reader.rs`'s `par_iter` worker fan-out
//! (here: a dedicated `rayon::ThreadPool` sized to the configured worker
//! count, analyzing each isolated `Combat` independently) and on the
//! teacher's `Arc`-cached session state for the combat cache.

use crate::analyzer::Analyzer;
use crate::combat::Combat;
use crate::error::Error;
use crate::line::LogLineCodec;
use crate::live::{LiveParser, SnapshotCallback};
use crate::mapdetect::Difficulty;
use crate::reader::BackwardReader;
use crate::repair::LogRepair;
use crate::splitter::{CombatSplitter, SplitterConfig};
use chrono::NaiveDateTime;
use logfathom_types::Settings;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lightweight summary returned by [`Orchestrator::analyze`], cheap to
/// clone for display without holding onto the full `Combat` (spec.md §6
/// CLI "combats" listing).
#[derive(Debug, Clone)]
pub struct CombatSummary {
    pub id: u64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub map: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub line_count: usize,
}

impl From<&Combat> for CombatSummary {
    fn from(combat: &Combat) -> Self {
        CombatSummary {
            id: combat.id,
            start_time: combat.start_time,
            end_time: combat.end_time,
            map: combat.map.clone(),
            difficulty: combat.difficulty,
            line_count: combat.log_data.len(),
        }
    }
}

pub struct Orchestrator {
    settings: Settings,
    tempdir: PathBuf,
    combats: HashMap<u64, Arc<Combat>>,
    next_sequence: u64,
    pool: rayon::ThreadPool,
}

impl Orchestrator {
    /// Wipes and recreates the owned temp directory and spins up the
    /// worker pool (spec.md §5 "Shared resources").
    pub fn new(settings: Settings, worker_count: usize) -> Result<Self, Error> {
        let tempdir = if settings.templog_folder_path.is_empty() {
            std::env::temp_dir().join("logfathom")
        } else {
            PathBuf::from(&settings.templog_folder_path)
        };
        if tempdir.exists() {
            std::fs::remove_dir_all(&tempdir).map_err(Error::Io)?;
        }
        std::fs::create_dir_all(&tempdir).map_err(Error::Io)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        Ok(Orchestrator { settings, tempdir, combats: HashMap::new(), next_sequence: 0, pool })
    }

    pub fn with_default_settings() -> Result<Self, Error> {
        Self::new(Settings::default(), 4)
    }

    pub fn tempdir(&self) -> &Path {
        &self.tempdir
    }

    /// Isolates up to `combats_to_parse` combats from `path` and analyzes
    /// each on the worker pool, caching the results (spec.md §2, §5).
    pub fn analyze(&mut self, path: &Path) -> Result<Vec<CombatSummary>, Error> {
        let n = self.settings.combats_to_parse as usize;
        let mut combats = self.isolate(path, n)?;

        let graph_resolution = self.settings.graph_resolution;
        self.pool.install(|| {
            combats.par_iter_mut().for_each(|combat| {
                if let Err(error) = Analyzer::analyze(combat, graph_resolution) {
                    tracing::warn!(%error, combat_id = combat.id, "analyzer failed");
                }
            });
        });

        let summaries: Vec<CombatSummary> = combats.iter().map(CombatSummary::from).collect();
        for combat in combats {
            self.combats.insert(combat.id, Arc::new(combat));
        }
        Ok(summaries)
    }

    /// Drives `BackwardReader` + `CombatSplitter` to produce up to `n`
    /// combats from `path`, in temporal order (id 0 earliest), without
    /// running the `Analyzer` (spec.md §2 control flow).
    pub fn isolate(&mut self, path: &Path, n: usize) -> Result<Vec<Combat>, Error> {
        let mut reader = BackwardReader::open(path, 0)?;
        let filesize = reader.filesize();
        let mut splitter = CombatSplitter::new(SplitterConfig {
            inactivity_gap: self.settings.inactivity_gap(),
            combat_min_lines: self.settings.combat_min_lines,
            banned_event_names: self.settings.banned_event_names.clone(),
            max_combats: Some(n),
        });

        let mut spans = Vec::new();
        while let Some(raw) = reader.next() {
            let raw = raw?;
            let consumed = reader.bytes_read(false);
            let start_byte = filesize.saturating_sub(consumed);

            let line = LogLineCodec::parse(&raw)?;
            if self.settings.excluded_event_ids.iter().any(|id| id == &line.event_id) {
                continue;
            }

            if let Some(span) = splitter.push(line, start_byte) {
                spans.push(span);
                if spans.len() >= n {
                    break;
                }
            }
        }
        if spans.len() < n {
            if let Some(span) = splitter.finish() {
                spans.push(span);
            }
        }

        let total = spans.len();
        let mut combats = Vec::with_capacity(total);
        for (discovery_index, span) in spans.into_iter().enumerate() {
            if span.lines.is_empty() {
                continue;
            }
            // Discovery proceeds from end-of-file backward, so the first
            // span found is the most recent combat; ids run earliest-first
            // (spec.md §8 scenario 2).
            let id = (total - 1 - discovery_index) as u64;
            let sequence_id = self.next_sequence;
            self.next_sequence += 1;

            let mut lines: Vec<_> = span.lines.into_iter().collect();
            lines.reverse();
            let start_time = lines[0].timestamp;
            let end_time = lines[lines.len() - 1].timestamp;

            combats.push(Combat::new(
                id,
                sequence_id,
                path.to_path_buf(),
                (span.start_byte, span.end_byte),
                start_time,
                end_time,
                self.settings.graph_resolution,
                VecDeque::from(lines),
            ));
        }
        combats.sort_by_key(|c| c.id);
        Ok(combats)
    }

    /// Byte-copies the source range of a cached combat to `dst` (spec.md
    /// §6 "Persistence": exports are byte copies of the source log).
    pub fn export(&self, combat_id: u64, dst: &Path) -> Result<(), Error> {
        let combat = self
            .combats
            .get(&combat_id)
            .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, format!("combat {combat_id} not cached"))))?;
        let (start, end) = combat.byte_range;
        LogRepair::extract_bytes(&combat.source_path, dst, start, end).map_err(Error::Repair)
    }

    pub fn cached_combat(&self, combat_id: u64) -> Option<Arc<Combat>> {
        self.combats.get(&combat_id).cloned()
    }

    /// Starts a [`LiveParser`] against `path` using this orchestrator's
    /// configured inactivity gap (spec.md §4.7).
    pub fn live(&self, path: &Path, on_snapshot: SnapshotCallback) -> Result<LiveParser, Error> {
        LiveParser::start(path.to_path_buf(), self.settings.inactivity_gap(), on_snapshot).map_err(Error::Reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_log(path: &Path, combats: &[Vec<i64>]) {
        let mut file = std::fs::File::create(path).unwrap();
        for combat in combats {
            for &secs in combat {
                let hh = 12 + secs / 3600;
                let mm = (secs % 3600) / 60;
                let ss = secs % 60;
                writeln!(
                    file,
                    "24:03:15:{hh:02}:{mm:02}:{ss:02}.0::Kirk,P[1@2@@Kirk],Kirk,P[1@2@@Kirk],Borg,C[1 Borg],Torpedo,Pn0,HitPoints,,100.0,90.0"
                )
                .unwrap();
            }
        }
    }

    #[test]
    fn isolate_assigns_ids_in_temporal_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("combat.log");
        // Two combats of 25 lines each, separated by a large gap so that
        // `BackwardReader`'s 150s-equivalent gap trips the splitter.
        let first: Vec<i64> = (0..25).collect();
        let second: Vec<i64> = (0..25).map(|s| s + 25 + 200).collect();
        write_log(&path, &[first, second]);

        let mut orchestrator = Orchestrator::new(
            Settings { combats_to_parse: 10, seconds_between_combats: 10.0, combat_min_lines: 5, ..Settings::default() },
            2,
        )
        .unwrap();
        let combats = orchestrator.isolate(&path, 10).unwrap();
        assert_eq!(combats.len(), 2);
        assert_eq!(combats[0].id, 0);
        assert_eq!(combats[1].id, 1);
        assert!(combats[0].start_time < combats[1].start_time);
    }
}
