//! `Combat` — one engagement, owned by the Orchestrator once emitted by the
//! `CombatSplitter` and mutated exactly once by the `Analyzer` (spec.md §3).

use crate::line::LogLine;
use crate::mapdetect::{CritterMeta, Difficulty};
use crate::rows::OverviewTableRow;
use crate::tree::TreeModel;
use chrono::NaiveDateTime;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

pub struct Combat {
    /// Stable, order-preserving identity across re-parses of the same log.
    pub id: u64,
    /// Internal allocation-order counter, used only for cache eviction
    /// (SPEC_FULL.md §3 — supplemental, distinct from `id`).
    pub sequence_id: u64,
    pub source_path: PathBuf,
    pub byte_range: (u64, u64),
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub graph_resolution: f64,
    pub map: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub log_data: VecDeque<LogLine>,

    pub damage_out: Option<TreeModel>,
    pub damage_in: Option<TreeModel>,
    pub heal_out: Option<TreeModel>,
    pub heal_in: Option<TreeModel>,

    pub overview: Vec<OverviewTableRow>,
    /// Player handle -> per-bucket cumulative damage series.
    pub overview_graph: HashMap<String, Vec<f64>>,
    pub critter_meta: HashMap<String, CritterMeta>,
    pub meta_line_count: u64,
}

impl Combat {
    pub fn new(
        id: u64,
        sequence_id: u64,
        source_path: PathBuf,
        byte_range: (u64, u64),
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        graph_resolution: f64,
        log_data: VecDeque<LogLine>,
    ) -> Self {
        Combat {
            id,
            sequence_id,
            source_path,
            byte_range,
            start_time,
            end_time,
            graph_resolution,
            map: None,
            difficulty: None,
            log_data,
            damage_out: None,
            damage_in: None,
            heal_out: None,
            heal_in: None,
            overview: Vec::new(),
            overview_graph: HashMap::new(),
            critter_meta: HashMap::new(),
            meta_line_count: 0,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn bucket_count(&self) -> usize {
        self.duration_seconds().floor() as usize + 1
    }

    pub fn has_trees(&self) -> bool {
        self.damage_out.is_some() && self.damage_in.is_some() && self.heal_out.is_some() && self.heal_in.is_some()
    }

    /// spec.md §3 invariant: the four trees are all present or all absent.
    pub fn attach_trees(&mut self, damage_out: TreeModel, damage_in: TreeModel, heal_out: TreeModel, heal_in: TreeModel) {
        self.damage_out = Some(damage_out);
        self.damage_in = Some(damage_in);
        self.heal_out = Some(heal_out);
        self.heal_in = Some(heal_in);
    }

    /// spec.md §3 invariant: `end_time >= start_time` and the log meets the
    /// surfaced minimum line count.
    pub fn meets_minimum(&self, combat_min_lines: usize) -> bool {
        self.end_time >= self.start_time && !self.log_data.is_empty() && self.log_data.len() >= combat_min_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(secs)
    }

    #[test]
    fn duration_and_bucket_count_match_time_span() {
        let combat = Combat::new(0, 0, PathBuf::from("log.txt"), (0, 100), ts(0), ts(5), 1.0, VecDeque::new());
        assert_eq!(combat.duration_seconds(), 5.0);
        assert_eq!(combat.bucket_count(), 6);
    }

    #[test]
    fn meets_minimum_requires_enough_lines() {
        let mut combat = Combat::new(0, 0, PathBuf::from("log.txt"), (0, 0), ts(0), ts(1), 1.0, VecDeque::new());
        assert!(!combat.meets_minimum(20));
        for _ in 0..20 {
            combat.log_data.push_back(crate::line::LogLineCodec::parse(
                "24:03:15:12:00:00.0::Me,P[1@2@@Kirk],,,Borg,C[1 Borg],Torpedo,Pn0,HitPoints,,100.0,90.0",
            ).unwrap());
        }
        assert!(combat.meets_minimum(20));
    }
}
