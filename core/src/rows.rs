//! Row types accumulated at `TreeModel` leaves and derived stats (spec.md §3,
//! §4.6). Grounded on `original_source/OSCR/datamodels.py`'s
//! `DamageTableRow`/`HealTableRow`/`OverviewTableRow`, translated from
//! Python `__slots__` classes into plain Rust structs.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Default)]
pub struct DamageTableRow {
    pub name: String,
    pub handle: String,
    pub id: String,
    pub total_damage: f64,
    pub total_base_damage: f64,
    pub max_one_hit: f64,
    pub kills: u32,
    pub total_attacks: u32,
    pub misses: u32,
    pub crit_num: u32,
    pub flank_num: u32,
    pub total_shield_damage: f64,
    pub total_hull_damage: f64,
    pub hull_attacks: u32,
    pub shield_attacks: u32,
    pub combat_start: Option<NaiveDateTime>,
    pub combat_end: Option<NaiveDateTime>,
    pub combat_time: f64,

    // Derived (spec.md §4.6 "After the pass")
    pub dps: f64,
    pub debuff: f64,
    pub crit_chance: f64,
    pub accuracy: f64,
    pub flank_rate: f64,
}

impl DamageTableRow {
    pub fn new(name: &str, handle: &str, id: &str) -> Self {
        Self {
            name: if name.is_empty() { "*".to_string() } else { name.to_string() },
            handle: handle.to_string(),
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Extends combat-time bounds by `timestamp` (spec.md §4.6 step 4).
    pub fn bump_combat_time(&mut self, timestamp: NaiveDateTime) {
        match self.combat_start {
            None => self.combat_start = Some(timestamp),
            Some(start) if timestamp < start => self.combat_start = Some(timestamp),
            _ => {}
        }
        match self.combat_end {
            None => self.combat_end = Some(timestamp),
            Some(end) if timestamp > end => self.combat_end = Some(timestamp),
            _ => {}
        }
    }

    pub fn recompute_combat_time(&mut self) {
        self.combat_time = match (self.combat_start, self.combat_end) {
            (Some(s), Some(e)) => (e - s).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
    }

    /// Sums another row's absolutes into `self` (tree roll-up, spec.md §4.6,
    /// §8 "For every tree-model node N except leaves...").
    pub fn merge_child(&mut self, child: &DamageTableRow) {
        self.total_damage += child.total_damage;
        self.total_base_damage += child.total_base_damage;
        self.max_one_hit = self.max_one_hit.max(child.max_one_hit);
        self.kills += child.kills;
        self.total_attacks += child.total_attacks;
        self.misses += child.misses;
        self.crit_num += child.crit_num;
        self.flank_num += child.flank_num;
        self.total_shield_damage += child.total_shield_damage;
        self.total_hull_damage += child.total_hull_damage;
        self.hull_attacks += child.hull_attacks;
        self.shield_attacks += child.shield_attacks;
        // "combat_time is the first child's value" (spec.md §4.6).
        if self.combat_start.is_none() {
            self.combat_start = child.combat_start;
            self.combat_end = child.combat_end;
            self.combat_time = child.combat_time;
        }
    }

    /// Recomputes ratios from rolled-up absolutes (spec.md §4.6, §8).
    pub fn derive_ratios(&mut self) {
        self.dps = if self.combat_time > 0.0 {
            self.total_damage / self.combat_time
        } else {
            0.0
        };
        self.debuff = if self.total_base_damage != 0.0 {
            self.total_damage / self.total_base_damage - 1.0
        } else {
            0.0
        };
        let successful = self.hull_attacks.saturating_sub(self.misses);
        self.crit_chance = if successful > 0 {
            self.crit_num as f64 / successful as f64
        } else {
            0.0
        };
        self.accuracy = if self.hull_attacks > 0 {
            successful as f64 / self.hull_attacks as f64
        } else {
            0.0
        };
        self.flank_rate = if successful > 0 {
            self.flank_num as f64 / successful as f64
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealTableRow {
    pub name: String,
    pub handle: String,
    pub id: String,
    pub total_heal: f64,
    pub hull_heal: f64,
    pub shield_heal: f64,
    pub max_one_heal: f64,
    pub heal_ticks: u32,
    pub critical_heals: u32,
    pub hull_heal_ticks: u32,
    pub shield_heal_ticks: u32,
    pub combat_start: Option<NaiveDateTime>,
    pub combat_end: Option<NaiveDateTime>,
    pub combat_time: f64,

    pub hps: f64,
    pub shield_hps: f64,
    pub hull_hps: f64,
    pub heal_crit_chance: f64,
}

impl HealTableRow {
    pub fn new(name: &str, handle: &str, id: &str) -> Self {
        Self {
            name: if name.is_empty() { "*".to_string() } else { name.to_string() },
            handle: handle.to_string(),
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn bump_combat_time(&mut self, timestamp: NaiveDateTime) {
        match self.combat_start {
            None => self.combat_start = Some(timestamp),
            Some(start) if timestamp < start => self.combat_start = Some(timestamp),
            _ => {}
        }
        match self.combat_end {
            None => self.combat_end = Some(timestamp),
            Some(end) if timestamp > end => self.combat_end = Some(timestamp),
            _ => {}
        }
    }

    pub fn recompute_combat_time(&mut self) {
        self.combat_time = match (self.combat_start, self.combat_end) {
            (Some(s), Some(e)) => (e - s).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
    }

    pub fn merge_child(&mut self, child: &HealTableRow) {
        self.total_heal += child.total_heal;
        self.hull_heal += child.hull_heal;
        self.shield_heal += child.shield_heal;
        self.max_one_heal = self.max_one_heal.max(child.max_one_heal);
        self.heal_ticks += child.heal_ticks;
        self.critical_heals += child.critical_heals;
        self.hull_heal_ticks += child.hull_heal_ticks;
        self.shield_heal_ticks += child.shield_heal_ticks;
        if self.combat_start.is_none() {
            self.combat_start = child.combat_start;
            self.combat_end = child.combat_end;
            self.combat_time = child.combat_time;
        }
    }

    pub fn derive_ratios(&mut self) {
        self.hps = if self.combat_time > 0.0 {
            self.total_heal / self.combat_time
        } else {
            0.0
        };
        self.shield_hps = if self.combat_time > 0.0 {
            self.shield_heal / self.combat_time
        } else {
            0.0
        };
        self.hull_hps = if self.combat_time > 0.0 {
            self.hull_heal / self.combat_time
        } else {
            0.0
        };
        self.heal_crit_chance = if self.heal_ticks > 0 {
            self.critical_heals as f64 / self.heal_ticks as f64
        } else {
            0.0
        };
    }
}

/// Expands a damage or heal row with combat-wide shares and the per-player
/// graph series (spec.md §3 "OverviewTableRow").
#[derive(Debug, Clone, Default)]
pub struct OverviewTableRow {
    pub name: String,
    pub handle: String,
    pub id: String,

    pub total_damage: f64,
    pub total_damage_taken: f64,
    pub total_heal: f64,
    pub attacks_in_num: u32,

    pub damage_share: f64,
    pub taken_damage_share: f64,
    pub attacks_in_share: f64,
    pub heal_share: f64,

    pub debuff: f64,
    pub crit_chance: f64,
    pub heal_crit_chance: f64,
    pub dps: f64,

    pub combat_time: f64,
    pub max_one_hit: f64,
    pub kills: u32,
    pub misses: u32,

    /// Per-bucket damage series, one entry per graph bucket.
    pub damage_per_bucket: Vec<f64>,
    /// Timestamps (seconds since combat start) parallel to `damage_per_bucket`.
    pub bucket_times: Vec<f64>,
    /// Transient accumulator cleared every bucket (spec.md §3 lifecycle note).
    pub damage_buffer: f64,
}
