//! `Analyzer` — single pass over a `Combat`'s chronological `log_data`,
//! producing the four aggregation trees, the overview table, and the
//! per-player graph series (spec.md §4.6).

use crate::combat::Combat;
use crate::error::AnalyzerError;
use crate::line::{is_player_id, is_star_target, npc_entity_name, player_handle, DamageType, LogLine};
use crate::mapdetect::{CritterMeta, MapDetector, HIVE_QUEUE_TERMINATOR};
use crate::rows::OverviewTableRow;
use crate::tree::{NodePayload, RowKind, TreeModel};
use chrono::NaiveDateTime;
use std::collections::HashMap;

pub struct Analyzer;

impl Analyzer {
    /// Runs the full pass, mutating `combat` in place: attaches the four
    /// trees, the overview table, and the overview graph series. A combat
    /// is only ever analyzed once (spec.md §3 lifecycle).
    pub fn analyze(combat: &mut Combat, graph_resolution: f64) -> Result<(), AnalyzerError> {
        truncate_at_hive_queue_kill(combat);

        let mut damage_out = TreeModel::new(RowKind::Damage);
        let mut damage_in = TreeModel::new(RowKind::Damage);
        let mut heal_out = TreeModel::new(RowKind::Heal);
        let mut heal_in = TreeModel::new(RowKind::Heal);

        let combat_start = combat.start_time;
        let bucket_count = combat.bucket_count();
        let overview_bucket_count = (combat.duration_seconds() / graph_resolution).floor() as usize + 1;

        for line in combat.log_data.iter() {
            Self::process_line(
                line,
                combat_start,
                bucket_count,
                graph_resolution,
                overview_bucket_count,
                &mut damage_out,
                &mut damage_in,
                &mut heal_out,
                &mut heal_in,
                &mut combat.overview_graph,
                &mut combat.critter_meta,
                &mut combat.map,
                &mut combat.difficulty,
            )
            .map_err(|source| AnalyzerError::Failure {
                line_text: crate::line::LogLineCodec::serialize(line),
                source: Box::new(source.into()),
            })?;
        }

        // Phase 2: once Phase 1 (per-line) has pinned the map but left
        // difficulty unresolved, fall back to the death/hull-damage
        // fingerprints accumulated above (spec.md §4.4).
        if combat.difficulty.is_none() {
            if let Some(map) = combat.map.clone() {
                combat.difficulty = MapDetector::detect_by_deaths(&map, &combat.critter_meta).or_else(|| {
                    if MapDetector::has_hull_damage_table(&map) {
                        MapDetector::detect_by_hull_damage(&map, &combat.critter_meta)
                    } else {
                        None
                    }
                });
            }
        }

        // Single-pet collapse applies only to outgoing damage (spec.md §4.6,
        // §9 open question: source's half-written "merge_single_lines" pass
        // is applied only to outgoing-damage trees here).
        damage_out.collapse_single_pet_groups();

        damage_out.finalize();
        damage_in.finalize();
        heal_out.finalize();
        heal_in.finalize();

        combat.overview = build_overview(&damage_out, &damage_in, &heal_out, &combat.overview_graph, graph_resolution);
        combat.attach_trees(damage_out, damage_in, heal_out, heal_in);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_line(
        line: &LogLine,
        combat_start: NaiveDateTime,
        bucket_count: usize,
        graph_resolution: f64,
        overview_bucket_count: usize,
        damage_out: &mut TreeModel,
        damage_in: &mut TreeModel,
        heal_out: &mut TreeModel,
        heal_in: &mut TreeModel,
        overview_graph: &mut std::collections::HashMap<String, Vec<f64>>,
        critter_meta: &mut HashMap<String, CritterMeta>,
        map: &mut Option<String>,
        difficulty: &mut Option<crate::mapdetect::Difficulty>,
    ) -> Result<(), crate::error::TreeError> {
        // Step 1: is_heal predicate (spec.md §4.6, configurable per §9 open
        // question — `type==HitPoints && magnitude<0` is authoritative).
        let is_heal = (line.damage_type == DamageType::HitPoints && line.magnitude < 0.0)
            || (line.damage_type == DamageType::Shield && line.magnitude < 0.0 && line.magnitude2 >= 0.0);

        // Step 2: relative_second bucket.
        let relative_second = (line.timestamp - combat_start).num_milliseconds() as f64 / 1000.0;
        let bucket = (relative_second.floor().max(0.0) as usize).min(bucket_count.saturating_sub(1));

        let owner_is_player = is_player_id(&line.owner_id);
        let target_is_player = is_player_id(&line.target_id);
        let source_is_pet = line.source_id != line.owner_id && !line.source_id.is_empty();

        // Step 0: map/difficulty fingerprinting (spec.md §4.4). Phase 1
        // keys off the NPC entity name hit by an incoming player attack;
        // Phase 2's death/hull-damage tables are built here and resolved
        // once per combat after the loop.
        if !target_is_player {
            if let Some(entity) = npc_entity_name(&line.target_id) {
                if map.is_none() {
                    let detected = MapDetector::detect_line(entity);
                    if detected.map.is_some() {
                        *map = detected.map;
                        *difficulty = detected.difficulty;
                    }
                }
                let meta = critter_meta.entry(entity.to_string()).or_default();
                meta.count += 1;
                if line.flags.kill {
                    meta.deaths += 1;
                }
                if !is_heal && line.damage_type == DamageType::HitPoints {
                    meta.hull_damage_taken.push(line.magnitude.abs());
                }
            }
        }

        // Step 3: resolve out-tree path (actor / pet-group / pet / ability / target).
        let out_tree = if is_heal { &mut *heal_out } else { &mut *damage_out };
        let actor = out_tree.add_actor(&line.owner_id, &line.owner_name, owner_is_player)?;
        let ability_parent = if source_is_pet {
            let pet_group = out_tree.add_pet_group(actor, &line.source_name)?;
            out_tree.add_pet(pet_group, &line.source_id)?
        } else {
            actor
        };
        let ability = out_tree.add_ability(ability_parent, &line.event_name)?;
        let target_handle = player_handle(&line.target_id).unwrap_or("").to_string();
        let leaf_out = out_tree.add_target(ability, &line.target_id, &line.target_name, &target_handle)?;

        // ... and in-tree path (target / source-actor / source-ability).
        let in_tree = if is_heal { &mut *heal_in } else { &mut *damage_in };
        let target_node = in_tree.add_actor(&line.target_id, &line.target_name, target_is_player)?;
        let owner_handle = player_handle(&line.owner_id).unwrap_or("").to_string();
        let source_actor = in_tree.add_source_actor(target_node, &line.owner_id, &line.owner_name)?;
        let leaf_in = in_tree.add_source_ability(source_actor, &line.event_name, &owner_handle)?;

        // Step 4: combat-time extents, damage only, star-target and
        // self-damage excluded.
        if !is_heal && !is_star_target(&line.target_id) && line.owner_id != line.target_id {
            out_tree.mutate(leaf_out, |p| bump_combat_time(p, line.timestamp));
            in_tree.mutate(leaf_in, |p| bump_combat_time(p, line.timestamp));
        }

        // Step 5: accumulate magnitudes into both leaves.
        accumulate(out_tree, leaf_out, line, is_heal);
        accumulate(in_tree, leaf_in, line, is_heal);

        // Step 6: bucket into graph_data on both leaves.
        ensure_len(out_tree.graph_data_mut(leaf_out), bucket_count);
        out_tree.graph_data_mut(leaf_out)[bucket] += line.magnitude.abs();
        ensure_len(in_tree.graph_data_mut(leaf_in), bucket_count);
        in_tree.graph_data_mut(leaf_in)[bucket] += line.magnitude.abs();

        // Step 7: overview-graph series for outgoing player damage.
        if !is_heal && owner_is_player {
            let handle = player_handle(&line.owner_id).unwrap_or(&line.owner_id).to_string();
            let series = overview_graph
                .entry(handle)
                .or_insert_with(|| vec![0.0; overview_bucket_count]);
            let idx = ((relative_second / graph_resolution).floor().max(0.0) as usize).min(series.len().saturating_sub(1));
            series[idx] += line.magnitude.abs();
        }

        Ok(())
    }
}

/// Hive-space-queue combats terminate early on the kill of the
/// "Borg Queen Octahedron" target: every line after the kill is dropped and
/// the combat's `end_time` moves back to the kill line's timestamp
/// (spec.md §4.4 edge case). `log_data` is chronological, so this is a
/// truncate-after-first-match, not a search from the tail.
fn truncate_at_hive_queue_kill(combat: &mut Combat) {
    let Some(cut) = combat.log_data.iter().position(|line| {
        line.flags.kill && npc_entity_name(&line.target_id) == Some(HIVE_QUEUE_TERMINATOR)
    }) else {
        return;
    };

    combat.end_time = combat.log_data[cut].timestamp;
    combat.log_data.truncate(cut + 1);
}

fn ensure_len(buf: &mut Vec<f64>, len: usize) {
    if buf.len() < len {
        buf.resize(len, 0.0);
    }
}

fn bump_combat_time(payload: &mut NodePayload, timestamp: NaiveDateTime) {
    match payload {
        NodePayload::Damage(row) => row.bump_combat_time(timestamp),
        NodePayload::Heal(row) => row.bump_combat_time(timestamp),
        _ => {}
    }
}

/// Step 5 accumulation (spec.md §4.6).
fn accumulate(tree: &mut TreeModel, leaf: crate::tree::NodeId, line: &LogLine, is_heal: bool) {
    let magnitude = line.magnitude.abs();
    let is_shield = line.damage_type == DamageType::Shield;
    let is_hull = line.damage_type == DamageType::HitPoints;

    tree.mutate(leaf, |payload| match payload {
        NodePayload::Damage(row) if !is_heal => {
            row.total_damage += magnitude;
            if is_shield {
                row.total_shield_damage += magnitude;
                row.shield_attacks += 1;
            }
            if is_hull {
                row.total_hull_damage += magnitude;
                row.hull_attacks += 1;
                row.total_base_damage += line.magnitude2.abs();
            }
            row.max_one_hit = row.max_one_hit.max(magnitude);
            if line.flags.critical {
                row.crit_num += 1;
            }
            if line.flags.miss {
                row.misses += 1;
            }
            if line.flags.flank {
                row.flank_num += 1;
            }
            if line.flags.kill {
                row.kills += 1;
            }
            row.total_attacks += 1;
        }
        NodePayload::Heal(row) if is_heal => {
            row.total_heal += magnitude;
            if is_shield {
                row.shield_heal += magnitude;
                row.shield_heal_ticks += 1;
            }
            if is_hull {
                row.hull_heal += magnitude;
                row.hull_heal_ticks += 1;
            }
            row.max_one_heal = row.max_one_heal.max(magnitude);
            if line.flags.critical {
                row.critical_heals += 1;
            }
            row.heal_ticks += 1;
        }
        _ => {}
    });
}

/// Builds the combat-wide overview table from the rolled-up per-player
/// actor rows in `damage_out`/`damage_in`/`heal_out` (spec.md §3
/// "OverviewTableRow").
fn build_overview(
    damage_out: &TreeModel,
    damage_in: &TreeModel,
    heal_out: &TreeModel,
    overview_graph: &HashMap<String, Vec<f64>>,
    graph_resolution: f64,
) -> Vec<OverviewTableRow> {
    let player_actors = damage_out.node(damage_out.player_root).children.clone();
    let total_damage: f64 = player_actors
        .iter()
        .filter_map(|&id| damage_out.node(id).payload.as_damage())
        .map(|r| r.total_damage)
        .sum();
    let total_attacks_in: u32 = damage_in
        .node(damage_in.player_root)
        .children
        .iter()
        .filter_map(|&id| damage_in.node(id).payload.as_damage())
        .map(|r| r.total_attacks)
        .sum();
    let total_taken: f64 = damage_in
        .node(damage_in.player_root)
        .children
        .iter()
        .filter_map(|&id| damage_in.node(id).payload.as_damage())
        .map(|r| r.total_hull_damage + r.total_shield_damage)
        .sum();
    let total_healed: f64 = heal_out
        .node(heal_out.player_root)
        .children
        .iter()
        .filter_map(|&id| heal_out.node(id).payload.as_heal())
        .map(|r| r.total_heal)
        .sum();

    let mut rows = Vec::new();
    for &actor in &player_actors {
        let Some(out_row) = damage_out.node(actor).payload.as_damage() else { continue };

        let id = out_row.id.clone();
        let taken = damage_in
            .node(damage_in.player_root)
            .children
            .iter()
            .find(|&&n| damage_in.node(n).payload.as_damage().map(|r| r.id.as_str()) == Some(id.as_str()))
            .and_then(|&n| damage_in.node(n).payload.as_damage());
        let healed = heal_out
            .node(heal_out.player_root)
            .children
            .iter()
            .find(|&&n| heal_out.node(n).payload.as_heal().map(|r| r.id.as_str()) == Some(id.as_str()))
            .and_then(|&n| heal_out.node(n).payload.as_heal());

        let total_damage_taken = taken.map(|r| r.total_hull_damage + r.total_shield_damage).unwrap_or(0.0);
        let attacks_in_num = taken.map(|r| r.total_attacks).unwrap_or(0);
        let total_heal = healed.map(|r| r.total_heal).unwrap_or(0.0);
        let heal_crit_chance = healed.map(|r| r.heal_crit_chance).unwrap_or(0.0);

        let damage_per_bucket = overview_graph.get(&out_row.handle).cloned().unwrap_or_default();
        let bucket_times: Vec<f64> = (0..damage_per_bucket.len()).map(|i| i as f64 * graph_resolution).collect();

        rows.push(OverviewTableRow {
            name: out_row.name.clone(),
            handle: out_row.handle.clone(),
            id,
            total_damage: out_row.total_damage,
            total_damage_taken,
            total_heal,
            attacks_in_num,
            damage_share: if total_damage > 0.0 { out_row.total_damage / total_damage } else { 0.0 },
            taken_damage_share: if total_taken > 0.0 { total_damage_taken / total_taken } else { 0.0 },
            attacks_in_share: if total_attacks_in > 0 { attacks_in_num as f64 / total_attacks_in as f64 } else { 0.0 },
            heal_share: if total_healed > 0.0 { total_heal / total_healed } else { 0.0 },
            debuff: out_row.debuff,
            crit_chance: out_row.crit_chance,
            heal_crit_chance,
            dps: out_row.dps,
            combat_time: out_row.combat_time,
            max_one_hit: out_row.max_one_hit,
            kills: out_row.kills,
            misses: out_row.misses,
            damage_per_bucket,
            bucket_times,
            damage_buffer: 0.0,
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LogLineCodec;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    fn line(secs: i64, magnitude: f64, magnitude2: f64, flags: &str) -> LogLine {
        let base = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let raw = format!(
            "24:03:15:12:00:00.0::Kirk,P[1@2@@Kirk],Kirk,P[1@2@@Kirk],Borg Cube,C[55 Space_Borg_Cube],Torpedo,Pn0,HitPoints,{flags},{magnitude:.1},{magnitude2:.1}"
        );
        let mut parsed = LogLineCodec::parse(&raw).unwrap();
        parsed.timestamp = base + chrono::Duration::seconds(secs);
        parsed
    }

    fn combat_with(lines: Vec<LogLine>, duration: i64) -> Combat {
        let base = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        Combat::new(
            0,
            0,
            PathBuf::from("log.txt"),
            (0, 0),
            base,
            base + chrono::Duration::seconds(duration),
            0.2,
            VecDeque::from(lines),
        )
    }

    #[test]
    fn scenario_one_uniform_hits_compute_expected_totals() {
        // Damage magnitudes are positive; `HitPoints` + negative magnitude
        // is the heal branch (grounded on `original_source/OSCR/parser.py`).
        let lines: Vec<LogLine> = (0..25).map(|_| line(0, 100.0, 100.0, "")).collect();
        let mut combat = combat_with(lines, 5);
        Analyzer::analyze(&mut combat, 0.2).unwrap();

        let actor = combat.damage_out.as_ref().unwrap().node(combat.damage_out.as_ref().unwrap().player_root).children[0];
        let row = combat.damage_out.as_ref().unwrap().node(actor).payload.as_damage().unwrap();
        assert_eq!(row.total_damage, 2500.0);
        assert_eq!(row.accuracy, 1.0);
        assert_eq!(row.crit_chance, 0.0);
    }

    #[test]
    fn scenario_three_shield_heal_counted_correctly() {
        let base = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let raw = "24:03:15:12:00:00.0::Kirk,P[1@2@@Kirk],Kirk,P[1@2@@Kirk],Kirk,P[1@2@@Kirk],Heal,Pn0,Shield,,-100.0,0.0";
        let mut l = LogLineCodec::parse(raw).unwrap();
        l.timestamp = base;
        let mut combat = combat_with(vec![l], 1);
        Analyzer::analyze(&mut combat, 0.2).unwrap();

        let heal_out = combat.heal_out.as_ref().unwrap();
        let actor = heal_out.node(heal_out.player_root).children[0];
        let row = heal_out.node(actor).payload.as_heal().unwrap();
        assert_eq!(row.hull_heal, 0.0);
        assert_eq!(row.shield_heal, 100.0);
        assert_eq!(row.heal_ticks, 1);
    }

    #[test]
    fn scenario_four_debuff_ratio_from_base_damage() {
        let magnitudes = [100.0, 200.0, 50.0, 400.0, 150.0];
        let base_magnitudes = [80.0, 150.0, 50.0, 300.0, 100.0];
        let lines: Vec<LogLine> = magnitudes
            .iter()
            .zip(base_magnitudes.iter())
            .map(|(&m, &b)| line(0, m, b, ""))
            .collect();
        let mut combat = combat_with(lines, 1);
        Analyzer::analyze(&mut combat, 0.2).unwrap();

        let damage_out = combat.damage_out.as_ref().unwrap();
        let actor = damage_out.node(damage_out.player_root).children[0];
        let row = damage_out.node(actor).payload.as_damage().unwrap();
        assert_eq!(row.total_damage, 900.0);
        assert_eq!(row.total_base_damage, 680.0);
        assert!((row.debuff - (900.0 / 680.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn hive_queue_kill_truncates_trailing_lines_and_pulls_back_end_time() {
        let base = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let mut before = line(0, 100.0, 100.0, "");
        let mut kill_raw = LogLineCodec::parse(
            "24:03:15:12:00:05.0::Kirk,P[1@2@@Kirk],Kirk,P[1@2@@Kirk],Octahedron,C[1 Borg Queen Octahedron],Torpedo,Pn0,HitPoints,Kill,100.0,90.0",
        )
        .unwrap();
        let mut after = line(10, 100.0, 100.0, "");
        before.timestamp = base;
        kill_raw.timestamp = base + chrono::Duration::seconds(5);
        after.timestamp = base + chrono::Duration::seconds(10);

        let mut combat = combat_with(vec![before, kill_raw, after], 10);
        Analyzer::analyze(&mut combat, 0.2).unwrap();

        assert_eq!(combat.log_data.len(), 2);
        assert_eq!(combat.end_time, base + chrono::Duration::seconds(5));
    }

    #[test]
    fn map_is_detected_from_target_entity_name_on_first_hit() {
        let base = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let raw = "24:03:15:12:00:00.0::Kirk,P[1@2@@Kirk],Kirk,P[1@2@@Kirk],Borg,C[1 Space_Crystalline_Entity_2018],Torpedo,Pn0,HitPoints,,100.0,90.0";
        let mut l = LogLineCodec::parse(raw).unwrap();
        l.timestamp = base;
        let mut combat = combat_with(vec![l], 1);
        Analyzer::analyze(&mut combat, 0.2).unwrap();
        assert_eq!(combat.map.as_deref(), Some("Crystalline Entity"));
    }
}
