//! `MapDetector` — fingerprint-based map/difficulty classification
//! (spec.md §4.4).
//!
//! Phase 1 (existence) is a hot per-line lookup, so it's a `phf::Map` const
//! table the way the teacher keys its static game-data lookups in
//! `core/src/game_data/*`. Phases 2a/2b only run once per combat over a
//! handful of entries, so they stay plain const slices rather than nested
//! `phf` maps — a linear scan over a dozen rows isn't worth the macro
//! nesting. Table contents are grounded on
//! `original_source/OSCR/detection.py`'s `MAP_IDENTIFIERS_EXISTENCE`,
//! `MAP_DIFFICULTY_ENTITY_DEATH_COUNTS`, `MAP_DIFFICULTY_ENTITY_HULL_COUNTS`.

use phf::phf_map;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    Normal,
    Advanced,
    Elite,
}

impl Difficulty {
    fn as_str(self) -> &'static str {
        match self {
            Difficulty::Normal => "Normal",
            Difficulty::Advanced => "Advanced",
            Difficulty::Elite => "Elite",
        }
    }
}

/// Per-NPC-entity-name aggregate built during Phase 2 (spec.md §4.4 "Build
/// critter_meta").
#[derive(Debug, Clone, Default)]
pub struct CritterMeta {
    pub count: u32,
    pub deaths: u32,
    pub hull_damage_taken: Vec<f64>,
}

/// Phase 1: single-entity existence table. `None` difficulty means the
/// table only pins down the map ("Any" in the original data); Phase 2 must
/// still resolve difficulty in that case.
pub static MAP_IDENTIFIERS_EXISTENCE: phf::Map<&'static str, (&'static str, Option<&'static str>)> = phf_map! {
    "Space_Borg_Battleship_Raidisode_Sibrian_Elite_Initial" => ("Infected Space", None),
    "Space_Borg_Dreadnought_Raidisode_Sibrian_Final_Boss" => ("Infected Space", None),
    "Mission_Space_Romulan_Colony_Flagship_Lleiset" => ("Azure Nebula Rescue", None),
    "Space_Klingon_Dreadnought_Dsc_Sarcophagus" => ("Battle At The Binary Stars", None),
    "Event_Procyon_5_Queue_Krenim_Dreadnaught_Annorax" => ("Battle At Procyon V", None),
    "Mission_Space_Borg_Queen_Diamond_Brg_Queue_Liberation" => ("Borg Disconnected", None),
    "Mission_Starbase_Mirror_Ds9_Mu_Queue" => ("Counterpoint", None),
    "Space_Crystalline_Entity_2018" => ("Crystalline Entity", None),
    "Event_Ico_Qonos_Space_Herald_Dreadnaught" => ("Gateway To Grethor", None),
    "Mission_Space_Federation_Science_Herald_Sphere" => ("Herald Sphere", None),
    "Msn_Dsc_Priors_System_Tfo_Orbital_Platform_1_Fed_Dsc" => ("Operation Riposte", None),
    "Space_Borg_Dreadnought_R02" => ("Cure Found", None),
    "Space_Klingon_Tos_X3_Battlecruiser" => ("Days Of Doom", None),
    "Msn_Luk_Colony_Dranuur_Queue_System_Upgradeable_Satellite" => ("Dranuur Gauntlet", None),
    "Space_Borg_Dreadnought_Raidisode_Khitomer_Intro_Boss" => ("Khitomer Space", None),
    "Mission_Spire_Space_Voth_Frigate" => ("Storming The Spire", None),
    "Space_Drantzuli_Alpha_Battleship" => ("Swarm", None),
    "Mission_Beta_Lankal_Destructible_Reactor" => ("To Hell With Honor", None),
    "Space_Federation_Dreadnought_Jupiter_Class_Carrier" => ("Gravity Kills", None),
    "Msn_Luk_Hypermass_Queue_System_Tzk_Protomatter_Facility" => ("Gravity Kills", None),
    "Space_Borg_Dreadnought_Hive_Intro" => ("Hive Space", None),
    "Ground_Federation_Capt_Mirror_Runabout_Tfo" => ("Operation Wolf", Some("Normal")),
    "Bluegills_Ground_Boss" => ("Bug Hunt", None),
    "Msn_Edren_Queue_Ground_Gorn_Lt_Tos_Range_Rock" => ("Miner Instabilities", None),
    "Msn_Ground_Capt_Mirror_Janeway_Boss_Unkillable" => ("Jupiter Station Showdown", None),
    "Mission_Event_Tholian_Invasion_Ext_Boss" => ("Nukara Prime: Transdimensional Tactics", None),
    "Space_Borg_Dreadnought_Wolf359" => ("Battle of Wolf 359", None),
    "Snowman_Q_Boss_Msn_Snowglobe" => ("Winter Invasion", Some("Normal")),
};

type EntityCount = (&'static str, u32);
type DifficultyTable = (&'static str, &'static [EntityCount]);
type MapTable = (&'static str, &'static [DifficultyTable]);

/// Phase 2a: per-map, per-difficulty required death counts. Ordered
/// ascending (Normal < Advanced < Elite) within each map so callers can stop
/// at the first failure and otherwise take the highest match (spec.md §4.4).
pub static MAP_DIFFICULTY_ENTITY_DEATH_COUNTS: &[MapTable] = &[
    (
        "Infected Space",
        &[
            (
                "Advanced",
                &[
                    ("Space_Borg_Battleship_Raidisode", 5),
                    ("Space_Borg_Cruiser_Raidisode", 6),
                    ("Mission_Borgraid1_Transwarp_02", 1),
                    ("Space_Borg_Dreadnought_Raidisode_Sibrian_Final_Boss", 1),
                ],
            ),
            (
                "Elite",
                &[
                    ("Space_Borg_Battleship_Raidisode_Sibrian_Elite_Initial", 2),
                    ("Space_Borg_Dreadnought_Raidisode_Sibrian_Initial_Boss", 1),
                    ("Space_Borg_Cruiser_Raidisode_Sibrian_Elite_Initial", 4),
                    ("Space_Borg_Battleship_Raidisode", 2),
                    ("Mission_Borgraid1_Transwarp_02", 1),
                    ("Space_Borg_Dreadnought_Raidisode_Sibrian_Final_Boss", 1),
                ],
            ),
        ],
    ),
    (
        "Cure Found",
        &[
            (
                "Advanced",
                &[
                    ("Space_Borg_Battleship_Raidisode_Cure", 3),
                    ("Mission_Cure_Healer_Mini_Trans_02", 18),
                    ("Space_Borg_Cruiser_Raidisode_Cure", 3),
                    ("Space_Borg_Cruiser_Raidisode", 2),
                    ("Space_Borg_Dreadnought_R02", 1),
                    ("Space_Klingon_Raider_Pet_Borg_Carrier_Advanced", 0),
                ],
            ),
            (
                "Elite",
                &[
                    ("Space_Borg_Battleship_Raidisode_Cure", 3),
                    ("Mission_Cure_Healer_Mini_Trans_02", 18),
                    ("Space_Borg_Cruiser_Raidisode_Cure", 3),
                    ("Space_Borg_Cruiser_Raidisode", 2),
                    ("Space_Borg_Dreadnought_R02", 1),
                    ("Space_Klingon_Fighter_Pet_Borg_Elite", 0),
                ],
            ),
        ],
    ),
    (
        "Khitomer Space",
        &[
            (
                "Advanced",
                &[
                    ("Space_Borg_Dreadnought_Raidisode_Khitomer_Intro_Boss", 1),
                    ("Mission_Raidisode03_Donatra_Borg_Scimitar", 1),
                    ("Mission_Borgraid1_Transwarp_02", 2),
                    ("Space_Borg_Battleship_Raidisode", 4),
                    ("Mission_Borgraid1_Comm_Array", 4),
                    ("Space_Borg_Dreadnought_Raidisode", 0),
                ],
            ),
            (
                "Elite",
                &[
                    ("Space_Borg_Dreadnought_Raidisode_Khitomer_Intro_Boss", 1),
                    ("Mission_Raidisode03_Donatra_Borg_Scimitar", 1),
                    ("Mission_Borgraid1_Transwarp_02", 2),
                    ("Space_Borg_Battleship_Raidisode", 4),
                    ("Mission_Borgraid1_Comm_Array", 4),
                    ("Space_Borg_Dreadnought_Raidisode", 4),
                ],
            ),
        ],
    ),
    (
        "Hive Space",
        &[
            (
                "Advanced",
                &[
                    ("Mission_Space_Borg_Queen_Diamond", 1),
                    ("Mission_Space_Borg_Battleship_Queen_2_0f_2", 1),
                    ("Mission_Space_Borg_Battleship_Queen_1_0f_2", 1),
                ],
            ),
            (
                "Elite",
                &[
                    ("Mission_Space_Borg_Queen_Diamond", 1),
                    ("Mission_Space_Borg_Battleship_Queen_2_0f_2", 1),
                    ("Mission_Space_Borg_Battleship_Queen_1_0f_2", 1),
                ],
            ),
        ],
    ),
    (
        "Bug Hunt",
        &[(
            "Elite",
            &[
                ("Msn_Dlt_Bluegill_Hunt_Queue_Ground_Ens", 3),
                ("Bluegills_Ground_Cdr", 26),
                ("Bluegills_Ground_Capt", 1),
                ("Bluegills_Ground_Boss", 1),
            ],
        )],
    ),
    (
        "Jupiter Station Showdown",
        &[(
            "Elite",
            &[
                ("Msn_Assimilated_Fed_Odyssey_Ground_Borg_Ens_Melee", 27),
                ("Msn_Assimilated_Fed_Odyssey_Ground_Borg_Lt_Range", 17),
                ("Msn_Assimilated_Fed_Odyssey_Ground_Borg_Cdr_Melee", 2),
            ],
        )],
    ),
    (
        "Miner Instabilities",
        &[("Elite", &[("Ground_Nakuhl_Capt_Range_Male", 1)])],
    ),
    (
        "Battle of Wolf 359",
        &[("Elite", &[("Space_Borg_Cruiser_Wolf359", 3)])],
    ),
];

type EntityHull = (&'static str, f64);
type DifficultyHullTable = (&'static str, &'static [EntityHull]);
type MapHullTable = (&'static str, &'static [DifficultyHullTable]);

/// Phase 2b: per-map, per-difficulty minimum median hull damage taken.
pub static MAP_DIFFICULTY_ENTITY_HULL_COUNTS: &[MapHullTable] = &[
    (
        "Hive Space",
        &[
            (
                "Advanced",
                &[
                    ("Space_Borg_Cruiser_Hive_Intro1", 461582.0),
                    ("Space_Borg_Cruiser_Hive_Intro2", 461582.0),
                    ("Space_Borg_Battleship_Hive_Intro", 576977.0),
                    ("Space_Borg_Dreadnought_Hive_Intro", 1707034.0),
                ],
            ),
            (
                "Elite",
                &[
                    ("Space_Borg_Cruiser_Hive_Intro1", 2165239.0),
                    ("Space_Borg_Cruiser_Hive_Intro2", 2165239.0),
                    ("Space_Borg_Battleship_Hive_Intro", 2706549.0),
                    ("Space_Borg_Dreadnought_Hive_Intro", 8007542.0),
                ],
            ),
        ],
    ),
    (
        "Jupiter Station Showdown",
        &[(
            "Elite",
            &[
                ("Msn_Assimilated_Fed_Odyssey_Ground_Borg_Ens_Melee", 2605.0),
                ("Msn_Assimilated_Fed_Odyssey_Ground_Borg_Lt_Range", 3439.0),
            ],
        )],
    ),
    (
        "Bug Hunt",
        &[("Elite", &[("Bluegills_Ground_Boss", 449432.0)])],
    ),
    (
        "Miner Instabilities",
        &[("Elite", &[("Ground_Nakuhl_Capt_Range_Male", 20843.0)])],
    ),
    (
        "Battle of Wolf 359",
        &[(
            "Elite",
            &[
                ("Space_Borg_Turret_Medium_Plasma_Torpedo_Wolf359", 2081960.0),
                ("Space_Borg_Turret_Medium_Plasma_Beam_Wolf359", 2081960.0),
                ("Space_Borg_Turret_Medium_Tractor_Beam_Wolf359", 2081960.0),
                ("Space_Borg_Wolf359_Escape_Pod_Tractor_Beam", 2081960.0),
                ("Space_Borg_Frigate_Wolf359", 2081960.0),
                ("Space_Borg_Cruiser_Wolf359", 0.0),
            ],
        )],
    ),
];

/// The Hive-space-queue boss whose kill terminates a combat early
/// (spec.md §4.4 edge case).
pub const HIVE_QUEUE_TERMINATOR: &str = "Borg Queen Octahedron";

#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub map: Option<String>,
    pub difficulty: Option<Difficulty>,
}

pub struct MapDetector;

impl MapDetector {
    /// Phase 1: shallow per-line detection from a target NPC entity name
    /// (spec.md §4.4).
    pub fn detect_line(target_entity_name: &str) -> DetectionResult {
        match MAP_IDENTIFIERS_EXISTENCE.get(target_entity_name) {
            Some(&(map, difficulty)) => DetectionResult {
                map: Some(map.to_string()),
                difficulty: difficulty.and_then(parse_difficulty),
            },
            None => DetectionResult::default(),
        }
    }

    /// Phase 2a: death-count fingerprint (spec.md §4.4 "Match").
    pub fn detect_by_deaths(map: &str, critter_meta: &HashMap<String, CritterMeta>) -> Option<Difficulty> {
        let (_, table) = MAP_DIFFICULTY_ENTITY_DEATH_COUNTS.iter().find(|(m, _)| *m == map)?;
        let mut best = None;
        for (diff_name, entities) in table.iter() {
            let matches = entities.iter().all(|(entity, required)| {
                let observed = critter_meta.get(*entity).map(|m| m.deaths).unwrap_or(0);
                if *required > 0 {
                    observed == *required
                } else {
                    observed > 0
                }
            });
            if matches {
                best = parse_difficulty(diff_name);
            }
        }
        best
    }

    /// Phase 2b: hull-damage median fingerprint, 20% tolerance below the
    /// required value (spec.md §4.4 "Hull-damage stage").
    pub fn detect_by_hull_damage(map: &str, critter_meta: &HashMap<String, CritterMeta>) -> Option<Difficulty> {
        let (_, table) = MAP_DIFFICULTY_ENTITY_HULL_COUNTS.iter().find(|(m, _)| *m == map)?;
        let mut best = None;
        for (diff_name, entities) in table.iter() {
            let matches = entities.iter().all(|(entity, required)| {
                let median = critter_meta
                    .get(*entity)
                    .map(|m| median_of(&m.hull_damage_taken))
                    .unwrap_or(0.0);
                median >= required * 0.80
            });
            if matches {
                best = parse_difficulty(diff_name);
            }
        }
        best
    }

    pub fn has_hull_damage_table(map: &str) -> bool {
        MAP_DIFFICULTY_ENTITY_HULL_COUNTS.iter().any(|(m, _)| *m == map)
    }
}

fn parse_difficulty(s: &str) -> Option<Difficulty> {
    match s {
        "Normal" => Some(Difficulty::Normal),
        "Advanced" => Some(Difficulty::Advanced),
        "Elite" => Some(Difficulty::Elite),
        _ => None,
    }
}

fn median_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_line_finds_existence_entry() {
        let result = MapDetector::detect_line("Space_Borg_Dreadnought_R02");
        assert_eq!(result.map.as_deref(), Some("Cure Found"));
        assert_eq!(result.difficulty, None);
    }

    #[test]
    fn detect_line_unknown_entity_yields_nothing() {
        let result = MapDetector::detect_line("Nonexistent_Entity");
        assert_eq!(result.map, None);
    }

    #[test]
    fn death_count_stage_prefers_highest_matching_difficulty() {
        let mut meta = HashMap::new();
        meta.insert(
            "Space_Borg_Battleship_Raidisode_Sibrian_Elite_Initial".to_string(),
            CritterMeta { count: 2, deaths: 2, hull_damage_taken: vec![] },
        );
        meta.insert(
            "Space_Borg_Dreadnought_Raidisode_Sibrian_Initial_Boss".to_string(),
            CritterMeta { count: 1, deaths: 1, hull_damage_taken: vec![] },
        );
        meta.insert(
            "Space_Borg_Cruiser_Raidisode_Sibrian_Elite_Initial".to_string(),
            CritterMeta { count: 4, deaths: 4, hull_damage_taken: vec![] },
        );
        meta.insert(
            "Space_Borg_Battleship_Raidisode".to_string(),
            CritterMeta { count: 2, deaths: 2, hull_damage_taken: vec![] },
        );
        meta.insert(
            "Mission_Borgraid1_Transwarp_02".to_string(),
            CritterMeta { count: 1, deaths: 1, hull_damage_taken: vec![] },
        );
        meta.insert(
            "Space_Borg_Dreadnought_Raidisode_Sibrian_Final_Boss".to_string(),
            CritterMeta { count: 1, deaths: 1, hull_damage_taken: vec![] },
        );

        assert_eq!(
            MapDetector::detect_by_deaths("Infected Space", &meta),
            Some(Difficulty::Elite)
        );
    }

    #[test]
    fn hull_damage_stage_tolerates_20_percent_shortfall() {
        let mut meta = HashMap::new();
        meta.insert(
            "Bluegills_Ground_Boss".to_string(),
            CritterMeta { count: 1, deaths: 1, hull_damage_taken: vec![360000.0] },
        );
        // 360000 is exactly 80% of 449432 (449432*0.8 = 359545.6), so this
        // should still match.
        assert_eq!(
            MapDetector::detect_by_hull_damage("Bug Hunt", &meta),
            Some(Difficulty::Elite)
        );
    }

    #[test]
    fn difficulty_ordering_is_normal_lt_advanced_lt_elite() {
        assert!(Difficulty::Normal < Difficulty::Advanced);
        assert!(Difficulty::Advanced < Difficulty::Elite);
    }
}
