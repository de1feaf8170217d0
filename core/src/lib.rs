//! Core analysis engine for off-line and live parsing of combat logs
//! (spec.md §1-§2).

pub mod analyzer;
pub mod combat;
pub mod config;
pub mod error;
pub mod line;
pub mod live;
pub mod mapdetect;
pub mod orchestrator;
pub mod reader;
pub mod repair;
pub mod rows;
pub mod splitter;
pub mod tree;

pub use analyzer::Analyzer;
pub use combat::Combat;
pub use error::{AnalyzerError, Error, ErrorHandler, ParseError, ReaderError, RepairError, TreeError};
pub use line::{LogLine, LogLineCodec};
pub use live::LiveParser;
pub use mapdetect::{Difficulty, MapDetector};
pub use orchestrator::{CombatSummary, Orchestrator};
pub use reader::BackwardReader;
pub use repair::LogRepair;
pub use rows::{DamageTableRow, HealTableRow, OverviewTableRow};
pub use splitter::{CombatSplitter, SplitterConfig};
pub use tree::TreeModel;

pub use logfathom_types::Settings;
