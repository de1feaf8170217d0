//! Error types for the combat-log analyzer core.
//!
//! Each component gets its own `thiserror` enum (mirrors the teacher's
//! `combat_log/error.rs` split between `ParseError` and `ReaderError`); they
//! compose into one top-level [`Error`] so callers of the public
//! [`crate::orchestrator::Orchestrator`] API only need to match on a single
//! type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding a single log line (spec.md §4.2, §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("malformed line: {reason} ({line:?})")]
    MalformedLine { line: String, reason: String },
}

/// Errors raised by the [`crate::reader::BackwardReader`] (spec.md §4.1, §7).
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    #[error("empty log: {0}")]
    EmptyLog(PathBuf),

    #[error("io error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by [`crate::tree::TreeModel`] insertion (spec.md §4.5, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("id already exists under a different parent")]
    DuplicateIdForDifferentParent,
}

/// Errors raised by the analyzer pass (spec.md §4.6, §7).
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer failed on line {line_text:?}: {source}")]
    Failure {
        line_text: String,
        #[source]
        source: Box<Error>,
    },

    #[error("error before loop! {0}")]
    BeforeLoop(#[source] Box<Error>),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Errors raised by [`crate::repair::LogRepair`] (spec.md §4.8, §7).
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("permission denied replacing {path}, temp file preserved at {temp_path}")]
    Permission { path: PathBuf, temp_path: PathBuf },

    #[error("io error during repair of {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid byte range [{start}, {end}) requested from {path}")]
    InvalidRange { path: PathBuf, start: u64, end: u64 },
}

/// Top-level error type surfaced by the public orchestrator API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Repair(#[from] RepairError),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Caller-supplied error handler used by the Orchestrator (spec.md §7).
///
/// Defaults to rethrowing (`Err(e)`); a caller can install a different
/// handler to, e.g., log-and-continue for non-fatal stages.
pub type ErrorHandler = Box<dyn Fn(Error) -> Result<(), Error> + Send + Sync>;

pub fn rethrowing_handler() -> ErrorHandler {
    Box::new(Err)
}
