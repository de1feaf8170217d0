//! Shared CLI state: the loaded `Orchestrator`, the active log path, and the
//! most recent `analyze()` summaries. Grounded on the teacher's
//! `CliContext` — a thin `Arc`/lock wrapper handed to each command — with
//! the file-index/watcher state dropped since this CLI opens one log at a
//! time rather than watching a directory (spec.md §6).

use logfathom_core::orchestrator::{CombatSummary, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Session {
    pub path: PathBuf,
    pub orchestrator: Orchestrator,
    pub summaries: Vec<CombatSummary>,
}

/// Holds all shared state for the CLI application.
#[derive(Clone)]
pub struct CliContext {
    session: Arc<RwLock<Option<Session>>>,
}

impl CliContext {
    pub fn new() -> Self {
        CliContext { session: Arc::new(RwLock::new(None)) }
    }

    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    pub async fn with_session<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&Session) -> R,
    {
        self.session.read().await.as_ref().map(f)
    }

    pub async fn with_session_mut<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        self.session.write().await.as_mut().map(f)
    }
}

impl Default for CliContext {
    fn default() -> Self {
        Self::new()
    }
}
