use std::path::PathBuf;
use std::time::Instant;

use serde::Deserialize;

use crate::db::SqliteStore;
use crate::session::{Session, TeardownReport};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub session: Option<Session<SqliteStore>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            session: None,
        }
    }

    pub fn next_write_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.next_write_deadline())
    }

    pub fn flush_due(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            let report = session.flush_due(now);
            if report.written + report.failed > 0 {
                tracing::debug!(written = report.written, failed = report.failed, "deferred writes flushed");
            }
        }
    }

    /// Tears down the open session, if any, while its store is still open.
    pub fn close_workspace(&mut self) -> Option<TeardownReport> {
        let mut session = self.session.take()?;
        let report = session.teardown();
        if let Some(path) = self.workspace.take() {
            tracing::info!(
                workspace = %path.display(),
                flushed = report.flushed.written,
                failed = report.flushed.failed,
                "workspace closed"
            );
        }
        Some(report)
    }
}
