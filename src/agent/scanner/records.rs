use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aggregate size of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffTotals {
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

impl DiffTotals {
    /// Positive growth since `previous`. Shrinking counts clamp to zero so that a
    /// revert never produces negative reporting.
    pub fn delta_since(&self, previous: &DiffTotals) -> DiffTotals {
        DiffTotals {
            files_changed: self.files_changed.saturating_sub(previous.files_changed),
            lines_added: self.lines_added.saturating_sub(previous.lines_added),
            lines_deleted: self.lines_deleted.saturating_sub(previous.lines_deleted),
        }
    }
}

/// A single reportable unit of repository activity. Only the repository's
/// directory basename travels with the record, the absolute path stays local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub repo_name: Arc<str>,
    pub branch: Arc<str>,
    #[serde(flatten)]
    pub totals: DiffTotals,
    pub committed: bool,
    /// Present for commit records. The collector side deduplicates on this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Why a repository was skipped during a pass.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    /// The receiving side of the reporting channel is gone. Unlike the other
    /// variants this one aborts the whole pass.
    #[error("change reporter is closed")]
    ReporterClosed,
}

/// Outcome counters for one scan pass. Skips are counted instead of silently
/// swallowed so callers can observe degraded passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub repos_scanned: usize,
    pub repos_skipped: usize,
    pub commits_seen: usize,
    pub records_emitted: usize,
}
