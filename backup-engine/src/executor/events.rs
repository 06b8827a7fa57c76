//! Events streamed from a running backup job to its caller.
//!
//! A run produces zero or more [`BackupEvent::Progress`] messages followed by
//! exactly one [`BackupEvent::Completed`].

use crate::snapshot::RetentionReport;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BackupEvent {
    /// A file was copied
    #[serde(rename = "backup:progress")]
    Progress(ProgressEvent),

    /// Terminal event of the run
    #[serde(rename = "backup:completed")]
    Completed(CompletionEvent),
}

/// Cumulative counters after a file has been copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub current_path: PathBuf,
    pub files_copied: u64,
    pub bytes_copied: u64,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionEvent {
    pub outcome: Outcome,
    /// Snapshot directory, if anything was written to it
    pub snapshot: Option<PathBuf>,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub skipped: u64,
    /// Recoverable per-entry errors, in the order they occurred
    pub errors: Vec<String>,
    /// Set only for `Outcome::Failed`
    pub fatal_error: Option<String>,
    /// Present only when retention ran (after a completed copy)
    pub retention: Option<RetentionReport>,
    pub duration_secs: u64,
}

impl CompletionEvent {
    pub fn cancelled(&self) -> bool {
        self.outcome == Outcome::Cancelled
    }

    pub(crate) fn failed(fatal_error: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            snapshot: None,
            files_copied: 0,
            bytes_copied: 0,
            skipped: 0,
            errors: Vec::new(),
            fatal_error: Some(fatal_error.into()),
            retention: None,
            duration_secs: 0,
        }
    }
}
