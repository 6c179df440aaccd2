//! Core types for session-harvest

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Processing status of one session task
///
/// Only `Pending` is a non-terminal status. The coordinator moves a task from
/// `Pending` to exactly one terminal status per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not yet processed in this run
    #[default]
    Pending,
    /// At least one asset was downloaded
    Completed,
    /// The decision could not be fetched, or no asset could be downloaded
    Failed,
    /// The row has no usable session identifier
    Skipped,
}

impl TaskStatus {
    /// Whether the status is terminal (anything but `Pending`)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    /// The value written to the checkpoint column for this status
    ///
    /// `Pending` is written as an empty cell.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Parse a checkpoint cell
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unknown values (including blanks) map to `Pending` so the row is retried.
    pub fn from_cell(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("completed") {
            TaskStatus::Completed
        } else if value.eq_ignore_ascii_case("failed") {
            TaskStatus::Failed
        } else if value.eq_ignore_ascii_case("skipped") {
            TaskStatus::Skipped
        } else {
            TaskStatus::Pending
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// One unit of work: a single row of the input table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTask {
    /// Zero-based data row index in the input table (header excluded)
    pub row: usize,
    /// Remote session identifier, trimmed
    pub session_id: String,
    /// Client identifier, trimmed; used as the asset folder name
    pub client_id: String,
    /// Current status
    pub status: TaskStatus,
}

impl SessionTask {
    /// Create a pending task, trimming both identifiers
    pub fn new(row: usize, session_id: &str, client_id: &str) -> Self {
        Self {
            row,
            session_id: session_id.trim().to_string(),
            client_id: client_id.trim().to_string(),
            status: TaskStatus::Pending,
        }
    }

    /// Whether the session identifier is usable for an API call
    ///
    /// Blank identifiers and the literal `nan` (left behind by spreadsheet
    /// exports of empty cells) are rejected.
    pub fn has_session_id(&self) -> bool {
        !self.session_id.is_empty() && !self.session_id.eq_ignore_ascii_case("nan")
    }

    /// The session identifier, or [`Error::EmptyIdentifier`] if it is unusable
    pub fn checked_session_id(&self) -> Result<&str> {
        if self.has_session_id() {
            Ok(&self.session_id)
        } else {
            Err(Error::EmptyIdentifier { row: self.row })
        }
    }

    /// Folder name for this task's assets
    ///
    /// Falls back to the session id when the client id is blank, so assets of
    /// different sessions never land in the shared output root.
    pub fn folder_name(&self) -> &str {
        if self.client_id.is_empty() {
            &self.session_id
        } else {
            &self.client_id
        }
    }
}

/// Outcome counters for one run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Rows in the input table
    pub total_rows: usize,
    /// Rows dispatched in this run (not already completed)
    pub queued: usize,
    /// Tasks that reached a terminal status in this run
    pub processed: usize,
    /// Tasks marked completed
    pub completed: usize,
    /// Tasks marked failed
    pub failed: usize,
    /// Tasks marked skipped
    pub skipped: usize,
}

impl RunSummary {
    /// Count one terminal status
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Pending => return,
        }
        self.processed += 1;
    }
}
