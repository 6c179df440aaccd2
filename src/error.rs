//! Error types for session-harvest
//!
//! This module provides the single error type used throughout the library:
//! - Configuration and input errors that stop a run before any work starts
//! - Remote API outcomes (throttled, non-success responses, transport failures)
//! - Per-asset download failures
//! - Checkpoint store violations (out-of-range rows, non-monotonic transitions)

use std::path::PathBuf;
use thiserror::Error;

use crate::types::TaskStatus;

/// Result type alias for session-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for session-harvest
///
/// Each variant includes enough context to diagnose which session, row, or URL
/// was involved. Pipeline-level variants never escape the session pipeline;
/// they are converted into a [`TaskStatus`] there.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api_key")
        key: Option<String>,
    },

    /// The input table does not exist
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A required column is missing from the input table
    #[error("input is missing required column '{0}'")]
    MissingColumn(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (malformed decision body)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error (connect failure, timeout, broken body)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service signalled that the caller exceeded its rate limit
    #[error("throttled by remote API while fetching session {session_id}")]
    Throttled {
        /// The session whose request was throttled
        session_id: String,
    },

    /// The remote service answered with a non-success status other than 429
    #[error("decision request for session {session_id} failed with status {status}")]
    RequestFailed {
        /// The session whose request failed
        session_id: String,
        /// HTTP status code returned by the API
        status: u16,
    },

    /// The session identifier is blank or unparseable
    #[error("row {row} has an empty session identifier")]
    EmptyIdentifier {
        /// Row index in the input table
        row: usize,
    },

    /// A single asset could not be downloaded
    #[error("download of {url} failed: {reason}")]
    AssetDownloadFailed {
        /// The asset URL
        url: String,
        /// Why the download failed
        reason: String,
    },

    /// A status change would move a row backwards or record it twice
    #[error("invalid status transition for row {row}: {from} -> {to}")]
    InvalidTransition {
        /// Row index in the checkpoint table
        row: usize,
        /// Status currently held by the row
        from: TaskStatus,
        /// Status that was requested
        to: TaskStatus,
    },

    /// The checkpoint table has no row with this index
    #[error("row {0} is not present in the checkpoint table")]
    RowOutOfRange(usize),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Classification of errors that signal remote throttling
///
/// Throttled failures are retried after a cooldown by [`crate::retry::retry_on_throttle`];
/// everything else is surfaced to the caller immediately.
pub trait IsThrottled {
    /// Returns true if the remote service asked the caller to slow down
    fn is_throttled(&self) -> bool;
}

impl IsThrottled for Error {
    fn is_throttled(&self) -> bool {
        matches!(self, Error::Throttled { .. })
    }
}
