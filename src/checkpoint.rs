//! Checkpoint store: the input table doubling as the durable record of progress.
//!
//! The store loads the CSV once, hands out the rows that still need work, takes
//! terminal statuses from the coordinator, and rewrites the whole file on
//! [`CheckpointStore::persist`]. It is owned by a single coordinator and has no
//! internal locking.
//!
//! Status rules:
//! - rows whose `downloaded` cell reads `completed` are done and never re-queued
//! - every other row (blank, `failed`, `skipped`, anything else) is pending
//! - a pending row accepts exactly one terminal status per run

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{SessionTask, TaskStatus};

/// Column holding the remote session id
pub const SESSION_COLUMN: &str = "id";
/// Column holding the client id
pub const CLIENT_COLUMN: &str = "client_id";
/// Column holding the per-row status; created if absent
pub const STATUS_COLUMN: &str = "downloaded";

/// CSV-backed table of per-row statuses
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    statuses: Vec<TaskStatus>,
    session_col: usize,
    client_col: usize,
    status_col: usize,
}

impl CheckpointStore {
    /// Load the table at `path`
    ///
    /// Fails if the file is missing, unreadable, or lacks the `id` or
    /// `client_id` column. A `downloaded` column is appended when absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let session_col = find(SESSION_COLUMN).ok_or_else(|| Error::MissingColumn(SESSION_COLUMN.to_string()))?;
        let client_col = find(CLIENT_COLUMN).ok_or_else(|| Error::MissingColumn(CLIENT_COLUMN.to_string()))?;
        let existing_status_col = find(STATUS_COLUMN);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<String>>());
        }

        // A new status column goes after the widest row so cells beyond the
        // header are kept as data rather than read as a status.
        let status_col = match existing_status_col {
            Some(col) => col,
            None => {
                let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
                if widest > headers.len() {
                    headers.resize(widest, String::new());
                }
                headers.push(STATUS_COLUMN.to_string());
                headers.len() - 1
            }
        };

        let statuses: Vec<TaskStatus> = rows
            .iter_mut()
            .map(|cells| {
                if cells.len() < headers.len() {
                    cells.resize(headers.len(), String::new());
                }
                match TaskStatus::from_cell(&cells[status_col]) {
                    TaskStatus::Completed => TaskStatus::Completed,
                    _ => TaskStatus::Pending,
                }
            })
            .collect();

        tracing::debug!(
            path = %path.display(),
            rows = rows.len(),
            completed = statuses.iter().filter(|s| s.is_terminal()).count(),
            "checkpoint loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
            statuses,
            session_col,
            client_col,
            status_col,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// Current status of a row in this run
    ///
    /// Rows completed in an earlier run report `Completed`; re-queued rows
    /// report `Pending` until the coordinator records their outcome.
    pub fn status(&self, row: usize) -> Option<TaskStatus> {
        self.statuses.get(row).copied()
    }

    /// Number of rows still waiting for an outcome
    pub fn pending_count(&self) -> usize {
        self.statuses.iter().filter(|s| !s.is_terminal()).count()
    }

    /// Tasks for every row that is not yet completed, in table order
    pub fn pending_tasks(&self) -> Vec<SessionTask> {
        self.rows
            .iter()
            .zip(&self.statuses)
            .enumerate()
            .filter(|(_, (_, status))| !status.is_terminal())
            .map(|(row, (cells, _))| {
                SessionTask::new(row, &cells[self.session_col], &cells[self.client_col])
            })
            .collect()
    }

    /// Record the terminal status of a pending row
    ///
    /// Rejects `Pending`, rows that already hold a terminal status (including
    /// rows completed in an earlier run), and unknown rows. The file is not
    /// written until [`persist`](Self::persist).
    pub fn record(&mut self, row: usize, status: TaskStatus) -> Result<()> {
        let current = self.status(row).ok_or(Error::RowOutOfRange(row))?;

        if current.is_terminal() || !status.is_terminal() {
            return Err(Error::InvalidTransition {
                row,
                from: current,
                to: status,
            });
        }

        self.statuses[row] = status;
        self.rows[row][self.status_col] = status.as_str().to_string();
        Ok(())
    }

    /// Rewrite the backing file with the current table
    ///
    /// The table is written to a temporary sibling file and renamed over the
    /// original, so a crash mid-write leaves the previous checkpoint intact.
    pub async fn persist(&self) -> Result<()> {
        let bytes = self.to_csv_bytes()?;
        let tmp = temp_path(&self.path);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), rows = self.rows.len(), "checkpoint persisted");
        Ok(())
    }

    fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
