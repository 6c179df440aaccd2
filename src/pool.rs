//! Worker pool and coordinator.
//!
//! A dispatcher hands pending tasks to at most `workers` concurrent session
//! pipelines. Each worker reports `(row, status)` over a channel to the
//! coordinator, which is the only code that touches the [`CheckpointStore`].
//!
//! ```text
//!   pending tasks ──► dispatcher ──(permit)──► worker ─┐
//!                                   ...                ├─ mpsc ──► coordinator ──► CheckpointStore
//!                                   (permit)──► worker ─┘                 (persist every K + at end)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{Id as TaskId, JoinSet};

use crate::checkpoint::CheckpointStore;
use crate::error::Result;
use crate::pipeline::SessionPipeline;
use crate::types::{RunSummary, TaskStatus};

/// Settings for one pool run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of sessions processed at the same time (0 is treated as 1)
    pub workers: usize,
    /// Persist after this many results (0 = only at the end)
    pub checkpoint_every: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            checkpoint_every: 25,
        }
    }
}

/// Owns the checkpoint store on behalf of the coordinator and saves it periodically
pub struct Checkpointer {
    store: CheckpointStore,
    every: usize,
    since_persist: usize,
    summary: RunSummary,
}

impl Checkpointer {
    /// Wrap a freshly loaded store
    pub fn new(store: CheckpointStore, every: usize) -> Self {
        let summary = RunSummary {
            total_rows: store.total_rows(),
            queued: store.pending_count(),
            ..Default::default()
        };

        Self {
            store,
            every,
            since_persist: 0,
            summary,
        }
    }

    /// Read access to the underlying store
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Counters so far
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Record one result, persisting when `every` results have accumulated
    ///
    /// Returns whether the store was written.
    pub async fn record(&mut self, row: usize, status: TaskStatus) -> Result<bool> {
        self.store.record(row, status)?;
        self.summary.record(status);
        self.since_persist += 1;

        if self.every == 0 || self.since_persist < self.every {
            return Ok(false);
        }

        self.store.persist().await?;
        self.since_persist = 0;

        let s = &self.summary;
        tracing::info!(
            processed = s.processed,
            queued = s.queued,
            completed = s.completed,
            failed = s.failed,
            skipped = s.skipped,
            "progress"
        );
        Ok(true)
    }

    /// Final persist; returns the store and the run summary
    pub async fn finish(self) -> Result<(CheckpointStore, RunSummary)> {
        self.store.persist().await?;
        Ok((self.store, self.summary))
    }
}

/// Run every pending task of `store` through `pipeline`
///
/// Tasks already `completed` in the store are never dispatched. The store is
/// persisted every `options.checkpoint_every` results and once at the end.
/// Pipeline failures become task statuses; only checkpoint errors abort the
/// run, after which no further tasks are dispatched.
pub async fn run_sessions(
    store: CheckpointStore,
    pipeline: Arc<SessionPipeline>,
    options: PoolOptions,
) -> Result<RunSummary> {
    let tasks = store.pending_tasks();
    let mut checkpointer = Checkpointer::new(store, options.checkpoint_every);

    let workers = options.workers.max(1);
    tracing::info!(
        total_rows = checkpointer.summary().total_rows,
        queued = tasks.len(),
        workers = workers,
        "starting session pool"
    );

    let concurrent_limit = Arc::new(Semaphore::new(workers));
    let (result_tx, mut result_rx) = mpsc::channel::<(usize, TaskStatus)>(workers * 2);

    // Dispatcher: one permit per in-flight session. Workers live in a JoinSet
    // owned by the dispatcher, so aborting it cancels every running session.
    let dispatcher = {
        let concurrent_limit = concurrent_limit.clone();
        tokio::spawn(async move {
            let mut running = JoinSet::new();
            let mut rows_by_task: HashMap<TaskId, usize> = HashMap::new();
            let mut queue = tasks.into_iter();
            let mut next = queue.next();

            loop {
                tokio::select! {
                    permit = concurrent_limit.clone().acquire_owned(), if next.is_some() => {
                        // Closed by the coordinator after a checkpoint failure
                        let Ok(permit) = permit else { break };
                        let Some(task) = next.take() else { continue };
                        next = queue.next();

                        let row = task.row;
                        let pipeline = pipeline.clone();
                        let result_tx = result_tx.clone();
                        let handle = running.spawn(async move {
                            let _permit = permit;
                            let status = pipeline.run(&task).await;
                            result_tx.send((task.row, status)).await.ok();
                        });
                        rows_by_task.insert(handle.id(), row);
                    }
                    Some(joined) = running.join_next_with_id() => match joined {
                        Ok((id, ())) => {
                            rows_by_task.remove(&id);
                        }
                        Err(e) => {
                            // A panicking session still gets a result for its row
                            if let Some(row) = rows_by_task.remove(&e.id()) {
                                tracing::error!(row = row, error = %e, "session worker crashed");
                                result_tx.send((row, TaskStatus::Failed)).await.ok();
                            }
                        }
                    },
                    else => break,
                }
            }
        })
    };

    // Coordinator: sole writer of the checkpoint store
    while let Some((row, status)) = result_rx.recv().await {
        tracing::debug!(row = row, status = %status, "session finished");
        if let Err(e) = checkpointer.record(row, status).await {
            tracing::error!(row = row, error = %e, "checkpoint update failed, stopping dispatch");
            concurrent_limit.close();
            dispatcher.abort();
            // Wait until the dispatcher and its workers are torn down
            dispatcher.await.ok();
            return Err(e);
        }
    }

    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "dispatcher task failed");
    }

    let (_store, summary) = checkpointer.finish().await?;
    tracing::info!(
        processed = summary.processed,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "session pool finished"
    );
    Ok(summary)
}
