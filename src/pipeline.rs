//! Session pipeline. Fetches one session's decision and downloads its assets.
//!
//! The pipeline is the unit of work a pool worker runs. It never returns an
//! error: every failure is logged and folded into the task's terminal status.
//!
//! Success policy: a session is `completed` as soon as one of its assets was
//! downloaded, even if the others failed.

use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::{AssetFetcher, asset_path, resolve_assets};
use crate::decision::DecisionFetcher;
use crate::types::{SessionTask, TaskStatus};

/// Composes the decision fetcher and the asset fetcher for one session
pub struct SessionPipeline {
    decisions: Arc<dyn DecisionFetcher>,
    assets: Arc<dyn AssetFetcher>,
    output_dir: PathBuf,
}

impl SessionPipeline {
    /// Create a pipeline writing assets under `output_dir`
    pub fn new(
        decisions: Arc<dyn DecisionFetcher>,
        assets: Arc<dyn AssetFetcher>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            decisions,
            assets,
            output_dir: output_dir.into(),
        }
    }

    /// Process one task to a terminal status
    ///
    /// Phases:
    /// 1. Reject blank session ids (`skipped`, no network call)
    /// 2. Fetch the decision (`failed` on any error)
    /// 3. Resolve asset URLs (`failed` if there are none)
    /// 4. Download each asset independently
    /// 5. `completed` if at least one download succeeded, else `failed`
    pub async fn run(&self, task: &SessionTask) -> TaskStatus {
        let session_id = match task.checked_session_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(row = task.row, error = %e, "skipping row");
                return TaskStatus::Skipped;
            }
        };

        let decision = match self.decisions.fetch(session_id).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(row = task.row, session_id = %session_id, error = %e, "failed to fetch decision");
                return TaskStatus::Failed;
            }
        };

        let assets = resolve_assets(&decision);
        if assets.is_empty() {
            tracing::warn!(row = task.row, session_id = %session_id, "decision has no downloadable assets");
            return TaskStatus::Failed;
        }

        let folder = task.folder_name();
        let mut downloaded = 0usize;

        for asset in &assets {
            let dest = asset_path(&self.output_dir, folder, asset);
            match self.assets.fetch_to(&asset.url, &dest).await {
                Ok(bytes) => {
                    downloaded += 1;
                    tracing::debug!(
                        session_id = %session_id,
                        asset = asset.name,
                        bytes = bytes,
                        path = %dest.display(),
                        "asset downloaded"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        asset = asset.name,
                        error = %e,
                        "asset download failed"
                    );
                }
            }
        }

        if downloaded > 0 {
            if downloaded < assets.len() {
                tracing::info!(
                    session_id = %session_id,
                    downloaded = downloaded,
                    total = assets.len(),
                    "session completed with missing assets"
                );
            }
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }
}
