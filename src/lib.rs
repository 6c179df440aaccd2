//! # session-harvest
//!
//! Rate-limited, resumable batch fetcher for verification decisions and the
//! media they reference.
//!
//! ## Design
//!
//! - **Globally paced** - every decision request waits on one shared [`RateLimiter`]
//! - **Patient with throttling** - a 429 triggers a fixed cooldown and a fresh attempt
//! - **Bounded** - at most `workers` sessions are in flight at once
//! - **Resumable** - progress lives in the input CSV; completed rows are never redone
//! - **Single writer** - only the coordinator mutates the checkpoint table
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_harvest::{RunConfig, harvest};
//! use session_harvest::config::ApiConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig {
//!         api: ApiConfig {
//!             api_key: std::env::var("SESSION_HARVEST_API_KEY")?,
//!             ..Default::default()
//!         },
//!         workers: 8,
//!         ..Default::default()
//!     };
//!
//!     let summary = harvest(&config, "sessions.csv").await?;
//!     println!("completed {} / failed {}", summary.completed, summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Asset resolution and download
pub mod assets;
/// CSV-backed checkpoint store
pub mod checkpoint;
/// Configuration types
pub mod config;
/// Decision records and fetcher
pub mod decision;
/// Error types
pub mod error;
/// Tracing subscriber setup
pub mod logging;
/// Per-session pipeline
pub mod pipeline;
/// Worker pool and coordinator
pub mod pool;
/// Request pacing
pub mod rate_limiter;
/// Retry-on-throttle logic
pub mod retry;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::path::Path;
use std::sync::Arc;

// Re-export commonly used types
pub use checkpoint::CheckpointStore;
pub use config::RunConfig;
pub use error::{Error, Result};
pub use pipeline::SessionPipeline;
pub use pool::{PoolOptions, run_sessions};
pub use rate_limiter::RateLimiter;
pub use types::{RunSummary, SessionTask, TaskStatus};

/// Run a complete harvest over the CSV at `input` with the production HTTP fetchers.
///
/// Validates the configuration and loads the checkpoint before any request is
/// made, so bad settings or a missing/malformed input fail fast.
pub async fn harvest(config: &RunConfig, input: impl AsRef<Path>) -> Result<RunSummary> {
    config.validate()?;

    let store = CheckpointStore::load(input)?;

    let limiter = RateLimiter::new(config.rate_limit.interval);
    let decisions = decision::HttpDecisionFetcher::new(config, limiter)?;
    let assets = assets::HttpAssetFetcher::new(config.api.request_timeout)?;

    tokio::fs::create_dir_all(&config.output_dir).await?;

    let pipeline = Arc::new(SessionPipeline::new(
        Arc::new(decisions),
        Arc::new(assets),
        config.output_dir.clone(),
    ));

    run_sessions(
        store,
        pipeline,
        PoolOptions {
            workers: config.workers,
            checkpoint_every: config.checkpoint_every,
        },
    )
    .await
}
