//! Shared fakes for pipeline and pool tests.

use crate::assets::AssetFetcher;
use crate::checkpoint::CheckpointStore;
use crate::decision::{Decision, DecisionFetcher, IdVerification, Liveness};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// A decision with one document image and one liveness video
pub(crate) fn two_asset_decision() -> Decision {
    Decision {
        id_verification: Some(IdVerification {
            front_image: Some("https://cdn.example.com/front.jpg".to_string()),
            ..Default::default()
        }),
        liveness: Some(Liveness {
            video_url: Some("https://cdn.example.com/video/stream".to_string()),
            ..Default::default()
        }),
    }
}

/// Write `rows` session rows (`s{i}`, `c{i}`) to a CSV in a fresh temp dir.
///
/// Rows listed in `completed` are pre-marked as completed.
pub(crate) fn write_sessions_csv(rows: usize, completed: &[usize]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.csv");

    let mut content = String::from("id,client_id,downloaded\n");
    for i in 0..rows {
        let status = if completed.contains(&i) { "completed" } else { "" };
        content.push_str(&format!("s{i},c{i},{status}\n"));
    }
    std::fs::write(&path, content).unwrap();

    (dir, path)
}

/// Load the store written by [`write_sessions_csv`]
pub(crate) fn load_store(path: &Path) -> CheckpointStore {
    CheckpointStore::load(path).unwrap()
}

/// [`DecisionFetcher`] returning a fixed decision, with call accounting
pub(crate) struct FakeDecisions {
    decision: Option<Decision>,
    delay: Duration,
    panic_on: Option<String>,
    in_flight: AtomicUsize,
    /// Number of fetch calls
    pub(crate) calls: AtomicUsize,
    /// Highest number of concurrent fetch calls observed
    pub(crate) max_in_flight: AtomicUsize,
    /// Fetch calls that ran to completion
    pub(crate) finished: AtomicUsize,
    /// Session ids in call order
    pub(crate) seen: Mutex<Vec<String>>,
}

impl FakeDecisions {
    /// Every fetch succeeds with `decision`
    pub(crate) fn returning(decision: Decision) -> Self {
        Self {
            decision: Some(decision),
            delay: Duration::ZERO,
            panic_on: None,
            in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch fails with a 500
    pub(crate) fn failing() -> Self {
        Self {
            decision: None,
            ..Self::returning(Decision::default())
        }
    }

    /// Hold each call open for `delay`
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panic when asked for `session_id`
    pub(crate) fn panicking_on(mut self, session_id: &str) -> Self {
        self.panic_on = Some(session_id.to_string());
        self
    }

    /// Session ids fetched so far, sorted
    pub(crate) fn seen_sorted(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

#[async_trait::async_trait]
impl DecisionFetcher for FakeDecisions {
    async fn fetch(&self, session_id: &str) -> Result<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(session_id.to_string());

        if self.panic_on.as_deref() == Some(session_id) {
            panic!("fake fetcher asked to panic on {session_id}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);

        self.decision.clone().ok_or_else(|| Error::RequestFailed {
            session_id: session_id.to_string(),
            status: 500,
        })
    }
}

/// [`AssetFetcher`] that records destinations instead of downloading; URLs in
/// `broken` fail
#[derive(Default)]
pub(crate) struct RecordingAssets {
    /// URLs that fail to download
    pub(crate) broken: HashSet<String>,
    /// Destinations "written", in call order
    pub(crate) written: Mutex<Vec<PathBuf>>,
}

impl RecordingAssets {
    /// Fetcher for which every URL in `urls` fails
    pub(crate) fn with_broken(urls: &[&str]) -> Self {
        Self {
            broken: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl AssetFetcher for RecordingAssets {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
        if self.broken.contains(url) {
            return Err(Error::AssetDownloadFailed {
                url: url.to_string(),
                reason: "unreachable".to_string(),
            });
        }
        self.written.lock().unwrap().push(dest.to_path_buf());
        Ok(1)
    }
}
