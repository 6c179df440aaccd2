//! Asset resolution and download.
//!
//! A [`Decision`] references a fixed set of named media URLs. This module turns
//! those into [`Asset`]s with an inferred file extension, and streams each one
//! to `{output_dir}/{folder}/{name}.{ext}`.

use crate::decision::Decision;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Per-process counter making every in-flight temp file name distinct
static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Extensions recognised from the URL path suffix, in match order
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf", "mp4"];

/// Extension for streaming video URLs without a recognisable suffix
const VIDEO_EXTENSION: &str = "mp4";

/// Extension used when nothing else matches
const DEFAULT_EXTENSION: &str = "jpg";

/// A single downloadable file referenced by a decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    /// Stable asset name, used as the file stem (e.g. "front_image")
    pub name: &'static str,
    /// Source URL
    pub url: String,
    /// Inferred file extension without the dot
    pub extension: &'static str,
}

impl Asset {
    fn new(name: &'static str, url: &str) -> Self {
        let url = url.trim().to_string();
        let extension = extension_for_url(&url);
        Self {
            name,
            url,
            extension,
        }
    }

    /// File name of this asset on disk
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.extension)
    }
}

/// Collect every present, non-empty asset URL from a decision
///
/// Order is fixed: document images first, then liveness media.
pub fn resolve_assets(decision: &Decision) -> Vec<Asset> {
    let mut candidates: Vec<(&'static str, Option<&str>)> = Vec::with_capacity(5);

    if let Some(iv) = &decision.id_verification {
        candidates.push(("front_image", iv.front_image.as_deref()));
        candidates.push(("portrait_image", iv.portrait_image.as_deref()));
        candidates.push(("full_front_image", iv.full_front_image.as_deref()));
    }

    if let Some(lv) = &decision.liveness {
        candidates.push(("reference_image", lv.reference_image.as_deref()));
        candidates.push(("video", lv.video_url.as_deref()));
    }

    candidates
        .into_iter()
        .filter_map(|(name, url)| match url {
            Some(url) if !url.trim().is_empty() => Some(Asset::new(name, url)),
            _ => None,
        })
        .collect()
}

/// Infer a file extension from a URL
///
/// Only the URL path is inspected (query string and fragment are ignored).
/// Falls back to `mp4` for video paths and `jpg` otherwise.
///
/// # Examples
///
/// ```
/// use session_harvest::assets::extension_for_url;
///
/// assert_eq!(extension_for_url("https://cdn.example.com/a/front.PNG?sig=1"), "png");
/// assert_eq!(extension_for_url("https://cdn.example.com/liveness/video/stream"), "mp4");
/// assert_eq!(extension_for_url("https://cdn.example.com/blob/1234"), "jpg");
/// ```
pub fn extension_for_url(url: &str) -> &'static str {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };

    if let Some(ext) = KNOWN_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| path.ends_with(ext))
    {
        return ext;
    }

    if path.contains("video") {
        return VIDEO_EXTENSION;
    }

    DEFAULT_EXTENSION
}

/// Destination path of an asset: `{output_dir}/{folder}/{name}.{ext}`
pub fn asset_path(output_dir: &Path, folder: &str, asset: &Asset) -> PathBuf {
    output_dir.join(folder).join(asset.file_name())
}

/// Abstraction over asset download, enabling testability.
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download `url` to `dest`, creating parent directories as needed.
    ///
    /// Returns the number of bytes written.
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Production [`AssetFetcher`] using plain HTTP GET.
///
/// Asset URLs are pre-signed storage links, so no credential is sent and the
/// requests are not paced by the API rate limiter.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    /// Create a fetcher with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AssetDownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP status {status}"),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream into a sibling temp file so a broken transfer never leaves a
        // truncated file under the final name.
        let partial = partial_path(dest);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;

        let copy_result: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copy_result {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                tracing::debug!(path = %partial.display(), error = %cleanup, "failed to remove partial file");
            }
            return Err(e);
        }

        drop(file);
        tokio::fs::rename(&partial, dest).await?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
        self.download(url, dest).await.map_err(|e| match e {
            Error::AssetDownloadFailed { .. } => e,
            other => Error::AssetDownloadFailed {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

/// Unique sibling temp path for one download of `dest`
///
/// Sessions of the same client may download the same destination concurrently.
fn partial_path(dest: &Path) -> PathBuf {
    let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}-{seq}.part", std::process::id()));
    dest.with_file_name(name)
}
