//! Verification decision records and the rate-limited fetcher that retrieves them.

use crate::config::{RunConfig, ThrottleConfig};
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::retry_on_throttle;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Header carrying the static API credential
const API_KEY_HEADER: &str = "X-Api-Key";

/// The remote API's verification outcome for one session
///
/// Only the parts that reference downloadable media are modelled; every other
/// field of the response is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Identity document section
    #[serde(default)]
    pub id_verification: Option<IdVerification>,
    /// Liveness check section
    #[serde(default)]
    pub liveness: Option<Liveness>,
}

/// Identity document images
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdVerification {
    /// Cropped front side of the document
    #[serde(default)]
    pub front_image: Option<String>,
    /// Portrait extracted from the document
    #[serde(default)]
    pub portrait_image: Option<String>,
    /// Uncropped front side of the document
    #[serde(default)]
    pub full_front_image: Option<String>,
}

/// Liveness check media
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    /// Reference still captured during the liveness check
    #[serde(default)]
    pub reference_image: Option<String>,
    /// Recording of the liveness check
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Abstraction over decision retrieval, enabling testability.
#[async_trait::async_trait]
pub trait DecisionFetcher: Send + Sync {
    /// Retrieve the decision for one session
    async fn fetch(&self, session_id: &str) -> Result<Decision>;
}

/// Production [`DecisionFetcher`] backed by the verification HTTP API.
///
/// Every attempt (including retries after throttling) first waits on the shared
/// [`RateLimiter`].
pub struct HttpDecisionFetcher {
    client: reqwest::Client,
    base_url: url::Url,
    api_key: String,
    limiter: RateLimiter,
    throttle: ThrottleConfig,
}

impl HttpDecisionFetcher {
    /// Build a fetcher from the run configuration and a shared limiter
    pub fn new(config: &RunConfig, limiter: RateLimiter) -> Result<Self> {
        let base_url = url::Url::parse(&config.api.base_url)
            .map_err(|e| Error::config("base_url", format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config("base_url", "base URL cannot carry a path"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.api.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api.api_key.clone(),
            limiter,
            throttle: config.throttle.clone(),
        })
    }

    /// `{base_url}/{session_id}/decision/`, with the session id percent-encoded
    fn decision_url(&self, session_id: &str) -> url::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(session_id).push("decision").push("");
        }
        url
    }

    /// One paced request without any retry
    async fn fetch_once(&self, session_id: &str) -> Result<Decision> {
        self.limiter.acquire().await;

        let url = self.decision_url(session_id);
        tracing::debug!(session_id = %session_id, url = %url, "fetching decision");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::Throttled {
                session_id: session_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::RequestFailed {
                session_id: session_id.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait::async_trait]
impl DecisionFetcher for HttpDecisionFetcher {
    async fn fetch(&self, session_id: &str) -> Result<Decision> {
        retry_on_throttle(&self.throttle, || self.fetch_once(session_id)).await
    }
}
