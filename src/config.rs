//! Configuration types for session-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote verification API settings
///
/// Used as a nested sub-config within [`RunConfig`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the session endpoint (default: "https://verification.didit.me/v2/session")
    ///
    /// Decisions are fetched from `{base_url}/{session_id}/decision/`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Static credential sent as the `X-Api-Key` header
    #[serde(default)]
    pub api_key: String,

    /// Per-attempt request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Outbound pacing for decision requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between two decision requests across all workers
    /// (default: 600 ms, i.e. 100 requests per minute)
    #[serde(default = "default_interval", with = "duration_millis_serde")]
    pub interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

/// Behaviour when the API answers 429
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Fixed pause before re-issuing a throttled request (default: 60 seconds)
    #[serde(default = "default_cooldown", with = "duration_serde")]
    pub cooldown: Duration,

    /// Cap on attempts per request while throttled (default: None = retry forever)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            max_attempts: None,
        }
    }
}

impl ThrottleConfig {
    /// Build from a cap on retries after the first throttled attempt
    ///
    /// `Some(0)` means a throttled request is never retried; `None` retries forever.
    pub fn with_max_retries(cooldown: Duration, max_retries: Option<u32>) -> Self {
        Self {
            cooldown,
            max_attempts: max_retries.map(|retries| retries.saturating_add(1)),
        }
    }
}

/// Main configuration for a harvest run
///
/// Groups the remote API, pacing and throttle settings with the run-level knobs
/// (worker count, checkpoint frequency, output directory).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Pacing of decision requests
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Throttle retry settings
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Number of sessions processed concurrently (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Persist the checkpoint after this many finished tasks (default: 25, 0 = only at the end)
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Root directory for downloaded assets (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            rate_limit: RateLimitConfig::default(),
            throttle: ThrottleConfig::default(),
            workers: default_workers(),
            checkpoint_every: default_checkpoint_every(),
            output_dir: default_output_dir(),
        }
    }
}

impl RunConfig {
    /// Check the settings that cannot be defaulted
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(Error::config("api_key", "an API key is required"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(Error::config("base_url", "base URL must not be empty"));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| Error::config("base_url", format!("invalid base URL: {e}")))?;
        if self.workers == 0 {
            return Err(Error::config("workers", "worker count must be at least 1"));
        }
        if self.throttle.max_attempts == Some(0) {
            return Err(Error::config(
                "throttle.max_attempts",
                "max attempts must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://verification.didit.me/v2/session".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_interval() -> Duration {
    Duration::from_millis(600)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_workers() -> usize {
    4
}

fn default_checkpoint_every() -> usize {
    25
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds), for sub-second pacing intervals
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
