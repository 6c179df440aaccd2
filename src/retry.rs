//! Retry-on-throttle logic
//!
//! When the remote API signals that the caller exceeded its rate limit, the
//! request is re-issued from the top after a fixed cooldown. Any other failure
//! is returned to the caller immediately.
//!
//! The loop is unbounded unless [`ThrottleConfig::max_attempts`] is set.
//!
//! # Example
//!
//! ```no_run
//! use session_harvest::error::IsThrottled;
//! use session_harvest::retry::retry_on_throttle;
//! use session_harvest::config::ThrottleConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     SlowDown,
//!     Broken,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsThrottled for MyError {
//!     fn is_throttled(&self) -> bool {
//!         matches!(self, MyError::SlowDown)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = ThrottleConfig::default();
//! let result = retry_on_throttle(&config, || async {
//!     // Your request here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ThrottleConfig;
use crate::error::IsThrottled;
use std::future::Future;

/// Execute an async operation, sleeping `config.cooldown` and retrying on throttling
///
/// # Arguments
///
/// * `config` - Cooldown and optional attempt cap
/// * `operation` - Async closure re-invoked for every attempt; it must redo all
///   per-attempt work (including rate limiter acquisition)
///
/// # Returns
///
/// The first successful result, the first non-throttled error, or the last
/// throttled error once `max_attempts` (if any) is reached.
pub async fn retry_on_throttle<F, Fut, T, E>(config: &ThrottleConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsThrottled + std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Request succeeded after throttling");
                }
                return Ok(result);
            }
            Err(e) if e.is_throttled() => {
                if let Some(max_attempts) = config.max_attempts {
                    if attempt >= max_attempts {
                        tracing::error!(
                            error = %e,
                            attempts = attempt,
                            "Still throttled after all allowed attempts"
                        );
                        return Err(e);
                    }
                }

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    cooldown_secs = config.cooldown.as_secs_f64(),
                    "Rate limit hit, cooling down before retry"
                );

                tokio::time::sleep(config.cooldown).await;
            }
            Err(e) => return Err(e),
        }
    }
}
