//! Request pacing with a fixed minimum interval
//!
//! The RateLimiter enforces a global minimum spacing between outbound API calls
//! across all concurrent session pipelines. Every decision fetcher holds a clone
//! of the same limiter and calls [`RateLimiter::acquire`] immediately before
//! each request.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Global request pacer shared across all workers
///
/// # Algorithm
///
/// - The limiter remembers when it last granted a call
/// - A caller takes the lock, sleeps until `last_grant + interval`, records
///   the new grant time and releases the lock
/// - Waiting happens while the lock is held, so grants are strictly serialised
///   and two grants are never closer together than `interval`
///
/// Waiters are woken in the order the async mutex hands out the lock. That is
/// best-effort fairness only; there is no separate queue.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Minimum spacing between two grants (zero disables pacing)
    interval: Duration,
    /// Time of the previous grant, None until the first call
    last_grant: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Create a new RateLimiter with the given minimum interval
    ///
    /// # Examples
    ///
    /// ```
    /// use session_harvest::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // 100 requests per minute
    /// let limiter = RateLimiter::new(Duration::from_millis(600));
    /// assert_eq!(limiter.interval(), Duration::from_millis(600));
    /// ```
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Arc::new(Mutex::new(None)),
        }
    }

    /// The configured minimum interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for permission to issue one outbound call
    ///
    /// Returns the instant at which the call was granted. The first call is
    /// granted immediately; every later call is granted no earlier than
    /// `interval` after the previous grant.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use session_harvest::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let limiter = RateLimiter::new(Duration::from_millis(600));
    ///
    /// // Before each API request
    /// limiter.acquire().await;
    /// // ... send request ...
    /// # }
    /// ```
    pub async fn acquire(&self) -> Instant {
        let mut last_grant = self.last_grant.lock().await;

        if let Some(previous) = *last_grant {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "waiting for rate limiter"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let granted = Instant::now();
        *last_grant = Some(granted);
        granted
    }
}
