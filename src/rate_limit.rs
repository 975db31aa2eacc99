//! Shared minimum-interval throttle for the rate-limited site.
//!
//! One [`RateLimiter`] is shared process-wide across all concurrent
//! executors targeting the throttled host. The state is a single timestamp:
//! the last time anyone contacted the site.
//!
//! # Lock discipline
//!
//! The check-then-sleep-then-set sequence runs as one critical section: the
//! mutex is held across the sleep, so no two callers can simultaneously
//! believe the interval has elapsed. Fairness is weak: no caller proceeds
//! before the interval elapses, but arrival order is not preserved.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument};

/// Enforces a minimum wall-clock interval between contacts with one site.
///
/// Designed to be wrapped in `Arc` and shared across all executors.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_contact: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_contact: Mutex::new(None),
        }
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Blocks until the interval since the last contact has elapsed, then
    /// records the new contact time.
    ///
    /// Returns the recorded contact time.
    #[instrument(skip(self), fields(interval_ms = self.min_interval.as_millis()))]
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_contact.lock().await;
        loop {
            let now = Instant::now();
            match *last {
                Some(prev) if now < prev + self.min_interval => {
                    let ready_at = prev + self.min_interval;
                    debug!(
                        wait_ms = (ready_at - now).as_millis(),
                        "waiting for rate limit interval"
                    );
                    // The lock stays held across the sleep on purpose; see
                    // the module docs for the discipline.
                    sleep_until(ready_at).await;
                }
                _ => {
                    *last = Some(now);
                    return now;
                }
            }
        }
    }
}
