//! Rate limiter for Telegram API calls.
//!
//! Keeps outgoing messages at least `min_interval` apart and honours the
//! `retry_after` hints Telegram returns with HTTP 429.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Earliest instant the next operation may run.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Waits until an operation is allowed, then reserves the next slot.
    ///
    /// Returns the duration waited (0 if no wait was needed). Concurrent
    /// callers queue on the lock, so sends never overlap a slot.
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_allowed.lock().await;

        let now = Instant::now();
        let wait_duration = next.map_or(Duration::ZERO, |at| at.saturating_duration_since(now));

        if !wait_duration.is_zero() {
            debug!("Rate limiter: waiting {:?} before next operation", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait_duration
    }

    /// Pushes the next slot back after a flood wait from Telegram.
    ///
    /// Does not sleep itself; the next [`RateLimiter::wait_and_acquire`]
    /// absorbs the delay.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Received flood wait from Telegram: {} seconds", wait_seconds);
        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        let mut next = self.next_allowed.lock().await;
        if next.is_none_or(|at| at < until) {
            *next = Some(until);
        }
    }
}
