//! Bounded retries with exponential backoff and per-attempt timeouts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::SendError;
use crate::news::FeedError;
use crate::translate::TranslateError;

/// Errors that know whether another attempt can help.
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Delay requested by the remote side, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for FeedError {
    fn is_transient(&self) -> bool {
        FeedError::is_transient(self)
    }
}

impl Retryable for TranslateError {
    fn is_transient(&self) -> bool {
        TranslateError::is_transient(self)
    }
}

impl Retryable for SendError {
    fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(delay) => Some(*delay),
            _ => None,
        }
    }
}

/// Final failure of a retried operation.
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl<E: Retryable> AttemptError<E> {
    /// Whether the failure may go away on a later run.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Failed(e) => e.is_transient(),
            Self::TimedOut(_) => true,
        }
    }
}

/// Retry settings shared by every network stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,

    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempt_timeout,
        }
    }

    /// Backoff before attempt `attempt + 1`, counting from 1.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << shift)
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// # Errors
    ///
    /// Returns the last failure, or [`AttemptError::TimedOut`] if the last
    /// attempt exceeded `attempt_timeout`.
    pub async fn run<T, E, F, Fut>(&self, stage: &str, mut op: F) -> Result<T, AttemptError<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => AttemptError::Failed(e),
                Err(_) => AttemptError::TimedOut(self.attempt_timeout),
            };

            if !error.is_transient() || attempt >= max_attempts {
                return Err(error);
            }

            let delay = match &error {
                AttemptError::Failed(e) => e.retry_after().unwrap_or_else(|| self.backoff(attempt)),
                AttemptError::TimedOut(_) => self.backoff(attempt),
            };
            warn!(stage, attempt, ?delay, error = %error, "Attempt failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
            debug!(stage, attempt, "Retrying");
        }
    }
}
