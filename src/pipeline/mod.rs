//! News delivery pipeline.
//!
//! One run fetches every source, drops items that were already seen,
//! delivers the rest to every recipient in their preferred language and
//! persists the stores after each item. [`NewsMonitor`] repeats runs on an
//! interval.

mod monitor;
mod retry;
mod runner;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::render::RenderedMessage;
use crate::store::{ChatId, StoreError};

pub use monitor::{MonitorHandle, MonitorMessage, NewsMonitor};
pub use retry::{AttemptError, RetryPolicy, Retryable};
pub use runner::{NewsPipeline, PipelineStores};

/// Delivers a rendered message to one recipient.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, recipient: ChatId, message: &RenderedMessage) -> Result<(), SendError>;
}

/// Outcome of a failed send, as far as the pipeline cares.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport asked us to slow down.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    /// The recipient can never receive this message (blocked bot, bad chat).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network trouble or a server-side error.
    #[error("transient failure: {0}")]
    Transient(String),
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to persist state: {0}")]
    Persistence(#[from] StoreError),
}

/// Stage of a run, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Fetching,
    Deduplicating,
    Translating,
    Sending,
    Persisting,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Deduplicating => "deduplicating",
            Self::Translating => "translating",
            Self::Sending => "sending",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Counters collected during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Entries returned by all sources.
    pub fetched: usize,

    /// Entries rejected as invalid items.
    pub invalid: usize,

    /// Items whose fingerprint was already known.
    pub duplicates: usize,

    /// Items seen for the first time.
    pub new_items: usize,

    /// Messages delivered.
    pub sent: usize,

    /// Deliveries that failed after retries.
    pub failed: usize,

    /// Recipients skipped because they already had the item.
    pub skipped_recipients: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} invalid={} duplicates={} new={} sent={} failed={} skipped={}",
            self.fetched,
            self.invalid,
            self.duplicates,
            self.new_items,
            self.sent,
            self.failed,
            self.skipped_recipients
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_phase_display() {
        assert_eq!(RunPhase::default().to_string(), "idle");
        assert_eq!(RunPhase::Deduplicating.to_string(), "deduplicating");
    }

    #[test]
    fn test_report_display() {
        let report = RunReport {
            fetched: 4,
            new_items: 2,
            sent: 3,
            ..RunReport::default()
        };
        assert_eq!(
            report.to_string(),
            "fetched=4 invalid=0 duplicates=0 new=2 sent=3 failed=0 skipped=0"
        );
    }
}
