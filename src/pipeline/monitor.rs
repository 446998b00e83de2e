//! Interval loop driving the pipeline in daemon mode.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::NewsPipeline;

/// Messages that can be sent to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMessage {
    /// Start a run now instead of waiting for the next tick.
    RunNow,
    /// Stop after the current run.
    Shutdown,
}

/// Sending side of the monitor's channel.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorMessage>,
}

impl MonitorHandle {
    pub async fn run_now(&self) {
        if self.tx.send(MonitorMessage::RunNow).await.is_err() {
            debug!("Monitor already stopped");
        }
    }

    pub async fn shutdown(&self) {
        if self.tx.send(MonitorMessage::Shutdown).await.is_err() {
            debug!("Monitor already stopped");
        }
    }
}

/// Runs the pipeline every `check_interval`.
#[derive(Debug)]
pub struct NewsMonitor {
    pipeline: NewsPipeline,
    check_interval: Duration,
}

impl NewsMonitor {
    #[must_use]
    pub fn new(pipeline: NewsPipeline) -> Self {
        Self {
            pipeline,
            check_interval: Duration::from_secs(120),
        }
    }

    /// Sets the interval between runs.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Creates the control channel for [`NewsMonitor::run`].
    #[must_use]
    pub fn channel() -> (MonitorHandle, mpsc::Receiver<MonitorMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (MonitorHandle { tx }, rx)
    }

    /// Runs the monitor loop until shutdown. The first run starts
    /// immediately.
    ///
    /// Returns the pipeline so callers can inspect its stores.
    pub async fn run(mut self, mut rx: mpsc::Receiver<MonitorMessage>) -> NewsPipeline {
        info!("News monitor started, checking every {:?}", self.check_interval);

        let mut check_timer = interval(self.check_interval);
        check_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = check_timer.tick() => {
                    self.tick().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(MonitorMessage::RunNow) => {
                            debug!("Received run now message");
                            self.tick().await;
                            check_timer.reset();
                        }
                        Some(MonitorMessage::Shutdown) | None => {
                            info!("News monitor shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.pipeline
    }

    async fn tick(&mut self) {
        // A failed run leaves the pipeline dirty; the next tick flushes it.
        if let Err(e) = self.pipeline.run_once(Utc::now()).await {
            error!("News run failed: {}", e);
        }
    }
}
