//! One news cycle, from fetch to checkpoint.
//!
//! Each run goes through the phases
//! `Fetching → (Deduplicating → Translating → Sending → Persisting)* → Idle`,
//! repeating the bracketed part for every fetched item:
//! 1. Fetch every source, retrying transient failures; a failing source is
//!    skipped for this run.
//! 2. Validate and fingerprint the item; known fingerprints are dropped.
//! 3. For every recipient that has not received it yet, translate into the
//!    recipient's language (once per language) and send with retries.
//! 4. If any recipient failed transiently, release the fingerprint so the
//!    next run retries; recipients that succeeded are protected by the sent
//!    store. Permanent failures are logged and the item stays recorded.
//! 5. Checkpoint: sent store, then hash store, then the last-news entry.
//!
//! After the last item, records not seen within the retention window are
//! pruned and any state that is not yet on disk is written out. A failed
//! checkpoint leaves the pipeline dirty; every later run flushes it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{AttemptError, PipelineError, RetryPolicy, RunPhase, RunReport, Sender};
use crate::analysis::Analyst;
use crate::news::{Deduplicator, FeedEntry, Fingerprint, NewsItem, NewsSource};
use crate::render::{self, RenderedMessage};
use crate::store::{ChatId, Language, LanguageStore, LastNewsStore, SentStore};
use crate::translate::{TranslateError, Translator, translate_item};

/// Stores the pipeline reads and writes.
#[derive(Debug)]
pub struct PipelineStores {
    pub dedup: Deduplicator,
    pub sent: SentStore,

    /// Shared with the command handler.
    pub languages: Arc<RwLock<LanguageStore>>,

    /// Shared with the command handler.
    pub last_news: Arc<RwLock<LastNewsStore>>,
}

/// Outcome of delivering one item to every recipient.
#[derive(Debug, Default)]
struct Delivery {
    delivered: bool,
    transient_failure: bool,
}

/// The news delivery pipeline.
pub struct NewsPipeline {
    sources: Vec<Box<dyn NewsSource>>,
    stores: PipelineStores,
    translator: Arc<dyn Translator>,
    analyst: Arc<dyn Analyst>,
    sender: Arc<dyn Sender>,

    /// Recipients that always get news, on top of the subscribers.
    chat_ids: Vec<ChatId>,

    /// Language the feeds are written in.
    feed_language: Language,

    retry: RetryPolicy,

    /// Records not seen for this long are pruned at the end of a run.
    retention: Option<chrono::Duration>,

    /// In-memory state differs from what is on disk.
    dirty: bool,

    phase: RunPhase,
}

impl NewsPipeline {
    /// Creates a pipeline with default retry settings and no retention.
    #[must_use]
    pub fn new(
        sources: Vec<Box<dyn NewsSource>>,
        stores: PipelineStores,
        translator: Arc<dyn Translator>,
        analyst: Arc<dyn Analyst>,
        sender: Arc<dyn Sender>,
    ) -> Self {
        Self {
            sources,
            stores,
            translator,
            analyst,
            sender,
            chat_ids: Vec::new(),
            feed_language: Language::En,
            retry: RetryPolicy::default(),
            retention: None,
            dirty: false,
            phase: RunPhase::Idle,
        }
    }

    #[must_use]
    pub fn with_chat_ids(mut self, chat_ids: Vec<ChatId>) -> Self {
        self.chat_ids = chat_ids;
        self
    }

    #[must_use]
    pub const fn with_feed_language(mut self, language: Language) -> Self {
        self.feed_language = language;
        self
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    #[must_use]
    pub fn stores(&self) -> &PipelineStores {
        &self.stores
    }

    /// Runs one full cycle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] if a checkpoint cannot be
    /// written. Items checkpointed before the failure stay durable. The
    /// rest of the run is abandoned and the unsaved state is written by the
    /// next run that can persist, whether or not it finds new items.
    pub async fn run_once(&mut self, now: DateTime<Utc>) -> Result<RunReport, PipelineError> {
        let result = self.run_cycle(now).await;
        self.enter(RunPhase::Idle);

        match &result {
            Ok(report) => info!("News run finished: {}", report),
            Err(e) => error!(stage = "persist", "News run aborted: {}", e),
        }
        result
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();

        self.enter(RunPhase::Fetching);
        let entries = self.fetch_all().await;
        report.fetched = entries.len();

        let recipients = self.recipients().await;
        if recipients.is_empty() {
            warn!("No recipients configured, new items will only be recorded");
        }

        for entry in entries {
            self.enter(RunPhase::Deduplicating);

            let item = match NewsItem::from_entry(entry, now) {
                Ok(item) => item,
                Err(e) => {
                    report.invalid += 1;
                    warn!(stage = "validate", "Skipping item: {}", e);
                    continue;
                }
            };

            let outcome = match self.stores.dedup.check(&item, now) {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.invalid += 1;
                    warn!(stage = "dedup", "Skipping item: {}", e);
                    continue;
                }
            };
            if !outcome.is_new {
                // last-seen time moved
                self.dirty = true;
                report.duplicates += 1;
                continue;
            }

            report.new_items += 1;
            info!(
                fingerprint = outcome.fingerprint.short(),
                source = item.source(),
                "New item: {}",
                item.title()
            );

            let delivery = self
                .deliver(&item, &outcome.fingerprint, &recipients, now, &mut report)
                .await;

            if delivery.transient_failure {
                self.stores.dedup.release(&outcome.fingerprint);
            }

            self.enter(RunPhase::Persisting);
            self.checkpoint(delivery.delivered.then_some(item)).await?;
        }

        self.enter(RunPhase::Persisting);
        self.prune(now);
        if self.dirty {
            self.persist().await?;
        }

        Ok(report)
    }

    fn enter(&mut self, phase: RunPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Run phase");
            self.phase = phase;
        }
    }

    async fn fetch_all(&self) -> Vec<FeedEntry> {
        let mut entries = Vec::new();

        for source in &self.sources {
            match self.retry.run("fetch", || source.fetch()).await {
                Ok(mut batch) => {
                    debug!(source = source.name(), count = batch.len(), "Fetched entries");
                    entries.append(&mut batch);
                }
                Err(e) => {
                    warn!(source = source.name(), stage = "fetch", "Skipping source: {}", e);
                }
            }
        }

        entries
    }

    /// Configured chat ids plus every subscriber, without duplicates.
    async fn recipients(&self) -> Vec<ChatId> {
        let languages = self.stores.languages.read().await;
        let mut recipients: Vec<ChatId> = self
            .chat_ids
            .iter()
            .copied()
            .chain(languages.subscribers())
            .collect();
        recipients.sort_unstable();
        recipients.dedup();
        recipients
    }

    async fn deliver(
        &mut self,
        item: &NewsItem,
        fingerprint: &Fingerprint,
        recipients: &[ChatId],
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Delivery {
        let mut delivery = Delivery::default();
        // `Err(transient)` marks a language whose translation failed in this run.
        let mut rendered: HashMap<Language, Result<RenderedMessage, bool>> = HashMap::new();

        for &recipient in recipients {
            if !self.stores.sent.should_send(fingerprint, recipient) {
                report.skipped_recipients += 1;
                continue;
            }

            let language = self.stores.languages.read().await.language(recipient);

            let message = match rendered.get(&language) {
                Some(message) => message.clone(),
                None => {
                    self.enter(RunPhase::Translating);
                    let message = match self.render(item, language, now).await {
                        Ok(message) => Ok(message),
                        Err(e) => {
                            warn!(
                                fingerprint = fingerprint.short(),
                                language = %language,
                                stage = "translate",
                                transient = e.is_transient(),
                                "Translation failed, skipping recipients: {}",
                                e
                            );
                            Err(e.is_transient())
                        }
                    };
                    rendered.insert(language, message.clone());
                    message
                }
            };

            let message = match message {
                Ok(message) => message,
                Err(transient) => {
                    report.failed += 1;
                    delivery.transient_failure |= transient;
                    continue;
                }
            };

            self.enter(RunPhase::Sending);
            let sender = &self.sender;
            match self.retry.run("send", || sender.send(recipient, &message)).await {
                Ok(()) => {
                    self.stores.sent.mark_sent(fingerprint.clone(), recipient, now);
                    report.sent += 1;
                    delivery.delivered = true;
                    debug!(fingerprint = fingerprint.short(), chat_id = recipient, "Delivered");
                }
                Err(e) => {
                    report.failed += 1;
                    if e.is_transient() {
                        delivery.transient_failure = true;
                    }
                    warn!(
                        fingerprint = fingerprint.short(),
                        chat_id = recipient,
                        stage = "send",
                        transient = e.is_transient(),
                        "Delivery failed: {}",
                        e
                    );
                }
            }
        }

        delivery
    }

    /// Translates and renders the alert for one language.
    async fn render(
        &self,
        item: &NewsItem,
        language: Language,
        now: DateTime<Utc>,
    ) -> Result<RenderedMessage, AttemptError<TranslateError>> {
        let translator = self.translator.as_ref();
        let from = self.feed_language;

        let translation = self
            .retry
            .run("translate", || translate_item(translator, item, from, language))
            .await?;

        let analysis = self.analyst.summary(item, language).await;
        Ok(render::news_alert(&translation, item.link(), &analysis, now))
    }

    /// Persists the stores after an item.
    async fn checkpoint(&mut self, delivered: Option<NewsItem>) -> Result<(), PipelineError> {
        if let Some(item) = delivered {
            self.stores.last_news.write().await.set(item);
        }
        self.dirty = true;
        self.persist().await
    }

    /// Drops records not seen within the retention window.
    fn prune(&mut self, now: DateTime<Utc>) {
        let Some(retention) = self.retention else {
            return;
        };

        let cutoff = now - retention;
        let sent = self.stores.sent.prune_older_than(cutoff);
        let hashes = self.stores.dedup.store_mut().prune_older_than(cutoff);
        if sent + hashes > 0 {
            debug!(sent, hashes, "Pruned expired records");
            self.dirty = true;
        }
    }

    /// Writes every store; clears the dirty flag only if all writes succeed.
    async fn persist(&mut self) -> Result<(), PipelineError> {
        self.stores.sent.save()?;
        self.stores.dedup.save()?;
        self.stores.last_news.read().await.save()?;
        self.dirty = false;
        Ok(())
    }
}

impl fmt::Debug for NewsPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsPipeline")
            .field("sources", &self.sources.len())
            .field("chat_ids", &self.chat_ids)
            .field("feed_language", &self.feed_language)
            .field("retry", &self.retry)
            .field("dirty", &self.dirty)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
