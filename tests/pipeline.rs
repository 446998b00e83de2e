//! End-to-end runs of the news pipeline against in-memory collaborators.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::RwLock;

use ton_news_bot::analysis::HeuristicAnalyst;
use ton_news_bot::news::{Deduplicator, FeedEntry, FeedError, NewsSource};
use ton_news_bot::pipeline::{
    NewsMonitor, NewsPipeline, PipelineError, PipelineStores, RetryPolicy, RunPhase, SendError, Sender,
};
use ton_news_bot::render::RenderedMessage;
use ton_news_bot::store::{
    CONTENT_HASHES_FILE, ChatId, ContentHashStore, LAST_NEWS_FILE, Language, LanguageStore, LastNewsStore,
    SENT_NEWS_FILE, SentStore, StoreError, USER_LANGUAGES_FILE,
};
use ton_news_bot::translate::{TranslateError, Translator};

struct StaticSource {
    entries: Vec<FeedEntry>,
}

#[async_trait]
impl NewsSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError> {
        Ok(self.entries.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct DownSource;

#[async_trait]
impl NewsSource for DownSource {
    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError> {
        Err(FeedError::Status {
            url: "https://down.example/rss".to_owned(),
            status: 503,
        })
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Prefixes the target language code.
struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(&self, text: &str, _from: Language, to: Language) -> Result<String, TranslateError> {
        Ok(format!("[{to}] {text}"))
    }
}

/// Fails every translation, permanently or not.
struct BrokenTranslator {
    transient: bool,
}

#[async_trait]
impl Translator for BrokenTranslator {
    async fn translate(&self, _text: &str, _from: Language, _to: Language) -> Result<String, TranslateError> {
        if self.transient {
            Err(TranslateError::Status(503))
        } else {
            Err(TranslateError::Malformed("missing translatedText".to_owned()))
        }
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(ChatId, String)>>,
    failing: Mutex<HashSet<ChatId>>,
    rejecting: HashSet<ChatId>,
}

impl RecordingSender {
    fn rejecting(chat_ids: &[ChatId]) -> Self {
        Self {
            rejecting: chat_ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn fail_for(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn messages_for(&self, chat_id: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, recipient: ChatId, message: &RenderedMessage) -> Result<(), SendError> {
        if self.rejecting.contains(&recipient) {
            return Err(SendError::Rejected("Forbidden: bot was blocked by the user".to_owned()));
        }
        if self.failing.lock().unwrap().contains(&recipient) {
            return Err(SendError::Transient("connection reset".to_owned()));
        }
        self.sent.lock().unwrap().push((recipient, message.text.clone()));
        Ok(())
    }
}

fn entry(title: &str, summary: &str) -> FeedEntry {
    FeedEntry {
        source: "static".to_owned(),
        title: title.to_owned(),
        summary: summary.to_owned(),
        link: Some(format!("https://news.example/{}", title.len())),
        published_at: None,
    }
}

fn load_stores(dir: &Path) -> PipelineStores {
    PipelineStores {
        dedup: Deduplicator::new(ContentHashStore::load(dir.join(CONTENT_HASHES_FILE)).unwrap()),
        sent: SentStore::load(dir.join(SENT_NEWS_FILE)).unwrap(),
        languages: Arc::new(RwLock::new(
            LanguageStore::load(dir.join(USER_LANGUAGES_FILE), Language::Ru).unwrap(),
        )),
        last_news: Arc::new(RwLock::new(LastNewsStore::load(dir.join(LAST_NEWS_FILE)).unwrap())),
    }
}

fn pipeline(
    dir: &Path,
    sources: Vec<Box<dyn NewsSource>>,
    sender: &Arc<RecordingSender>,
    chat_ids: &[ChatId],
) -> NewsPipeline {
    pipeline_with_translator(dir, sources, Arc::new(TaggingTranslator), sender, chat_ids)
}

fn pipeline_with_translator(
    dir: &Path,
    sources: Vec<Box<dyn NewsSource>>,
    translator: Arc<dyn Translator>,
    sender: &Arc<RecordingSender>,
    chat_ids: &[ChatId],
) -> NewsPipeline {
    NewsPipeline::new(
        sources,
        load_stores(dir),
        translator,
        Arc::new(HeuristicAnalyst),
        Arc::clone(sender) as Arc<dyn Sender>,
    )
    .with_chat_ids(chat_ids.to_vec())
    .with_feed_language(Language::En)
    .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(5)))
}

fn static_source(entries: Vec<FeedEntry>) -> Vec<Box<dyn NewsSource>> {
    vec![Box::new(StaticSource { entries })]
}

#[tokio::test]
async fn test_second_run_after_restart_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let entries = vec![
        entry("TON rises after listing", "Toncoin gains"),
        entry("Telegram wallet update", "New TON features"),
    ];

    let mut first = pipeline(dir.path(), static_source(entries.clone()), &sender, &[1, 2]);
    let report = first.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.new_items, 2);
    assert_eq!(report.sent, 4);
    assert_eq!(first.phase(), RunPhase::Idle);
    drop(first);

    // Fresh process over the same state directory.
    let mut second = pipeline(dir.path(), static_source(entries), &sender, &[1, 2]);
    let report = second.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.new_items, 0);
    assert_eq!(report.sent, 0);
    assert_eq!(sender.total(), 4);
}

#[tokio::test]
async fn test_transient_failure_is_retried_for_that_recipient_only() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let entries = vec![entry("TON news", "body")];

    sender.fail_for(2);
    let mut run = pipeline(dir.path(), static_source(entries.clone()), &sender, &[1, 2]);
    let report = run.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);

    let fingerprint = {
        let sent = SentStore::load(dir.path().join(SENT_NEWS_FILE)).unwrap();
        let fp = sent.fingerprints().next().unwrap().clone();
        assert_eq!(sent.recipients_for(&fp), vec![1]);
        fp
    };
    // Released so the next run picks it up again.
    let hashes = ContentHashStore::load(dir.path().join(CONTENT_HASHES_FILE)).unwrap();
    assert!(!hashes.contains(&fingerprint));

    sender.recover();
    let report = run.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.new_items, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.skipped_recipients, 1);

    assert_eq!(sender.messages_for(1).len(), 1);
    assert_eq!(sender.messages_for(2).len(), 1);

    let sent = SentStore::load(dir.path().join(SENT_NEWS_FILE)).unwrap();
    assert_eq!(sent.recipients_for(&fingerprint), vec![1, 2]);
}

#[tokio::test]
async fn test_rejected_recipient_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::rejecting(&[2]));
    let entries = vec![entry("TON news", "body")];

    let mut run = pipeline(dir.path(), static_source(entries), &sender, &[1, 2]);
    let first = run.run_once(Utc::now()).await.unwrap();
    assert_eq!((first.sent, first.failed), (1, 1));

    let second = run.run_once(Utc::now()).await.unwrap();
    assert_eq!(second.duplicates, 1);
    assert_eq!(second.failed, 0);
}

#[tokio::test]
async fn test_whitespace_and_case_variants_are_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let entries = vec![
        entry("Storm warning", "TON network congestion expected"),
        entry("  storm   WARNING ", "TON network   congestion expected\n"),
    ];

    let mut run = pipeline(dir.path(), static_source(entries), &sender, &[1]);
    let report = run.run_once(Utc::now()).await.unwrap();

    assert_eq!(report.new_items, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(sender.messages_for(1).len(), 1);
}

#[tokio::test]
async fn test_each_recipient_gets_their_language() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());

    let mut run = pipeline(
        dir.path(),
        static_source(vec![entry("TON hits new high", "Toncoin rallies")]),
        &sender,
        &[1, 2],
    );
    {
        let mut languages = run.stores().languages.write().await;
        languages.set_language(2, "en").unwrap();
        // Subscriber that is not in the configured chat list.
        languages.set_language(3, "RU").unwrap();
    }

    let report = run.run_once(Utc::now()).await.unwrap();
    assert_eq!(report.sent, 3);

    // Default language is Russian, feeds are English.
    assert!(sender.messages_for(1)[0].contains("[ru] TON hits new high"));
    assert!(sender.messages_for(3)[0].contains("[ru] TON hits new high"));
    let english = &sender.messages_for(2)[0];
    assert!(english.contains("<b>TON hits new high</b>"));
    assert!(!english.contains("[en]"));
}

#[tokio::test]
async fn test_invalid_language_keeps_previous_value() {
    let dir = tempfile::tempdir().unwrap();
    let stores = load_stores(dir.path());
    let mut languages = stores.languages.write().await;

    languages.set_language(7, "en").unwrap();
    let err = languages.set_language(7, "xx").unwrap_err();

    assert!(matches!(err, StoreError::InvalidLanguage(code) if code == "xx"));
    assert_eq!(languages.language(7), Language::En);
    assert_eq!(languages.language(8), Language::Ru);
}

#[tokio::test]
async fn test_invalid_entries_and_failing_sources_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let sources: Vec<Box<dyn NewsSource>> = vec![
        Box::new(DownSource),
        Box::new(StaticSource {
            entries: vec![entry("   ", "  "), entry("TON news", "body")],
        }),
    ];

    let mut run = pipeline(dir.path(), sources, &sender, &[1]);
    let report = run.run_once(Utc::now()).await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn test_last_news_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());

    let mut run = pipeline(
        dir.path(),
        static_source(vec![entry("First TON story", "a"), entry("Second TON story", "b")]),
        &sender,
        &[1],
    );
    run.run_once(Utc::now()).await.unwrap();

    let last = LastNewsStore::load(dir.path().join(LAST_NEWS_FILE)).unwrap();
    assert_eq!(last.get().unwrap().title(), "Second TON story");
}

#[tokio::test]
async fn test_persist_failure_aborts_and_keeps_prior_state() {
    let dir = tempfile::tempdir().unwrap();
    let hashes_path = dir.path().join(CONTENT_HASHES_FILE);
    std::fs::write(&hashes_path, "{}").unwrap();

    let sender = Arc::new(RecordingSender::default());
    let mut run = pipeline(dir.path(), static_source(vec![entry("TON news", "body")]), &sender, &[1]);

    // A directory where the delivery log should go makes the rename fail.
    std::fs::create_dir(dir.path().join(SENT_NEWS_FILE)).unwrap();

    let err = run.run_once(Utc::now()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(StoreError::Persist { .. })));
    assert_eq!(run.phase(), RunPhase::Idle);

    assert_eq!(std::fs::read_to_string(&hashes_path).unwrap(), "{}");
    assert!(ContentHashStore::load(&hashes_path).unwrap().is_empty());
}

#[tokio::test]
async fn test_retention_prunes_old_records() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let long_ago = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let mut run = pipeline(dir.path(), static_source(vec![entry("Old TON story", "x")]), &sender, &[1]);
    run.run_once(long_ago).await.unwrap();

    let mut run = pipeline(dir.path(), static_source(vec![entry("New TON story", "y")]), &sender, &[1])
        .with_retention(chrono::Duration::days(30));
    run.run_once(Utc::now()).await.unwrap();

    let sent = SentStore::load(dir.path().join(SENT_NEWS_FILE)).unwrap();
    let hashes = ContentHashStore::load(dir.path().join(CONTENT_HASHES_FILE)).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(hashes.len(), 1);
}

#[tokio::test]
async fn test_item_still_in_feed_survives_retention() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let retention = chrono::Duration::days(30);
    let evergreen = entry("TON explainer", "What is Toncoin");

    let mut run = pipeline(dir.path(), static_source(vec![evergreen.clone()]), &sender, &[1])
        .with_retention(retention);
    run.run_once(t0).await.unwrap();

    // A month later the story is still listed, after a fresh one.
    let month_later = t0 + chrono::Duration::days(31);
    let feed = vec![entry("TON fresh story", "New listing"), evergreen.clone()];
    let mut run = pipeline(dir.path(), static_source(feed), &sender, &[1]).with_retention(retention);
    let report = run.run_once(month_later).await.unwrap();
    assert_eq!((report.new_items, report.duplicates), (1, 1));

    let mut run = pipeline(dir.path(), static_source(vec![evergreen]), &sender, &[1]).with_retention(retention);
    let report = run
        .run_once(month_later + chrono::Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!((report.new_items, report.duplicates), (0, 1));

    let copies = sender
        .messages_for(1)
        .iter()
        .filter(|text| text.contains("TON explainer"))
        .count();
    assert_eq!(copies, 1);
}

#[tokio::test]
async fn test_permanent_translation_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let translator: Arc<dyn Translator> = Arc::new(BrokenTranslator { transient: false });
    let entries = vec![entry("TON news", "body")];

    // Recipient 1 defaults to Russian, so the English feed needs translating.
    let mut run = pipeline_with_translator(
        dir.path(),
        static_source(entries.clone()),
        Arc::clone(&translator),
        &sender,
        &[1],
    );
    let first = run.run_once(Utc::now()).await.unwrap();
    assert_eq!((first.new_items, first.sent, first.failed), (1, 0, 1));

    let second = run.run_once(Utc::now()).await.unwrap();
    assert_eq!((second.new_items, second.duplicates, second.failed), (0, 1, 0));

    // Recorded on disk too.
    let mut restarted = pipeline_with_translator(dir.path(), static_source(entries), translator, &sender, &[1]);
    let third = restarted.run_once(Utc::now()).await.unwrap();
    assert_eq!((third.new_items, third.duplicates), (0, 1));
    assert_eq!(sender.total(), 0);
}

#[tokio::test]
async fn test_transient_translation_failure_releases_item() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let entries = vec![entry("TON news", "body")];

    let mut run = pipeline_with_translator(
        dir.path(),
        static_source(entries.clone()),
        Arc::new(BrokenTranslator { transient: true }),
        &sender,
        &[1],
    );
    let report = run.run_once(Utc::now()).await.unwrap();
    assert_eq!((report.new_items, report.failed), (1, 1));

    // The translator recovers; the item is delivered on the next run.
    let mut run = pipeline(dir.path(), static_source(entries), &sender, &[1]);
    let report = run.run_once(Utc::now()).await.unwrap();
    assert_eq!((report.new_items, report.sent), (1, 1));
}

#[tokio::test]
async fn test_failed_checkpoint_is_flushed_by_quiet_run() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let entries = vec![entry("TON news", "body")];
    let blocked = dir.path().join(SENT_NEWS_FILE);

    let mut run = pipeline(dir.path(), static_source(entries.clone()), &sender, &[1]);
    std::fs::create_dir(&blocked).unwrap();
    let err = run.run_once(Utc::now()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));
    assert_eq!(sender.total(), 1);

    // The disk recovers; the next run finds nothing new but still writes.
    std::fs::remove_dir(&blocked).unwrap();
    let report = run.run_once(Utc::now()).await.unwrap();
    assert_eq!((report.new_items, report.duplicates), (0, 1));
    assert!(blocked.is_file());
    drop(run);

    let mut restarted = pipeline(dir.path(), static_source(entries), &sender, &[1]);
    let report = restarted.run_once(Utc::now()).await.unwrap();
    assert_eq!((report.new_items, report.duplicates), (0, 1));
    assert_eq!(sender.messages_for(1).len(), 1);
}

#[tokio::test]
async fn test_monitor_runs_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(RecordingSender::default());
    let run = pipeline(dir.path(), static_source(vec![entry("TON news", "body")]), &sender, &[1]);

    let (handle, rx) = NewsMonitor::channel();
    let monitor = NewsMonitor::new(run).with_check_interval(Duration::from_secs(3600));
    let task = tokio::spawn(monitor.run(rx));

    handle.run_now().await;
    handle.shutdown().await;
    let pipeline = task.await.unwrap();

    assert_eq!(sender.total(), 1);
    assert_eq!(pipeline.stores().sent.len(), 1);
}
