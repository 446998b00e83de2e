//! TON News Bot - Main Entry Point
//!
//! Watches crypto RSS feeds for TON news and delivers every new story once
//! to each recipient, translated into the recipient's language.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ton_news_bot::analysis::{Analyst, HeuristicAnalyst, OpenAiAnalyst};
use ton_news_bot::commands::{BotCommand, CommandHandler, UpdatePoller};
use ton_news_bot::config::{BotSettings, FeedConfig, TelegramConfig};
use ton_news_bot::news::{Deduplicator, NewsSource, RssFeedSource};
use ton_news_bot::pipeline::{NewsMonitor, NewsPipeline, PipelineStores, RetryPolicy, Sender};
use ton_news_bot::price::PriceService;
use ton_news_bot::store::{
    CONTENT_HASHES_FILE, ContentHashStore, LAST_NEWS_FILE, LanguageStore, LastNewsStore, SENT_NEWS_FILE,
    SentStore, USER_LANGUAGES_FILE,
};
use ton_news_bot::telegram::TelegramBot;
use ton_news_bot::translate::{MyMemoryTranslator, Translator};

/// Telegram bot delivering deduplicated TON news.
#[derive(Parser, Debug)]
#[command(name = "ton_news_bot")]
#[command(about = "Deliver TON news from RSS feeds to Telegram, once per recipient")]
#[command(version)]
struct Args {
    /// Path to the feeds JSON configuration file.
    #[arg(short, long, default_value = "feeds.json")]
    feeds: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single news cycle and exit.
    #[arg(long)]
    once: bool,

    /// Generate an example feeds file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    if args.generate_config {
        return generate_example_config();
    }

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config =
        TelegramConfig::from_env().context("Failed to load Telegram configuration from environment")?;
    let settings = BotSettings::from_env_with_defaults();
    debug!("{:?}", settings);

    let feed_config = FeedConfig::load_or_default(&args.feeds).context("Failed to load feeds configuration")?;
    feed_config
        .validate()
        .context("Feeds configuration validation failed")?;
    info!(
        "Monitoring {} feeds for {} keywords",
        feed_config.len(),
        feed_config.keywords.len()
    );

    let client = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .user_agent(concat!("ton_news_bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    // Load state
    let stores = load_stores(&settings)?;
    let languages = Arc::clone(&stores.languages);
    let last_news = Arc::clone(&stores.last_news);

    // Connect to Telegram
    let bot = Arc::new(
        TelegramBot::connect(&tg_config, client.clone(), settings.send_interval())
            .await
            .context("Failed to connect to Telegram")?,
    );

    let translator: Arc<dyn Translator> = Arc::new(MyMemoryTranslator::new(client.clone()));
    let analyst: Arc<dyn Analyst> = match &settings.openai_api_key {
        Some(key) => {
            info!("Using OpenAI analysis ({})", settings.openai_model);
            Arc::new(OpenAiAnalyst::new(client.clone(), key, &settings.openai_model))
        }
        None => Arc::new(HeuristicAnalyst),
    };

    let rules = feed_config.rules();
    let sources: Vec<Box<dyn NewsSource>> = feed_config
        .feeds
        .iter()
        .map(|feed| {
            Box::new(RssFeedSource::new(&feed.name, &feed.url, client.clone(), rules.clone()))
                as Box<dyn NewsSource>
        })
        .collect();

    // Per-attempt timeout on top of the client timeout
    let retry = RetryPolicy::new(
        settings.retry_attempts,
        settings.retry_base(),
        settings.http_timeout() * 2,
    );

    let mut pipeline = NewsPipeline::new(
        sources,
        stores,
        Arc::clone(&translator),
        Arc::clone(&analyst),
        Arc::clone(&bot) as Arc<dyn Sender>,
    )
    .with_chat_ids(tg_config.chat_ids.clone())
    .with_feed_language(settings.feed_language)
    .with_retry_policy(retry)
    .with_retention(settings.retention());

    if args.once {
        info!("Running a single news cycle...");
        let report = pipeline.run_once(chrono::Utc::now()).await.context("News run failed")?;
        info!("Done: {}", report);
        return Ok(());
    }

    if let Err(e) = bot.set_my_commands(&BotCommand::all_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let handler = Arc::new(
        CommandHandler::new(
            languages,
            last_news,
            translator,
            analyst,
            Arc::new(PriceService::new(client)),
            settings.feed_language,
        )
        .with_bot_username(bot.username().map(str::to_owned)),
    );

    // Spawn monitor and poller tasks
    let (monitor_handle, monitor_rx) = NewsMonitor::channel();
    let monitor = NewsMonitor::new(pipeline).with_check_interval(settings.check_interval());
    let monitor_task = tokio::spawn(monitor.run(monitor_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = UpdatePoller::new(Arc::clone(&bot), handler);
    let poller_task = tokio::spawn(async move {
        poller.run(shutdown_rx).await;
    });

    info!(
        "Bot is running, checking news every {:?}. Use Ctrl+C to stop.",
        settings.check_interval()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    // Cleanup
    monitor_handle.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = monitor_task.await {
        warn!("News monitor task failed: {}", e);
    }
    if let Err(e) = poller_task.await {
        warn!("Command poller task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads every state file, creating the state directory if needed.
fn load_stores(settings: &BotSettings) -> Result<PipelineStores> {
    std::fs::create_dir_all(settings.state_dir())
        .with_context(|| format!("Failed to create state directory {}", settings.state_dir().display()))?;

    let hashes = ContentHashStore::load(settings.state_path(CONTENT_HASHES_FILE))
        .context("Failed to load content hashes")?;
    let sent = SentStore::load(settings.state_path(SENT_NEWS_FILE)).context("Failed to load sent news")?;
    let languages = LanguageStore::load(settings.state_path(USER_LANGUAGES_FILE), settings.default_language)
        .context("Failed to load user languages")?;
    let last_news = LastNewsStore::load(settings.state_path(LAST_NEWS_FILE)).context("Failed to load last news")?;

    info!(
        "Loaded state: {} fingerprints, {} delivered items, {} subscribers",
        hashes.len(),
        sent.len(),
        languages.len()
    );
    if languages.rejected_entries() > 0 {
        warn!(
            "Ignored {} language preferences with unsupported codes",
            languages.rejected_entries()
        );
    }

    Ok(PipelineStores {
        dedup: Deduplicator::new(hashes),
        sent,
        languages: Arc::new(RwLock::new(languages)),
        last_news: Arc::new(RwLock::new(last_news)),
    })
}

/// Generates an example feeds file.
fn generate_example_config() -> Result<()> {
    let path = Path::new("feeds.example.json");
    FeedConfig::example().save_to_file(path)?;
    println!("✓ Example configuration written to: {}", path.display());
    println!("\nTo use this bot:");
    println!("1. Copy feeds.example.json to feeds.json and edit the feed list");
    println!("2. Create a .env file with TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID");
    println!("3. Run: ton_news_bot (or ton_news_bot --once from cron)");
    Ok(())
}
