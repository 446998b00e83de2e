//! Standalone validator for the bot's feed configuration and state files.
//!
//! Loads everything the bot would load at startup and reports counts and
//! problems without contacting Telegram.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use ton_news_bot::config::FeedConfig;
use ton_news_bot::store::{
    CONTENT_HASHES_FILE, ContentHashStore, LAST_NEWS_FILE, Language, LanguageStore, LastNewsStore,
    SENT_NEWS_FILE, SentStore, USER_LANGUAGES_FILE,
};

/// Feed configuration and state validator.
#[derive(Parser, Debug)]
#[command(name = "validate_state")]
#[command(about = "Validates the feeds file and state files of the TON news bot")]
#[command(version)]
struct Args {
    /// Path to the feeds JSON configuration file.
    #[arg(short, long, default_value = "feeds.json")]
    feeds: String,

    /// Directory holding the state files.
    #[arg(short, long, default_value = ".")]
    state_dir: PathBuf,

    /// Generate an example feeds file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show every configured feed.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    let feeds_ok = validate_feeds(&args.feeds, args.verbose);
    println!();
    let state_ok = validate_state(&args.state_dir);

    println!();
    if feeds_ok && state_ok {
        println!("✓ Everything looks good");
        ExitCode::SUCCESS
    } else {
        println!("✗ Validation failed");
        ExitCode::FAILURE
    }
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = FeedConfig::example();

    match example.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Example configuration written to: {output_path}");
            println!("\nThe file contains {} feeds and {} keywords.", example.len(), example.keywords.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_feeds(path: &str, verbose: bool) -> bool {
    println!("Validating feeds: {path}");

    let config = if Path::new(path).exists() {
        match FeedConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("✗ Failed to load configuration: {e}");
                return false;
            }
        }
    } else {
        println!("  (file not found, checking the built-in feed list)");
        FeedConfig::default()
    };

    if verbose {
        for feed in &config.feeds {
            println!("  [{}] {}", feed.name, feed.url);
        }
    }

    let errors = config.validate_all();
    for e in &errors {
        println!("  ✗ Error: {e}");
    }

    if errors.is_empty() {
        println!(
            "✓ {} feeds, {} keywords, {} entries per feed",
            config.len(),
            config.keywords.len(),
            config.max_entries_per_feed
        );
        true
    } else {
        println!("✗ {} error(s) in {} feeds", errors.len(), config.len());
        false
    }
}

fn validate_state(dir: &Path) -> bool {
    println!("Validating state in: {}", dir.display());
    let mut ok = true;

    match ContentHashStore::load(dir.join(CONTENT_HASHES_FILE)) {
        Ok(store) => {
            let oldest = store.iter().map(|(_, seen)| *seen).min();
            match oldest {
                Some(oldest) => println!("  ✓ {CONTENT_HASHES_FILE}: {} fingerprints (least recently seen {oldest})", store.len()),
                None => println!("  ✓ {CONTENT_HASHES_FILE}: empty"),
            }
        }
        Err(e) => {
            ok = false;
            println!("  ✗ {e}");
        }
    }

    match SentStore::load(dir.join(SENT_NEWS_FILE)) {
        Ok(store) => println!(
            "  ✓ {SENT_NEWS_FILE}: {} items, {} deliveries",
            store.len(),
            store.record_count()
        ),
        Err(e) => {
            ok = false;
            println!("  ✗ {e}");
        }
    }

    match LanguageStore::load(dir.join(USER_LANGUAGES_FILE), Language::Ru) {
        Ok(store) => {
            println!("  ✓ {USER_LANGUAGES_FILE}: {} preferences", store.len());
            if store.rejected_entries() > 0 {
                println!(
                    "  ⚠ Warning: {} entries with unsupported language codes will be ignored",
                    store.rejected_entries()
                );
            }
        }
        Err(e) => {
            ok = false;
            println!("  ✗ {e}");
        }
    }

    match LastNewsStore::load(dir.join(LAST_NEWS_FILE)) {
        Ok(store) => match store.get() {
            Some(item) => println!("  ✓ {LAST_NEWS_FILE}: \"{}\"", truncate(item.title(), 50)),
            None => println!("  ✓ {LAST_NEWS_FILE}: empty"),
        },
        Err(e) => {
            ok = false;
            println!("  ✗ {e}");
        }
    }

    ok
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}
