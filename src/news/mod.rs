//! News items, fingerprints and deduplication.
//!
//! Feed entries arrive as loosely shaped [`FeedEntry`] records and are
//! validated into immutable [`NewsItem`]s before anything is hashed or
//! delivered.

mod dedup;
mod feed;
mod fingerprint;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dedup::{DedupOutcome, Deduplicator};
pub use feed::{
    DEFAULT_KEYWORDS, DEFAULT_MAX_ENTRIES, DEFAULT_SUMMARY_CHARS, FeedError, FeedRules, NewsSource,
    RssFeedSource, parse_feed,
};
pub use fingerprint::{Fingerprint, normalize_for_fingerprint};

/// Placeholder body used when a feed entry carries no summary.
pub const NO_DESCRIPTION: &str = "No description";

/// Errors raised while validating news items.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NewsError {
    #[error("Invalid news item from '{feed}': {reason}")]
    InvalidItem { feed: String, reason: &'static str },
}

/// A raw entry as produced by a [`NewsSource`], before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Identifier of the feed the entry came from.
    pub source: String,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A validated news item. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    source: String,
    title: String,
    body: String,
    link: Option<String>,
    published_at: Option<DateTime<Utc>>,
    discovered_at: DateTime<Utc>,
}

impl NewsItem {
    /// Creates a news item, rejecting empty sources and empty content.
    ///
    /// # Errors
    ///
    /// Returns [`NewsError::InvalidItem`] if the source identifier is blank or
    /// the title and body normalize to nothing.
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        link: Option<String>,
        discovered_at: DateTime<Utc>,
    ) -> Result<Self, NewsError> {
        let source = source.into().trim().to_owned();
        let title = title.into();
        let body = body.into();

        if source.is_empty() {
            return Err(NewsError::InvalidItem {
                feed: source,
                reason: "missing source identifier",
            });
        }

        if Fingerprint::compute(&title, &body).is_none() {
            return Err(NewsError::InvalidItem {
                feed: source,
                reason: "empty text",
            });
        }

        Ok(Self {
            source,
            title,
            body,
            link: link.filter(|l| !l.trim().is_empty()),
            published_at: None,
            discovered_at,
        })
    }

    /// Validates a raw feed entry discovered at `discovered_at`.
    ///
    /// # Errors
    ///
    /// See [`NewsItem::new`].
    pub fn from_entry(entry: FeedEntry, discovered_at: DateTime<Utc>) -> Result<Self, NewsError> {
        let published_at = entry.published_at;
        let mut item = Self::new(
            entry.source,
            entry.title,
            entry.summary,
            entry.link,
            discovered_at,
        )?;
        item.published_at = published_at;
        Ok(item)
    }

    /// Content fingerprint of this item.
    ///
    /// # Errors
    ///
    /// Only fails for items deserialized from a state file with empty text.
    pub fn fingerprint(&self) -> Result<Fingerprint, NewsError> {
        Fingerprint::compute(&self.title, &self.body).ok_or_else(|| NewsError::InvalidItem {
            feed: self.source.clone(),
            reason: "empty text",
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }
}

/// Strips HTML tags, decodes entities and collapses whitespace.
pub fn clean_html(text: &str) -> String {
    #[allow(clippy::unwrap_used)]
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^<]+?>").unwrap());

    if text.is_empty() {
        return String::new();
    }

    let stripped = RE_TAGS.replace_all(text, "");
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
