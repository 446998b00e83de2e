//! RSS feed fetching and entry extraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{FeedEntry, clean_html, truncate_chars};

/// Keywords an entry must mention (case-insensitive) to be considered TON news.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "TON",
    "TONCOIN",
    "Ton blockchain",
    "Telegram TON",
    "TON coin",
    "ton network",
    "ton token",
    "ton ecosystem",
    "crypto ton",
    "ton price",
    "ton trading",
    "ton news",
];

/// Entries considered per feed and fetch.
pub const DEFAULT_MAX_ENTRIES: usize = 5;

/// Summary length after HTML cleaning.
pub const DEFAULT_SUMMARY_CHARS: usize = 200;

/// Errors that can occur while fetching a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Feed {url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse feed {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: quick_xml::de::DeError,
    },
}

impl FeedError {
    /// Whether retrying the fetch may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } => false,
        }
    }
}

/// Selection rules applied to every feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRules {
    /// Empty list accepts every entry.
    pub keywords: Vec<String>,
    pub max_entries: usize,
    pub summary_max_chars: usize,
}

impl Default for FeedRules {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| (*k).to_owned()).collect(),
            max_entries: DEFAULT_MAX_ENTRIES,
            summary_max_chars: DEFAULT_SUMMARY_CHARS,
        }
    }
}

impl FeedRules {
    /// Case-insensitive substring match against any keyword.
    pub fn matches(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }
}

/// A source of raw news entries.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetches the current entries of the source.
    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError>;

    /// Identifier used for logging and as the item source.
    fn name(&self) -> &str;
}

/// RSS 2.0 feed over HTTP.
pub struct RssFeedSource {
    name: String,
    url: String,
    client: reqwest::Client,
    rules: FeedRules,
}

impl RssFeedSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        client: reqwest::Client,
        rules: FeedRules,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
            rules,
        }
    }
}

#[async_trait]
impl NewsSource for RssFeedSource {
    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError> {
        let http_err = |source| FeedError::Http {
            url: self.url.clone(),
            source,
        };

        let response = self.client.get(&self.url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(http_err)?;
        let entries = parse_feed(&body, &self.name, &self.rules).map_err(|source| FeedError::Parse {
            url: self.url.clone(),
            source,
        })?;

        debug!(feed = %self.name, "Fetched {} matching entries", entries.len());
        Ok(entries)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// Parses an RSS document into entries that pass `rules`.
///
/// Only the first `rules.max_entries` items are considered. Titles and
/// summaries are cleaned of HTML; summaries are truncated.
///
/// # Errors
///
/// Returns the deserializer error if the document is not RSS 2.0.
pub fn parse_feed(
    xml: &str,
    source: &str,
    rules: &FeedRules,
) -> Result<Vec<FeedEntry>, quick_xml::de::DeError> {
    let xml = scrub_html_entities(xml);
    let rss: Rss = quick_xml::de::from_str(&xml)?;

    let entries = rss
        .channel
        .items
        .into_iter()
        .take(rules.max_entries)
        .filter_map(|item| {
            let title = item.title.unwrap_or_default();
            let summary = item.description.unwrap_or_default();
            if !rules.matches(&title) && !rules.matches(&summary) {
                return None;
            }

            let published_at = item.pub_date.as_deref().and_then(|raw| {
                let parsed = DateTime::parse_from_rfc2822(raw.trim()).ok();
                if parsed.is_none() {
                    warn!(feed = %source, "Unparseable pubDate {:?}", raw);
                }
                parsed.map(|dt| dt.with_timezone(&Utc))
            });

            Some(FeedEntry {
                source: source.to_owned(),
                title: clean_html(&title),
                summary: truncate_chars(&clean_html(&summary), rules.summary_max_chars),
                link: item.link.map(|l| l.trim().to_owned()),
                published_at,
            })
        })
        .collect();

    Ok(entries)
}

/// Replaces HTML-only entities that are not valid XML.
fn scrub_html_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Crypto News</title>
    <link>https://example.com</link>
    <item>
      <title>Toncoin rallies after Telegram update</title>
      <link>https://example.com/ton-rally</link>
      <description><![CDATA[<p>TON&nbsp;gained <b>12%</b> today.</p>]]></description>
      <pubDate>Tue, 10 Jun 2025 08:30:00 +0000</pubDate>
    </item>
    <item>
      <title>Bitcoin ETF flows slow</title>
      <link>https://example.com/btc</link>
      <description>Nothing about the other chain.</description>
    </item>
    <item>
      <title>Weekly recap</title>
      <link>https://example.com/recap</link>
      <description>The ton ecosystem grew &mdash; again.</description>
      <pubDate>not a date</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_filters_by_keyword() {
        let entries = parse_feed(FIXTURE, "example", &FeedRules::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Toncoin rallies after Telegram update");
        assert_eq!(entries[0].summary, "TON gained 12% today.");
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/ton-rally"));
        assert!(entries[0].published_at.is_some());
        assert_eq!(entries[1].title, "Weekly recap");
        assert_eq!(entries[1].published_at, None);
        assert!(entries.iter().all(|e| e.source == "example"));
    }

    #[test]
    fn test_parse_feed_respects_max_entries() {
        let rules = FeedRules {
            max_entries: 1,
            ..FeedRules::default()
        };
        let entries = parse_feed(FIXTURE, "example", &rules).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_parse_feed_without_keywords_accepts_all() {
        let rules = FeedRules {
            keywords: Vec::new(),
            ..FeedRules::default()
        };
        let entries = parse_feed(FIXTURE, "example", &rules).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_parse_feed_truncates_summary() {
        let rules = FeedRules {
            summary_max_chars: 10,
            ..FeedRules::default()
        };
        let entries = parse_feed(FIXTURE, "example", &rules).unwrap();
        assert_eq!(entries[0].summary, "TON gained");
    }

    #[test]
    fn test_parse_feed_empty_channel() {
        let xml = r#"<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let entries = parse_feed(xml, "example", &FeedRules::default()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(parse_feed("<html><body>oops", "example", &FeedRules::default()).is_err());
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let rules = FeedRules::default();
        assert!(rules.matches("New TONCOIN listing"));
        assert!(rules.matches("the Ton Network upgrade"));
        assert!(!rules.matches("Ethereum gas fees"));
    }

    #[test]
    fn test_feed_error_transience() {
        let status = FeedError::Status {
            url: "u".to_owned(),
            status: 503,
        };
        assert!(status.is_transient());
        let status = FeedError::Status {
            url: "u".to_owned(),
            status: 404,
        };
        assert!(!status.is_transient());
    }
}
