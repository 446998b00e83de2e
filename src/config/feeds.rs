//! Feed configuration and validation.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::news::{DEFAULT_KEYWORDS, DEFAULT_MAX_ENTRIES, DEFAULT_SUMMARY_CHARS, FeedRules};

/// Errors that can occur during feed configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Feed at index {index} has an empty name")]
    EmptyName { index: usize },

    #[error("Feed '{name}' has an invalid URL: {url}")]
    InvalidUrl { name: String, url: String },

    #[error("Duplicate feed name found: {name}")]
    DuplicateName { name: String },

    #[error("max_entries_per_feed must be > 0")]
    ZeroEntries,

    #[error("summary_max_chars must be > 0")]
    ZeroSummary,

    #[error("No feeds configured")]
    NoFeeds,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// A single RSS feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    /// Short identifier, used as the item source.
    pub name: String,

    /// RSS 2.0 URL.
    pub url: String,
}

impl FeedSource {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Feeds to monitor and the rules applied to their entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub feeds: Vec<FeedSource>,

    /// Entries must mention one of these (case-insensitive). Empty accepts all.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_max_entries")]
    pub max_entries_per_feed: usize,

    #[serde(default = "default_summary_chars")]
    pub summary_max_chars: usize,
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|&k| k.to_owned()).collect()
}

const fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

const fn default_summary_chars() -> usize {
    DEFAULT_SUMMARY_CHARS
}

impl Default for FeedConfig {
    fn default() -> Self {
        let feeds = [
            ("cointelegraph", "https://cointelegraph.com/feed"),
            ("decrypt", "https://feeds.decrypt.co/"),
            ("coindesk", "https://www.coindesk.com/arc/outboundfeeds/rss/"),
            ("cryptonews", "https://cryptonews.com/feed/"),
            ("theblock", "https://theblock.co/feed"),
            ("blockchair", "https://blockchair.com/feed"),
            ("messari", "https://messari.io/feed"),
            ("cryptoslate", "https://cryptoslate.com/feed/"),
        ]
        .into_iter()
        .map(|(name, url)| FeedSource::new(name, url))
        .collect();

        Self {
            feeds,
            keywords: default_keywords(),
            max_entries_per_feed: DEFAULT_MAX_ENTRIES,
            summary_max_chars: DEFAULT_SUMMARY_CHARS,
        }
    }
}

impl FeedConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise the built-in feed list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("{} not found, using built-in feed list", path.display());
            Ok(Self::default())
        }
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_all().into_iter().next().map_or(Ok(()), Err)
    }

    /// Returns every problem in the configuration.
    #[must_use]
    pub fn validate_all(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.feeds.is_empty() {
            errors.push(ValidationError::NoFeeds);
        }
        if self.max_entries_per_feed == 0 {
            errors.push(ValidationError::ZeroEntries);
        }
        if self.summary_max_chars == 0 {
            errors.push(ValidationError::ZeroSummary);
        }

        let mut seen = HashSet::new();
        for (index, feed) in self.feeds.iter().enumerate() {
            if feed.name.trim().is_empty() {
                errors.push(ValidationError::EmptyName { index });
                continue;
            }
            if !seen.insert(feed.name.as_str()) {
                errors.push(ValidationError::DuplicateName {
                    name: feed.name.clone(),
                });
            }
            if !(feed.url.starts_with("https://") || feed.url.starts_with("http://")) {
                errors.push(ValidationError::InvalidUrl {
                    name: feed.name.clone(),
                    url: feed.url.clone(),
                });
            }
        }

        errors
    }

    /// Entry rules for [`crate::news::RssFeedSource`].
    #[must_use]
    pub fn rules(&self) -> FeedRules {
        FeedRules {
            keywords: self.keywords.iter().map(|k| k.to_lowercase()).collect(),
            max_entries: self.max_entries_per_feed,
            summary_max_chars: self.summary_max_chars,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Creates an example configuration for users to reference.
    #[must_use]
    pub fn example() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FeedConfig::default();
        assert_eq!(config.len(), 8);
        assert!(config.validate().is_ok());
        assert!(config.keywords.iter().any(|k| k == "toncoin"));
    }

    #[test]
    fn test_validation_empty_feeds() {
        let config = FeedConfig {
            feeds: vec![],
            ..FeedConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::NoFeeds)));
    }

    #[test]
    fn test_validation_duplicate_name() {
        let config = FeedConfig {
            feeds: vec![
                FeedSource::new("same", "https://a.example/feed"),
                FeedSource::new("same", "https://b.example/feed"),
            ],
            ..FeedConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::DuplicateName { .. })));
    }

    #[test]
    fn test_validate_all_collects_every_problem() {
        let config = FeedConfig {
            feeds: vec![FeedSource::new("", "x"), FeedSource::new("bad", "ftp://x")],
            max_entries_per_feed: 0,
            ..FeedConfig::default()
        };
        let errors = config.validate_all();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::ZeroEntries));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: FeedConfig =
            serde_json::from_str(r#"{"feeds":[{"name":"a","url":"https://a.example/rss"}]}"#).unwrap();
        assert_eq!(config.max_entries_per_feed, DEFAULT_MAX_ENTRIES);
        assert_eq!(config.keywords, default_keywords());
    }

    #[test]
    fn test_load_or_default_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.json");

        let config = FeedConfig::load_or_default(&path).unwrap();
        assert_eq!(config, FeedConfig::default());

        let custom = FeedConfig {
            feeds: vec![FeedSource::new("one", "https://one.example/rss")],
            keywords: vec!["TON".to_owned()],
            ..FeedConfig::default()
        };
        custom.save_to_file(&path).unwrap();
        assert_eq!(FeedConfig::load_or_default(&path).unwrap(), custom);
        assert_eq!(custom.rules().keywords, vec!["ton".to_owned()]);
    }
}
