//! Application settings and Telegram configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{ChatId, Language};

/// Default Bot API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,

    /// Chats that always receive news, regardless of subscriptions.
    pub chat_ids: Vec<ChatId>,

    /// Bot API base URL (overridable for local Bot API servers).
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_owned()
}

impl TelegramConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` (comma-separated)
    /// to be set; `TELEGRAM_API_BASE` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TelegramConfig::from_env`] over an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN"))?;

        let raw_ids = lookup("TELEGRAM_CHAT_ID").ok_or(ConfigError::MissingEnvVar("TELEGRAM_CHAT_ID"))?;
        let chat_ids = parse_chat_ids(&raw_ids)?;

        let api_base = lookup("TELEGRAM_API_BASE")
            .map(|b| b.trim().trim_end_matches('/').to_owned())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(default_api_base);

        Ok(Self {
            bot_token: bot_token.trim().to_owned(),
            chat_ids,
            api_base,
        })
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &crate::telegram::mask_token(&self.bot_token))
            .field("chat_ids", &self.chat_ids)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Parses a comma-separated list of chat ids, dropping duplicates.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidChatId`] for entries that are not integers
/// and [`ConfigError::NoRecipients`] if the list is empty.
pub fn parse_chat_ids(raw: &str) -> Result<Vec<ChatId>, ConfigError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: ChatId = part
            .parse()
            .map_err(|_| ConfigError::InvalidChatId(part.to_owned()))?;
        if id == 0 {
            return Err(ConfigError::InvalidChatId(part.to_owned()));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    if ids.is_empty() {
        return Err(ConfigError::NoRecipients);
    }
    Ok(ids)
}

/// Bot-specific settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Directory holding the state files.
    pub state_dir: PathBuf,

    /// Interval between monitor runs in seconds.
    pub check_interval_secs: u64,

    /// Minimum interval between two sends in seconds.
    pub send_interval_secs: u64,

    /// Timeout applied to every outbound HTTP request.
    pub http_timeout_secs: u64,

    /// Attempts per network operation, including the first.
    pub retry_attempts: u32,

    /// Backoff base; attempt `n` waits `base << (n - 1)`.
    pub retry_base_ms: u64,

    /// Language for recipients without a stored preference.
    pub default_language: Language,

    /// Language the configured feeds are written in.
    pub feed_language: Language,

    /// Delivery and hash records older than this are pruned.
    pub retention_days: u32,

    /// Enables the OpenAI analyst when set.
    pub openai_api_key: Option<String>,

    pub openai_model: String,

    /// Log level for the application.
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn or_default<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default", raw, key);
            default
        }),
        None => default,
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            check_interval_secs: 120,
            send_interval_secs: 2,
            http_timeout_secs: 10,
            retry_attempts: 3,
            retry_base_ms: 500,
            default_language: Language::Ru,
            feed_language: Language::En,
            retention_days: 30,
            openai_api_key: None,
            openai_model: "gpt-3.5-turbo".to_owned(),
            log_level: default_log_level(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    ///
    /// Unparseable values are reported and replaced by their default.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BotSettings::from_env_with_defaults`] over an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let parsed = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        Self {
            state_dir: parsed("STATE_DIR").map_or(defaults.state_dir, PathBuf::from),
            check_interval_secs: or_default(
                "CHECK_INTERVAL_SECS",
                parsed("CHECK_INTERVAL_SECS"),
                defaults.check_interval_secs,
            )
            .max(1),
            send_interval_secs: or_default(
                "SEND_INTERVAL_SECS",
                parsed("SEND_INTERVAL_SECS"),
                defaults.send_interval_secs,
            ),
            http_timeout_secs: or_default(
                "HTTP_TIMEOUT_SECS",
                parsed("HTTP_TIMEOUT_SECS"),
                defaults.http_timeout_secs,
            )
            .max(1),
            retry_attempts: or_default("RETRY_ATTEMPTS", parsed("RETRY_ATTEMPTS"), defaults.retry_attempts)
                .max(1),
            retry_base_ms: or_default("RETRY_BASE_MS", parsed("RETRY_BASE_MS"), defaults.retry_base_ms),
            default_language: or_default(
                "DEFAULT_LANGUAGE",
                parsed("DEFAULT_LANGUAGE"),
                defaults.default_language,
            ),
            feed_language: or_default("FEED_LANGUAGE", parsed("FEED_LANGUAGE"), defaults.feed_language),
            retention_days: or_default(
                "STATE_RETENTION_DAYS",
                parsed("STATE_RETENTION_DAYS"),
                defaults.retention_days,
            ),
            openai_api_key: parsed("OPENAI_API_KEY"),
            openai_model: parsed("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            log_level: parsed("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Path of a state file inside the state directory.
    #[must_use]
    pub fn state_path(&self, file_name: &str) -> PathBuf {
        self.state_dir.join(file_name)
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    #[must_use]
    pub const fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_secs)
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub const fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl std::fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotSettings")
            .field("state_dir", &self.state_dir)
            .field("check_interval_secs", &self.check_interval_secs)
            .field("send_interval_secs", &self.send_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("default_language", &self.default_language)
            .field("feed_language", &self.feed_language)
            .field("retention_days", &self.retention_days)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .field("openai_model", &self.openai_model)
            .finish_non_exhaustive()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid chat id {0:?} (must be a non-zero integer)")]
    InvalidChatId(String),

    #[error("TELEGRAM_CHAT_ID lists no recipients")]
    NoRecipients,
}
