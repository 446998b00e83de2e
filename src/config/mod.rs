//! Configuration module for the news bot.
//!
//! Handles loading and validation of the feed list, the runtime settings
//! and the Telegram Bot API credentials.

mod feeds;
mod settings;

pub use feeds::{FeedConfig, FeedSource, ValidationError};
pub use settings::{BotSettings, ConfigError, DEFAULT_API_BASE, TelegramConfig, parse_chat_ids};
