//! Telegram Bot API module.
//!
//! Provides the HTTP client used to deliver news and answer commands,
//! the payload types it exchanges, and rate limiting.

mod client;
mod rate_limiter;
mod types;

pub use client::{TelegramBot, TelegramError, mask_token};
pub use rate_limiter::RateLimiter;
pub use types::{
    ApiResponse, BotCommandInfo, CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup,
    Message, ResponseParameters, Update, User,
};
