//! TON News Bot Library
//!
//! A Telegram bot that watches crypto RSS feeds for TON news and delivers
//! each story once per recipient, in the recipient's language.
//!
//! This crate provides the core functionality for:
//! - Fetching and filtering RSS feeds
//! - Content-based deduplication that survives restarts
//! - Per-recipient delivery tracking and language preferences
//! - Translation, analysis and price lookups
//! - Handling user commands via the Telegram Bot API

pub mod analysis;
pub mod commands;
pub mod config;
pub mod news;
pub mod pipeline;
pub mod price;
pub mod render;
pub mod store;
pub mod telegram;
pub mod translate;
