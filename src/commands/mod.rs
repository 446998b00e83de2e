//! Command handling module.
//!
//! Processes slash commands and inline keyboard presses sent to the bot,
//! and runs the long-polling loop that receives them.

mod handler;
mod poller;
mod types;

pub use handler::CommandHandler;
pub use poller::UpdatePoller;
pub use types::{BotCommand, CallbackAction, CommandResult};
