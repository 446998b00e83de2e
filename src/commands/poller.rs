//! Long-polling loop feeding Telegram updates to the command handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::CommandHandler;
use crate::telegram::{CallbackQuery, Message, TelegramBot, TelegramError, Update};

/// Seconds Telegram holds a `getUpdates` request open.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Receives commands and button presses and answers them.
pub struct UpdatePoller {
    bot: Arc<TelegramBot>,
    handler: Arc<CommandHandler>,

    /// Pause after a failed poll.
    error_backoff: Duration,
}

impl UpdatePoller {
    #[must_use]
    pub fn new(bot: Arc<TelegramBot>, handler: Arc<CommandHandler>) -> Self {
        Self {
            bot,
            handler,
            error_backoff: Duration::from_secs(5),
        }
    }

    /// Polls until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Command poller started");
        let mut offset = 0;

        loop {
            let updates = tokio::select! {
                result = self.bot.get_updates(offset, POLL_TIMEOUT_SECS) => result,
                _ = shutdown.changed() => break,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(TelegramError::Timeout) => debug!("Poll timed out, polling again"),
                Err(TelegramError::FloodWait(seconds)) => {
                    warn!("Flood wait while polling: {} seconds", seconds);
                    tokio::time::sleep(Duration::from_secs(u64::from(seconds))).await;
                }
                Err(e) => {
                    warn!("Failed to fetch updates: {}", e);
                    tokio::time::sleep(self.error_backoff).await;
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Command poller stopped");
    }

    async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(&message).await;
        } else if let Some(query) = update.callback_query {
            self.handle_callback(&query).await;
        }
    }

    async fn handle_message(&self, message: &Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id;

        if let Some(result) = self.handler.try_handle(chat_id, text).await
            && let Err(e) = self.bot.send_message(chat_id, &result.message).await
        {
            warn!(chat_id, "Failed to send command reply: {}", e);
        }
    }

    async fn handle_callback(&self, query: &CallbackQuery) {
        let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);
        let data = query.data.as_deref().unwrap_or_default();

        let Some(result) = self.handler.try_handle_callback(chat_id, data).await else {
            debug!(chat_id, "Ignoring unknown callback data {:?}", data);
            self.answer(query, None).await;
            return;
        };

        let delivered = match &query.message {
            Some(message) => {
                self.bot
                    .edit_message_text(chat_id, message.message_id, &result.message)
                    .await
            }
            None => self.bot.send_message(chat_id, &result.message).await,
        };

        match delivered {
            Ok(()) => {}
            // Pressing "refresh" on an unchanged quote.
            Err(TelegramError::Rejected(description)) if description.contains("message is not modified") => {
                debug!(chat_id, "Message unchanged");
            }
            Err(e) => warn!(chat_id, "Failed to answer callback: {}", e),
        }

        self.answer(query, result.notice.as_deref()).await;
    }

    async fn answer(&self, query: &CallbackQuery, text: Option<&str>) {
        if let Err(e) = self.bot.answer_callback_query(&query.id, text).await {
            debug!("Failed to acknowledge callback {}: {}", query.id, e);
        }
    }
}

impl std::fmt::Debug for UpdatePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePoller")
            .field("error_backoff", &self.error_backoff)
            .finish_non_exhaustive()
    }
}
