//! Telegram Bot API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::RateLimiter;
use super::types::{ApiResponse, BotCommandInfo, ResponseParameters, Update, User};
use crate::config::TelegramConfig;
use crate::pipeline::{SendError, Sender};
use crate::render::RenderedMessage;
use crate::store::ChatId;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Bot token rejected by Telegram")]
    Unauthorized,

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl TelegramError {
    /// Whether a later attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::FloodWait(_) | Self::Http(_) | Self::Timeout | Self::Malformed(_) => true,
            Self::Api { code, .. } => *code >= 500,
            Self::Unauthorized | Self::Rejected(_) => false,
        }
    }
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL embeds the bot token.
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<TelegramError> for SendError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::FloodWait(seconds) => Self::RateLimited(Duration::from_secs(u64::from(seconds))),
            e if e.is_transient() => Self::Transient(e.to_string()),
            e => Self::Rejected(e.to_string()),
        }
    }
}

/// Maps a failed Bot API response to an error.
fn classify_error(code: u16, description: String, parameters: Option<ResponseParameters>) -> TelegramError {
    match code {
        401 => TelegramError::Unauthorized,
        429 => {
            let seconds = parameters
                .and_then(|p| p.retry_after)
                .or_else(|| extract_flood_wait_seconds(&description))
                .unwrap_or(1);
            TelegramError::FloodWait(seconds)
        }
        400 | 403 => TelegramError::Rejected(description),
        _ => TelegramError::Api { code, description },
    }
}

/// Extracts flood wait seconds from an error description.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let lower = err_msg.to_lowercase();
    let idx = lower.find("retry after ")?;
    let num_str: String = lower[idx + "retry after ".len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    num_str.parse().ok()
}

/// Bot API client bound to one bot token.
pub struct TelegramBot {
    client: reqwest::Client,

    /// `{api_base}/bot{token}`.
    base_url: String,

    /// The bot's own account, from `getMe`.
    me: User,

    /// Spaces outgoing messages.
    rate_limiter: RateLimiter,
}

impl TelegramBot {
    /// Connects to the Bot API and verifies the token with `getMe`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or Telegram is unreachable.
    pub async fn connect(
        config: &TelegramConfig,
        client: reqwest::Client,
        send_interval: Duration,
    ) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let base_url = format!("{}/bot{}", config.api_base.trim_end_matches('/'), config.bot_token);
        let me: User = call(&client, &base_url, "getMe", &json!({}), None).await?;

        info!(
            "Connected to Telegram as @{}",
            me.username.as_deref().unwrap_or(&me.first_name)
        );

        Ok(Self {
            client,
            base_url,
            me,
            rate_limiter: RateLimiter::new(send_interval),
        })
    }

    /// The bot's username, without `@`.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.me.username.as_deref()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &impl Serialize,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        call(&self.client, &self.base_url, method, params, timeout).await
    }

    /// Sends an HTML message, waiting for the rate limiter first.
    ///
    /// # Errors
    ///
    /// Returns an error if Telegram refuses the message or is unreachable.
    pub async fn send_message(&self, chat_id: ChatId, message: &RenderedMessage) -> Result<(), TelegramError> {
        let waited = self.rate_limiter.wait_and_acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit", waited);
        }

        let mut params = message_params(message);
        params["chat_id"] = json!(chat_id);

        match self.call::<Value>("sendMessage", &params, None).await {
            Ok(_) => {
                debug!(chat_id, "Message sent");
                Ok(())
            }
            Err(err) => {
                if let TelegramError::FloodWait(seconds) = &err {
                    warn!(chat_id, "Flood wait triggered: {} seconds", seconds);
                    self.rate_limiter.handle_flood_wait(*seconds).await;
                }
                Err(err)
            }
        }
    }

    /// Replaces the text and keyboard of a message the bot sent earlier.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit is refused. Telegram refuses edits
    /// that leave the message unchanged; callers may ignore that case.
    pub async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: i64,
        message: &RenderedMessage,
    ) -> Result<(), TelegramError> {
        let mut params = message_params(message);
        params["chat_id"] = json!(chat_id);
        params["message_id"] = json!(message_id);

        self.call::<Value>("editMessageText", &params, None).await.map(|_| ())
    }

    /// Acknowledges a button press, optionally with a toast.
    ///
    /// # Errors
    ///
    /// Returns an error if the query expired or Telegram is unreachable.
    pub async fn answer_callback_query(&self, query_id: &str, text: Option<&str>) -> Result<(), TelegramError> {
        let mut params = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        self.call::<bool>("answerCallbackQuery", &params, None).await.map(|_| ())
    }

    /// Long-polls for updates after `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if polling fails.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let params = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        // Leave room for the server-side long poll on top of the client timeout.
        let timeout = Duration::from_secs(timeout_secs + 10);
        self.call("getUpdates", &params, Some(timeout)).await
    }

    /// Registers the command list shown in Telegram clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn set_my_commands(&self, commands: &[BotCommandInfo]) -> Result<(), TelegramError> {
        self.call::<bool>("setMyCommands", &json!({ "commands": commands }), None)
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("username", &self.me.username)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Sender for TelegramBot {
    async fn send(&self, recipient: ChatId, message: &RenderedMessage) -> Result<(), SendError> {
        self.send_message(recipient, message).await.map_err(SendError::from)
    }
}

fn message_params(message: &RenderedMessage) -> Value {
    let mut params = json!({
        "text": message.text,
        "parse_mode": "HTML",
        "link_preview_options": { "is_disabled": true },
    });
    if let Some(keyboard) = &message.keyboard {
        params["reply_markup"] = json!(keyboard);
    }
    params
}

async fn call<T: DeserializeOwned>(
    client: &reqwest::Client,
    base_url: &str,
    method: &str,
    params: &impl Serialize,
    timeout: Option<Duration>,
) -> Result<T, TelegramError> {
    let mut request = client.post(format!("{base_url}/{method}")).json(params);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response: ApiResponse<T> = request.send().await?.json().await?;
    decode_response(response)
}

fn decode_response<T>(response: ApiResponse<T>) -> Result<T, TelegramError> {
    if response.ok {
        return response
            .result
            .ok_or_else(|| TelegramError::Malformed("ok response without result".to_owned()));
    }

    let code = response.error_code.unwrap_or(0);
    let description = response.description.unwrap_or_default();
    if let Some(migrated) = response.parameters.and_then(|p| p.migrate_to_chat_id) {
        warn!("Chat migrated to supergroup {}", migrated);
    }
    Err(classify_error(code, description, response.parameters))
}

/// Masks a bot token for display, keeping the bot id.
#[must_use]
pub fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((bot_id, _)) => format!("{bot_id}:***"),
        None => "***".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(raw: &str) -> TelegramError {
        let response: ApiResponse<Value> = serde_json::from_str(raw).unwrap();
        decode_response(response).unwrap_err()
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("123456:ABC-DEF"), "123456:***");
        assert_eq!(mask_token("garbage"), "***");
    }

    #[test]
    fn test_extract_flood_wait() {
        assert_eq!(extract_flood_wait_seconds("Too Many Requests: retry after 35"), Some(35));
        assert_eq!(extract_flood_wait_seconds("Bad Request: chat not found"), None);
    }

    #[test]
    fn test_classify_flood_wait_prefers_parameters() {
        let err = failure(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":12}}"#,
        );
        assert!(matches!(err, TelegramError::FloodWait(12)));
        assert_eq!(SendError::from(err), SendError::RateLimited(Duration::from_secs(12)));
    }

    #[test]
    fn test_classify_flood_wait_from_description() {
        let err = failure(r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7"}"#);
        assert!(matches!(err, TelegramError::FloodWait(7)));
    }

    #[test]
    fn test_classify_permanent_errors() {
        let blocked = failure(r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#);
        assert!(!blocked.is_transient());
        assert!(matches!(SendError::from(blocked), SendError::Rejected(_)));

        let unauthorized = failure(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#);
        assert!(matches!(unauthorized, TelegramError::Unauthorized));
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        let err = failure(r#"{"ok":false,"error_code":502,"description":"Bad Gateway"}"#);
        assert!(err.is_transient());
        assert!(matches!(SendError::from(err), SendError::Transient(_)));
    }

    #[test]
    fn test_ok_response_decodes_result() {
        let response: ApiResponse<bool> = serde_json::from_str(r#"{"ok":true,"result":true}"#).unwrap();
        assert!(decode_response(response).unwrap());
    }

    #[test]
    fn test_message_params() {
        let message = RenderedMessage::plain("<b>hi</b>");
        let params = message_params(&message);
        assert_eq!(params["parse_mode"], "HTML");
        assert_eq!(params["link_preview_options"]["is_disabled"], true);
        assert!(params.get("reply_markup").is_none());
    }
}
