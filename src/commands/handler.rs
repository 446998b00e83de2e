//! Command handler implementation.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{BotCommand, CallbackAction, CommandResult};
use crate::analysis::Analyst;
use crate::price::PriceSource;
use crate::render::{self, RenderedMessage};
use crate::store::{ChatId, Language, LanguageStore, LastNewsStore, StoreError};
use crate::translate::{Translation, Translator, translate_item};

/// Handles bot commands and button presses.
pub struct CommandHandler {
    /// Shared preference store, also read by the news pipeline.
    languages: Arc<RwLock<LanguageStore>>,

    /// Most recently delivered item.
    last_news: Arc<RwLock<LastNewsStore>>,

    translator: Arc<dyn Translator>,
    analyst: Arc<dyn Analyst>,
    prices: Arc<dyn PriceSource>,

    /// Language the feeds are written in.
    feed_language: Language,

    /// Username used to filter `/cmd@otherbot` messages.
    bot_username: Option<String>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(
        languages: Arc<RwLock<LanguageStore>>,
        last_news: Arc<RwLock<LastNewsStore>>,
        translator: Arc<dyn Translator>,
        analyst: Arc<dyn Analyst>,
        prices: Arc<dyn PriceSource>,
        feed_language: Language,
    ) -> Self {
        Self {
            languages,
            last_news,
            translator,
            analyst,
            prices,
            feed_language,
            bot_username: None,
        }
    }

    #[must_use]
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub async fn try_handle(&self, chat_id: ChatId, message_text: &str) -> Option<CommandResult> {
        let command = BotCommand::parse(message_text, self.bot_username.as_deref())?;

        debug!(chat_id, "Handling command: {}", command);
        let result = self.execute(chat_id, command).await;
        info!(chat_id, "Command result: success={}", result.success);

        Some(result)
    }

    /// Executes a parsed command.
    pub async fn execute(&self, chat_id: ChatId, command: BotCommand) -> CommandResult {
        match command {
            BotCommand::Start | BotCommand::Language(None) => CommandResult::success(render::welcome()),
            BotCommand::LastNews => self.handle_last_news(chat_id, false).await,
            BotCommand::Price => self.handle_price(chat_id).await,
            BotCommand::Help => CommandResult::success(render::help(self.language_of(chat_id).await)),
            BotCommand::Language(Some(code)) => self.handle_set_language(chat_id, &code).await,
        }
    }

    /// Tries to parse and execute a callback button.
    ///
    /// Returns `None` for unknown callback data.
    pub async fn try_handle_callback(&self, chat_id: ChatId, data: &str) -> Option<CommandResult> {
        let action = CallbackAction::parse(data)?;
        debug!(chat_id, "Handling callback: {}", data);
        Some(self.execute_callback(chat_id, action).await)
    }

    pub async fn execute_callback(&self, chat_id: ChatId, action: CallbackAction) -> CommandResult {
        match action {
            CallbackAction::SetLanguage(lang) => match self.store_language(chat_id, lang).await {
                Ok(()) => CommandResult::success(render::language_selected(lang)),
                Err(e) => self.persist_failed(chat_id, &e).await,
            },
            CallbackAction::SwitchLanguage(lang) => match self.store_language(chat_id, lang).await {
                Ok(()) => self
                    .handle_last_news(chat_id, true)
                    .await
                    .with_notice(render::language_changed_notice(lang)),
                Err(e) => self.persist_failed(chat_id, &e).await,
            },
            CallbackAction::LastNews => self.handle_last_news(chat_id, false).await,
            CallbackAction::Price | CallbackAction::PriceRefresh => self.handle_price(chat_id).await,
            CallbackAction::Help => CommandResult::success(render::help(self.language_of(chat_id).await)),
            CallbackAction::PriceImpact => self.handle_price_impact(chat_id).await,
        }
    }

    async fn language_of(&self, chat_id: ChatId) -> Language {
        self.languages.read().await.language(chat_id)
    }

    async fn handle_set_language(&self, chat_id: ChatId, code: &str) -> CommandResult {
        let current = self.language_of(chat_id).await;
        let lang = match code.parse::<Language>() {
            Ok(lang) => lang,
            Err(e) => {
                debug!(chat_id, "Rejected language update: {}", e);
                return CommandResult::error(render::invalid_language(code, current));
            }
        };

        match self.store_language(chat_id, lang).await {
            Ok(()) => CommandResult::success(render::language_selected(lang)),
            Err(e) => self.persist_failed(chat_id, &e).await,
        }
    }

    /// Stores and persists a preference. The in-memory value is rolled back
    /// if the file cannot be written.
    async fn store_language(&self, chat_id: ChatId, lang: Language) -> Result<(), StoreError> {
        let mut store = self.languages.write().await;
        let previous = store.set(chat_id, lang);

        if let Err(e) = store.save() {
            // Rollback
            match previous {
                Some(prev) => store.set(chat_id, prev),
                None => store.remove(chat_id),
            };
            warn!(chat_id, "Failed to save language preference: {}", e);
            return Err(e);
        }

        info!(chat_id, "Language set to {}", lang);
        Ok(())
    }

    async fn persist_failed(&self, chat_id: ChatId, error: &StoreError) -> CommandResult {
        let text = match self.language_of(chat_id).await {
            Language::En => format!("❌ Failed to save: {error}"),
            Language::Ru => format!("❌ Не удалось сохранить: {error}"),
        };
        CommandResult::error(RenderedMessage::plain(html_escape::encode_text(&text).into_owned()))
    }

    async fn translated(&self, item: &crate::news::NewsItem, lang: Language) -> Translation {
        match translate_item(self.translator.as_ref(), item, self.feed_language, lang).await {
            Ok(translation) => translation,
            Err(e) => {
                warn!("Translation to {} failed, showing original: {}", lang, e);
                Translation::original(item, lang)
            }
        }
    }

    async fn handle_last_news(&self, chat_id: ChatId, with_language_switch: bool) -> CommandResult {
        let lang = self.language_of(chat_id).await;
        let Some(item) = self.last_news.read().await.get().cloned() else {
            return CommandResult::success(render::no_news(lang));
        };

        let translation = self.translated(&item, lang).await;
        let analysis = self.analyst.summary(&item, lang).await;
        CommandResult::success(render::latest_news(
            &translation,
            item.link(),
            &analysis,
            with_language_switch,
        ))
    }

    async fn handle_price(&self, chat_id: ChatId) -> CommandResult {
        let lang = self.language_of(chat_id).await;
        match self.prices.quote().await {
            Ok(quote) => CommandResult::success(render::price(&quote, lang)),
            Err(e) => {
                warn!("Price fetch failed: {}", e);
                CommandResult::error(render::price_error(lang))
            }
        }
    }

    async fn handle_price_impact(&self, chat_id: ChatId) -> CommandResult {
        let lang = self.language_of(chat_id).await;
        let Some(item) = self.last_news.read().await.get().cloned() else {
            return CommandResult::success(render::no_news(lang));
        };

        let analysis = self.analyst.price_impact(&item, lang).await;
        CommandResult::success(render::price_impact(&analysis, lang))
            .with_notice(render::analysis_ready_notice(lang))
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("feed_language", &self.feed_language)
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::HeuristicAnalyst;
    use crate::news::NewsItem;
    use crate::price::{PriceError, PriceQuote};
    use crate::translate::TranslateError;
    use async_trait::async_trait;

    struct Bracket;

    #[async_trait]
    impl Translator for Bracket {
        async fn translate(
            &self,
            text: &str,
            _from: Language,
            to: Language,
        ) -> Result<String, TranslateError> {
            Ok(format!("[{to}] {text}"))
        }
    }

    struct FixedPrice(Option<PriceQuote>);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn quote(&self) -> Result<PriceQuote, PriceError> {
            self.0.ok_or_else(|| PriceError::Malformed("offline".to_owned()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        languages: Arc<RwLock<LanguageStore>>,
        last_news: Arc<RwLock<LastNewsStore>>,
        handler: CommandHandler,
    }

    fn fixture(languages_in_missing_dir: bool, price: Option<PriceQuote>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lang_path = if languages_in_missing_dir {
            dir.path().join("missing").join("langs.json")
        } else {
            dir.path().join("langs.json")
        };
        let languages = Arc::new(RwLock::new(LanguageStore::load(lang_path, Language::Ru).unwrap()));
        let last_news = Arc::new(RwLock::new(LastNewsStore::load(dir.path().join("last.json")).unwrap()));
        let handler = CommandHandler::new(
            Arc::clone(&languages),
            Arc::clone(&last_news),
            Arc::new(Bracket),
            Arc::new(HeuristicAnalyst),
            Arc::new(FixedPrice(price)),
            Language::En,
        );
        Fixture {
            _dir: dir,
            languages,
            last_news,
            handler,
        }
    }

    fn news() -> NewsItem {
        NewsItem::new(
            "cointelegraph",
            "TON price falls",
            "Toncoin dropped",
            Some("https://example.com/ton".to_owned()),
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let f = fixture(false, None);
        assert!(f.handler.try_handle(1, "hello there").await.is_none());
    }

    #[tokio::test]
    async fn test_lang_command_persists() {
        let f = fixture(false, None);
        let result = f.handler.try_handle(7, "/lang en").await.unwrap();
        assert!(result.success);
        assert!(result.message.text.contains("All news in English now!"));

        let path = f.languages.read().await.path().to_path_buf();
        let reloaded = LanguageStore::load(path, Language::Ru).unwrap();
        assert_eq!(reloaded.language(7), Language::En);
    }

    #[tokio::test]
    async fn test_invalid_language_keeps_previous() {
        let f = fixture(false, None);
        f.handler.try_handle(7, "/lang en").await.unwrap();

        let result = f.handler.try_handle(7, "/lang xx").await.unwrap();
        assert!(!result.success);
        assert!(result.message.text.contains("<code>xx</code>"));
        assert_eq!(f.languages.read().await.language(7), Language::En);
    }

    #[tokio::test]
    async fn test_language_rolled_back_when_save_fails() {
        let f = fixture(true, None);
        let result = f
            .handler
            .execute_callback(3, CallbackAction::SetLanguage(Language::En))
            .await;

        assert!(!result.success);
        assert_eq!(f.languages.read().await.stored(3), None);
    }

    #[tokio::test]
    async fn test_last_news_without_news() {
        let f = fixture(false, None);
        let result = f.handler.execute(1, BotCommand::LastNews).await;
        assert!(result.message.text.contains("Новостей пока нет"));
    }

    #[tokio::test]
    async fn test_last_news_is_translated_for_recipient() {
        let f = fixture(false, None);
        f.last_news.write().await.set(news());

        let ru = f.handler.execute(1, BotCommand::LastNews).await;
        assert!(ru.message.text.contains("[ru] TON price falls"));
        assert!(ru.message.text.contains("📉 Тренд: Отрицательный"));

        f.handler.try_handle(2, "/lang en").await.unwrap();
        let en = f.handler.execute(2, BotCommand::LastNews).await;
        assert!(en.message.text.contains("<b>TON price falls</b>"));
        assert!(!en.message.text.contains("[en]"));
    }

    #[tokio::test]
    async fn test_switch_language_callback_shows_news_with_notice() {
        let f = fixture(false, None);
        f.last_news.write().await.set(news());

        let result = f
            .handler
            .try_handle_callback(5, "lang_en")
            .await
            .unwrap();
        assert_eq!(result.notice.as_deref(), Some("Language changed to English"));
        assert!(result.message.keyboard.is_some());
        assert_eq!(f.languages.read().await.language(5), Language::En);
    }

    #[tokio::test]
    async fn test_price_command() {
        let quote = PriceQuote {
            price_usd: 5.0,
            price_rub: 400.0,
            change_24h: 1.0,
        };
        let f = fixture(false, Some(quote));
        let result = f.handler.try_handle(1, "/ton").await.unwrap();
        assert!(result.success);
        assert!(result.message.text.contains("КУРС TON"));

        let f = fixture(false, None);
        let result = f.handler.try_handle(1, "/price").await.unwrap();
        assert!(!result.success);
        assert!(result.message.text.contains("Ошибка"));
    }

    #[tokio::test]
    async fn test_price_impact_uses_last_news() {
        let f = fixture(false, None);
        f.last_news.write().await.set(news());
        let result = f.handler.execute_callback(1, CallbackAction::PriceImpact).await;
        assert!(result.message.text.contains("Вероятный спад"));
        assert_eq!(result.notice.as_deref(), Some("Анализ готов ✅"));
    }
}
