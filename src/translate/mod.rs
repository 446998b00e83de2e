//! Translation of news items into recipient languages.

mod mymemory;

use async_trait::async_trait;
use thiserror::Error;

use crate::news::NewsItem;
use crate::store::Language;

pub use mymemory::{MAX_QUERY_CHARS, MYMEMORY_ENDPOINT, MyMemoryTranslator};

/// Errors returned by a translation backend.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Translation service answered with HTTP {0}")]
    Status(u16),

    #[error("Translation service error {status}: {message}")]
    Service { status: i64, message: String },

    #[error("Malformed translation response: {0}")]
    Malformed(String),
}

impl TranslateError {
    /// Whether retrying the request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status(status) => *status == 429 || *status >= 500,
            Self::Service { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// A translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` from `from` into `to`.
    async fn translate(
        &self,
        text: &str,
        from: Language,
        to: Language,
    ) -> Result<String, TranslateError>;
}

/// Title and body of an item rendered in one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub language: Language,
    pub title: String,
    pub body: String,
}

impl Translation {
    /// The item's own text, untranslated.
    pub fn original(item: &NewsItem, language: Language) -> Self {
        Self {
            language,
            title: item.title().to_owned(),
            body: item.body().to_owned(),
        }
    }
}

/// Translates an item's title and body.
///
/// Returns the original text without calling the backend when `from == to`.
/// Empty parts are passed through as is.
///
/// # Errors
///
/// Returns the backend error for the first part that fails.
pub async fn translate_item(
    translator: &dyn Translator,
    item: &NewsItem,
    from: Language,
    to: Language,
) -> Result<Translation, TranslateError> {
    if from == to {
        return Ok(Translation::original(item, to));
    }

    let title = translate_part(translator, item.title(), from, to).await?;
    let body = translate_part(translator, item.body(), from, to).await?;

    Ok(Translation {
        language: to,
        title,
        body,
    })
}

async fn translate_part(
    translator: &dyn Translator,
    text: &str,
    from: Language,
    to: Language,
) -> Result<String, TranslateError> {
    if text.trim().is_empty() {
        return Ok(text.to_owned());
    }
    translator.translate(text, from, to).await
}
