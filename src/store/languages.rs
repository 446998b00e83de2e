//! Per-user language preferences (`user_languages.json`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatId, StoreError, load_json, persist_json};

/// Languages the bot can deliver news in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    En,
}

impl Language {
    /// Every supported language, in menu order.
    pub const ALL: [Self; 2] = [Self::Ru, Self::En];

    /// ISO 639-1 code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::En => "en",
        }
    }

    /// Language name in the language itself.
    #[must_use]
    pub const fn native_name(self) -> &'static str {
        match self {
            Self::Ru => "Русский",
            Self::En => "English",
        }
    }

    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Ru => "🇷🇺",
            Self::En => "🇬🇧",
        }
    }
}

impl FromStr for Language {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ru" => Ok(Self::Ru),
            "en" => Ok(Self::En),
            _ => Err(StoreError::InvalidLanguage(s.to_owned())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Recipient → preferred language, with a configured fallback.
#[derive(Debug, Clone)]
pub struct LanguageStore {
    path: PathBuf,
    default_language: Language,
    prefs: BTreeMap<ChatId, Language>,
    rejected: usize,
}

impl LanguageStore {
    /// Loads preferences from `path`; a missing file yields an empty store.
    ///
    /// Entries with unsupported codes are dropped with a warning and counted
    /// in [`LanguageStore::rejected_entries`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>, default_language: Language) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let raw: BTreeMap<ChatId, String> = load_json(&path)?.unwrap_or_default();

        let mut prefs = BTreeMap::new();
        let mut rejected = 0;
        for (chat_id, code) in raw {
            match code.parse::<Language>() {
                Ok(lang) => {
                    prefs.insert(chat_id, lang);
                }
                Err(_) => {
                    warn!("Ignoring unsupported language {:?} for chat {}", code, chat_id);
                    rejected += 1;
                }
            }
        }

        debug!("Loaded {} language preferences from {}", prefs.len(), path.display());
        Ok(Self {
            path,
            default_language,
            prefs,
            rejected,
        })
    }

    /// Returns the recipient's language, or the default if unset.
    pub fn language(&self, recipient: ChatId) -> Language {
        self.stored(recipient).unwrap_or(self.default_language)
    }

    /// Returns the explicitly stored language, if any.
    pub fn stored(&self, recipient: ChatId) -> Option<Language> {
        self.prefs.get(&recipient).copied()
    }

    /// Validates `code` and upserts it. An unknown code leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLanguage`] for codes outside the allowed set.
    pub fn set_language(&mut self, recipient: ChatId, code: &str) -> Result<Language, StoreError> {
        let lang: Language = code.parse()?;
        self.set(recipient, lang);
        Ok(lang)
    }

    /// Upserts an already validated language. Returns the previous value.
    pub fn set(&mut self, recipient: ChatId, lang: Language) -> Option<Language> {
        self.prefs.insert(recipient, lang)
    }

    pub fn remove(&mut self, recipient: ChatId) -> Option<Language> {
        self.prefs.remove(&recipient)
    }

    /// Recipients that picked a language, i.e. opted in to news delivery.
    pub fn subscribers(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.prefs.keys().copied()
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Number of entries dropped at load time.
    pub fn rejected_entries(&self) -> usize {
        self.rejected
    }

    pub fn len(&self) -> usize {
        self.prefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefs.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the store to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the file cannot be written.
    pub fn save(&self) -> Result<(), StoreError> {
        persist_json(&self.path, &self.prefs)
    }
}
