//! Flat-file state stores.
//!
//! Every store is a JSON document that is loaded once at startup, mutated
//! in memory, and written back at checkpoints. Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! failed write never clobbers the previous durable state.

mod hashes;
mod languages;
mod last_news;
mod sent;

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use hashes::ContentHashStore;
pub use languages::{Language, LanguageStore};
pub use last_news::LastNewsStore;
pub use sent::SentStore;

/// Dedup tracking file.
pub const CONTENT_HASHES_FILE: &str = "content_hashes.json";

/// Delivery log file.
pub const SENT_NEWS_FILE: &str = "sent_news.json";

/// Per-user locale preferences file.
pub const USER_LANGUAGES_FILE: &str = "user_languages.json";

/// Most recently delivered item.
pub const LAST_NEWS_FILE: &str = "last_news.json";

/// Telegram chat identifier used as the recipient key.
pub type ChatId = i64;

/// Errors that can occur while loading or persisting state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unsupported language code: {0:?} (allowed: ru, en)")]
    InvalidLanguage(String),

    #[error("Failed to read state file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist state file {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reads a JSON document, returning `None` for a missing or blank file.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Decodes a document previously loaded as a raw JSON value.
pub(crate) fn decode_json<T: DeserializeOwned>(
    path: &Path,
    value: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically replaces `path` with the JSON encoding of `value`.
pub(crate) fn persist_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let persist_err = |source: std::io::Error| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let content = serde_json::to_vec_pretty(value).map_err(|e| persist_err(e.into()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
    tmp.write_all(&content).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;

    Ok(())
}
