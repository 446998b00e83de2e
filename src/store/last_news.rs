//! Most recently delivered item (`last_news.json`), served by `/lastnews`.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::{StoreError, load_json, persist_json};
use crate::news::NewsItem;

#[derive(Debug, Clone)]
pub struct LastNewsStore {
    path: PathBuf,
    item: Option<NewsItem>,
}

impl LastNewsStore {
    /// Loads the last item from `path`; a missing file or `null` yields nothing.
    ///
    /// A document in another shape (such as the previous bot's
    /// `{title, link, content, message_id}`) is dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let item = match load_json::<serde_json::Value>(&path)? {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match serde_json::from_value::<NewsItem>(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Discarding unrecognized last news entry in {}: {}", path.display(), e);
                    None
                }
            },
        };
        Ok(Self { path, item })
    }

    pub fn get(&self) -> Option<&NewsItem> {
        self.item.as_ref()
    }

    pub fn set(&mut self, item: NewsItem) {
        self.item = Some(item);
    }

    /// Writes the item to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the file cannot be written.
    pub fn save(&self) -> Result<(), StoreError> {
        persist_json(&self.path, &self.item)
    }
}
