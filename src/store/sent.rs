//! Delivery log (`sent_news.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{ChatId, StoreError, decode_json, load_json, persist_json};
use crate::news::Fingerprint;

type SentMap = BTreeMap<Fingerprint, BTreeMap<ChatId, DateTime<Utc>>>;

/// Records which recipients already received which item.
///
/// Stored nested as `{fingerprint: {chat_id: sent_at}}`, so there is at most
/// one record per (fingerprint, recipient) pair.
#[derive(Debug, Clone)]
pub struct SentStore {
    path: PathBuf,
    sent: SentMap,
}

impl SentStore {
    /// Loads the store from `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let sent = match load_json::<serde_json::Value>(&path)? {
            // list of article links written by the previous bot
            Some(serde_json::Value::Array(links)) => {
                warn!(
                    "Discarding {} legacy sent links from {} (no recipient information)",
                    links.len(),
                    path.display()
                );
                SentMap::new()
            }
            Some(value) => decode_json(&path, value)?,
            None => SentMap::new(),
        };

        debug!("Loaded delivery log for {} items from {}", sent.len(), path.display());
        Ok(Self { path, sent })
    }

    /// True iff no send has been recorded for this pair.
    pub fn should_send(&self, fingerprint: &Fingerprint, recipient: ChatId) -> bool {
        self.sent_at(fingerprint, recipient).is_none()
    }

    /// Records a confirmed delivery. Repeated calls keep a single record
    /// carrying the latest timestamp.
    pub fn mark_sent(&mut self, fingerprint: Fingerprint, recipient: ChatId, sent_at: DateTime<Utc>) {
        self.sent
            .entry(fingerprint)
            .or_default()
            .entry(recipient)
            .and_modify(|ts| {
                if sent_at > *ts {
                    *ts = sent_at;
                }
            })
            .or_insert(sent_at);
    }

    pub fn sent_at(&self, fingerprint: &Fingerprint, recipient: ChatId) -> Option<DateTime<Utc>> {
        self.sent
            .get(fingerprint)
            .and_then(|recipients| recipients.get(&recipient))
            .copied()
    }

    /// Recipients that already received the item.
    pub fn recipients_for(&self, fingerprint: &Fingerprint) -> Vec<ChatId> {
        self.sent
            .get(fingerprint)
            .map(|recipients| recipients.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Drops delivery records older than `cutoff`. Returns how many pairs were removed.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.sent.retain(|_, recipients| {
            let before = recipients.len();
            recipients.retain(|_, ts| *ts >= cutoff);
            removed += before - recipients.len();
            !recipients.is_empty()
        });
        removed
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.sent.keys()
    }

    /// Number of items with at least one delivery.
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Total number of (item, recipient) records.
    pub fn record_count(&self) -> usize {
        self.sent.values().map(BTreeMap::len).sum()
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
        persist_json(&self.path, &self.sent)
    }
}
