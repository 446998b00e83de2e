//! Content-based deduplication over the hash store.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Fingerprint, NewsError, NewsItem};
use crate::store::{ContentHashStore, StoreError};

/// Result of a dedup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    pub fingerprint: Fingerprint,
    pub is_new: bool,
}

/// Decides whether an item has already been processed.
#[derive(Debug)]
pub struct Deduplicator {
    store: ContentHashStore,
}

impl Deduplicator {
    pub fn new(store: ContentHashStore) -> Self {
        Self { store }
    }

    /// Fingerprints `item` and records the sighting.
    ///
    /// A second check of the same content reports `is_new == false` until
    /// the fingerprint is [released](Self::release), and moves its
    /// last-seen time to `now` so retention keeps items still in a feed.
    ///
    /// # Errors
    ///
    /// Returns [`NewsError::InvalidItem`] if the item has no text to hash.
    pub fn check(&mut self, item: &NewsItem, now: DateTime<Utc>) -> Result<DedupOutcome, NewsError> {
        let fingerprint = item.fingerprint()?;
        let is_new = self.store.insert(fingerprint.clone(), now);

        if !is_new {
            debug!(fingerprint = fingerprint.short(), "Duplicate content: {}", item.title());
        }

        Ok(DedupOutcome { fingerprint, is_new })
    }

    /// Forgets a fingerprint whose processing did not complete, so the next
    /// run picks the item up again.
    pub fn release(&mut self, fingerprint: &Fingerprint) -> bool {
        let removed = self.store.remove(fingerprint);
        if removed {
            debug!(fingerprint = fingerprint.short(), "Released fingerprint for retry");
        }
        removed
    }

    pub fn store(&self) -> &ContentHashStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ContentHashStore {
        &mut self.store
    }

    /// Persists the underlying hash store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the file cannot be written.
    pub fn save(&self) -> Result<(), StoreError> {
        self.store.save()
    }
}
