//! Content hash store (`content_hashes.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{StoreError, decode_json, load_json, persist_json};
use crate::news::Fingerprint;

/// Fingerprint → last-seen timestamp. A fingerprint appears at most once.
#[derive(Debug, Clone)]
pub struct ContentHashStore {
    path: PathBuf,
    hashes: BTreeMap<Fingerprint, DateTime<Utc>>,
}

impl ContentHashStore {
    /// Loads the store from `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let hashes = match load_json::<serde_json::Value>(&path)? {
            // flat list of truncated digests written by the previous bot
            Some(serde_json::Value::Array(list)) => {
                warn!(
                    "Discarding {} legacy content hashes from {} (incompatible digest format)",
                    list.len(),
                    path.display()
                );
                BTreeMap::new()
            }
            Some(value) => decode_json(&path, value)?,
            None => BTreeMap::new(),
        };

        debug!("Loaded {} content hashes from {}", hashes.len(), path.display());
        Ok(Self { path, hashes })
    }

    /// Returns whether the fingerprint has been recorded.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.hashes.contains_key(fingerprint)
    }

    pub fn last_seen(&self, fingerprint: &Fingerprint) -> Option<DateTime<Utc>> {
        self.hashes.get(fingerprint).copied()
    }

    /// Records a sighting. Returns `true` if the fingerprint was not known;
    /// a known one has its last-seen time moved forward.
    pub fn insert(&mut self, fingerprint: Fingerprint, seen_at: DateTime<Utc>) -> bool {
        match self.hashes.get_mut(&fingerprint) {
            Some(last_seen) => {
                *last_seen = (*last_seen).max(seen_at);
                false
            }
            None => {
                self.hashes.insert(fingerprint, seen_at);
                true
            }
        }
    }

    /// Forgets a fingerprint so it is treated as new again.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> bool {
        self.hashes.remove(fingerprint).is_some()
    }

    /// Drops records last seen before `cutoff`. Returns how many were removed.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.hashes.len();
        self.hashes.retain(|_, seen| *seen >= cutoff);
        before - self.hashes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &DateTime<Utc>)> {
        self.hashes.iter()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
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
        persist_json(&self.path, &self.hashes)
    }
}
