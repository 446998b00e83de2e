//! Content fingerprints.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of an item's normalized title and body.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a title/body pair.
    ///
    /// Returns `None` when both parts normalize to empty text, so that empty
    /// items never share a digest.
    #[must_use]
    pub fn compute(title: &str, body: &str) -> Option<Self> {
        let title = normalize_for_fingerprint(title);
        let body = normalize_for_fingerprint(body);
        if title.is_empty() && body.is_empty() {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\n");
        hasher.update(body.as_bytes());
        Some(Self(format!("{:x}", hasher.finalize())))
    }

    /// Wraps an already computed digest (e.g. loaded from a state file).
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases and collapses every whitespace run to a single space.
#[must_use]
pub fn normalize_for_fingerprint(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
