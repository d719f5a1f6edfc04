//! SHA-256 fingerprinting of permanent links.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FingerprintError;

/// Hex digest of a permanent link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a digest received from the oracle.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Fingerprint a link synchronously.
    pub fn of_link(link: &str) -> Self {
        Self(compute_hash(link))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA256 hash of content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Maps a permanent link to its fingerprint.
///
/// Async so that a platform digest primitive can back it. Implementations
/// must be pure: no retries, no internal caching.
#[async_trait]
pub trait Fingerprinter: Send + Sync {
    async fn fingerprint(&self, link: &str) -> Result<Fingerprint, FingerprintError>;
}

/// Default in-process SHA-256 fingerprinter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

#[async_trait]
impl Fingerprinter for Sha256Fingerprinter {
    async fn fingerprint(&self, link: &str) -> Result<Fingerprint, FingerprintError> {
        if link.trim().is_empty() {
            return Err(FingerprintError::EmptyLink);
        }
        Ok(Fingerprint::of_link(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash("test content");
        assert_eq!(hash.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_fingerprinter_matches_sync_hash() {
        let link = "https://records.example/calls/101.mp3";
        let fp = Sha256Fingerprinter.fingerprint(link).await.unwrap();
        assert_eq!(fp, Fingerprint::of_link(link));
        assert_eq!(fp.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_empty_link_rejected() {
        let result = Sha256Fingerprinter.fingerprint("  ").await;
        assert_eq!(result, Err(FingerprintError::EmptyLink));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let fp = Fingerprint::from_hex("deadbeef");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"deadbeef\"");
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_deterministic(link in "\\PC{1,200}") {
            prop_assert_eq!(Fingerprint::of_link(&link), Fingerprint::of_link(&link));
        }

        #[test]
        fn prop_fingerprint_is_fixed_length_hex(link in "\\PC{0,200}") {
            let fp = Fingerprint::of_link(&link);
            prop_assert_eq!(fp.as_str().len(), 64);
            prop_assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
