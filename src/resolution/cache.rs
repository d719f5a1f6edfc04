//! Assignment cache.
//!
//! Read-through replica of oracle answers keyed by fingerprint. Expiry is
//! evaluated lazily at lookup time; there is no background sweeper.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::fingerprint::Fingerprint;
use crate::models::Assignment;

/// One cached oracle answer. `assignment == None` is a confirmed
/// "no assignment", which is cached like any other answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentCacheEntry {
    pub assignment: Option<Assignment>,
    pub observed_at: Instant,
    pub ttl: Duration,
}

impl AssignmentCacheEntry {
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.observed_at) < self.ttl
    }
}

/// Fingerprints split by cache state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePartition {
    pub cached: Vec<Fingerprint>,
    pub pending: Vec<Fingerprint>,
}

#[derive(Debug)]
pub struct AssignmentCache {
    entries: HashMap<Fingerprint, AssignmentCacheEntry>,
    ttl: Duration,
}

impl Default for AssignmentCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

impl AssignmentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `fingerprint` if it is still fresh at `now`.
    pub fn get_fresh_at(
        &self,
        fingerprint: &Fingerprint,
        now: Instant,
    ) -> Option<&AssignmentCacheEntry> {
        self.entries
            .get(fingerprint)
            .filter(|entry| entry.is_fresh_at(now))
    }

    pub fn get_fresh(&self, fingerprint: &Fingerprint) -> Option<&AssignmentCacheEntry> {
        self.get_fresh_at(fingerprint, Instant::now())
    }

    /// Split fingerprints into fresh hits and ones that need the oracle.
    pub fn partition_at(&self, fingerprints: &[Fingerprint], now: Instant) -> CachePartition {
        let mut partition = CachePartition::default();
        for fp in fingerprints {
            if self.get_fresh_at(fp, now).is_some() {
                partition.cached.push(fp.clone());
            } else {
                partition.pending.push(fp.clone());
            }
        }
        partition
    }

    /// Store an answer observed at `now` with the configured TTL.
    pub fn insert_at(
        &mut self,
        fingerprint: Fingerprint,
        assignment: Option<Assignment>,
        now: Instant,
    ) {
        self.entries.insert(
            fingerprint,
            AssignmentCacheEntry {
                assignment,
                observed_at: now,
                ttl: self.ttl,
            },
        );
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, assignment: Option<Assignment>) {
        self.insert_at(fingerprint, assignment, Instant::now());
    }

    /// Returns whether an entry was present.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Drop every entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}
