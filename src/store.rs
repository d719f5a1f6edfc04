//! Shared filter state.
//!
//! One `FilterStore` is created by the filter builder and handed to every
//! component that needs it. It holds the bound deal, the assignment cache,
//! the show-hidden toggle, the last pass failure and a monotonic epoch that
//! moves on every context change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::FilterError;
use crate::fingerprint::Fingerprint;
use crate::models::Assignment;
use crate::resolution::cache::AssignmentCache;
use crate::resolution::context::PassContext;

#[derive(Debug, Default)]
struct Binding {
    deal_id: Option<String>,
    show_hidden_calls: bool,
}

#[derive(Debug)]
pub struct FilterStore {
    binding: Mutex<Binding>,
    cache: Mutex<AssignmentCache>,
    last_error: Mutex<Option<FilterError>>,
    epoch: AtomicU64,
}

impl FilterStore {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            binding: Mutex::new(Binding::default()),
            cache: Mutex::new(AssignmentCache::new(cache_ttl)),
            last_error: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn deal_id(&self) -> Option<String> {
        self.binding.lock().deal_id.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Lock the assignment cache. Never hold the guard across an `.await`.
    pub fn cache(&self) -> MutexGuard<'_, AssignmentCache> {
        self.cache.lock()
    }

    /// Bind a new deal context. Clears the cache and advances the epoch when
    /// the deal actually changes. Returns whether it changed.
    pub fn bind_deal(&self, deal_id: Option<String>) -> bool {
        let mut binding = self.binding.lock();
        if binding.deal_id == deal_id {
            return false;
        }
        binding.deal_id = deal_id;
        drop(binding);

        self.invalidate();
        true
    }

    /// Clear the cache and advance the epoch, making in-flight passes stale.
    pub fn invalidate(&self) -> usize {
        let mut cache = self.cache.lock();
        let dropped = cache.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        dropped
    }

    /// Overwrite one entry with an answer known locally, e.g. after a manual
    /// assignment. The epoch moves under the cache lock, so a pass whose
    /// lookup started earlier comes back stale instead of merging its older
    /// answer over this one.
    pub fn record_assignment(&self, fingerprint: Fingerprint, assignment: Option<Assignment>) {
        let mut cache = self.cache.lock();
        cache.insert(fingerprint, assignment);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop one entry so the next pass asks the oracle again. Advances the
    /// epoch like `record_assignment`. Returns whether an entry was dropped.
    pub fn forget(&self, fingerprint: &Fingerprint) -> bool {
        let mut cache = self.cache.lock();
        let removed = cache.remove(fingerprint);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        removed
    }

    /// True when nothing changed since `ctx` was captured.
    pub fn is_current(&self, ctx: &PassContext) -> bool {
        self.epoch() == ctx.epoch && self.deal_id().as_deref() == Some(ctx.deal_id.as_str())
    }

    pub fn show_hidden_calls(&self) -> bool {
        self.binding.lock().show_hidden_calls
    }

    /// Returns whether the flag changed.
    pub fn set_show_hidden_calls(&self, show: bool) -> bool {
        let mut binding = self.binding.lock();
        let changed = binding.show_hidden_calls != show;
        binding.show_hidden_calls = show;
        changed
    }

    pub fn record_error(&self, error: FilterError) {
        *self.last_error.lock() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    pub fn last_error(&self) -> Option<FilterError> {
        self.last_error.lock().clone()
    }
}
