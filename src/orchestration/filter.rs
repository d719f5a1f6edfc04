//! Call visibility filter.
//!
//! Coordinates one deal context:
//! 1. Bind: clear the cache, restore the page, run the first pass
//! 2. Watch: feed mutations that add call entries schedule a debounced pass
//! 3. Pass: extract -> resolve -> decorate, unless the context moved meanwhile
//! 4. Unbind/teardown: cancel the pending trigger and restore the page
//!
//! Pass failures never escape as `Err`: they come back as a `PassOutcome`
//! and are kept on the store as the last error.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::FilterConfig;
use crate::decoration::{ControlAction, VisibilityDecorator};
use crate::dom::{HostDocument, MutationRecord, NodeId};
use crate::error::FilterError;
use crate::extraction::{extract_call, extract_calls};
use crate::fingerprint::{Fingerprint, Fingerprinter, Sha256Fingerprinter};
use crate::logging::structured::LogContext;
use crate::models::{Assignment, CallRecord};
use crate::oracle::{
    AssignByHashRequest, AssignmentOracle, AttachNextActivation, AttachNextRequest,
    AttachNextStatus, CancelAttachNextResponse, HttpAssignmentOracle, UnassignedCallsPage,
    DEFAULT_ATTACH_NEXT_TTL_SECS, DEFAULT_UNASSIGNED_PAGE_LIMIT,
};
use crate::resolution::{AssignmentResolver, PassContext, UnassignedCall};
use crate::store::FilterStore;
use crate::{log_info, log_warn};

use super::debounce::Debouncer;

/// Reason sent with manual assignments.
pub const MANUAL_ASSIGNMENT_REASON: &str = "manual_assignment";

/// Why a pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDeal,
    NoCalls,
}

/// What an applied pass changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass_id: String,
    pub calls: usize,
    pub owned: HashSet<String>,
    pub not_owned: HashSet<String>,
    pub hidden: usize,
    pub shown: usize,
    /// The show-hidden toggle was on, so nothing was hidden.
    pub hide_suppressed: bool,
}

/// Result of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Applied(PassReport),
    Skipped(SkipReason),
    /// The deal context changed while the pass was in flight; nothing applied.
    Stale,
    /// Nothing applied; prior decoration is untouched.
    Failed(FilterError),
}

impl PassOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PassOutcome::Applied(_))
    }

    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Applied(report) => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FilterError> {
        match self {
            PassOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

struct Inner<D: HostDocument> {
    config: FilterConfig,
    document: Arc<Mutex<D>>,
    store: Arc<FilterStore>,
    oracle: Arc<dyn AssignmentOracle>,
    fingerprinter: Arc<dyn Fingerprinter>,
    resolver: AssignmentResolver,
    decorator: VisibilityDecorator<D>,
    debouncer: Debouncer,
    watched_root: Mutex<Option<NodeId>>,
}

/// Builds a `CallVisibilityFilter`. The store is created here and shared
/// with every component; nothing looks it up later.
pub struct FilterBuilder<D: HostDocument> {
    document: Arc<Mutex<D>>,
    oracle: Arc<dyn AssignmentOracle>,
    fingerprinter: Arc<dyn Fingerprinter>,
    config: FilterConfig,
}

impl<D> FilterBuilder<D>
where
    D: HostDocument + Send + 'static,
{
    pub fn config(mut self, config: FilterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn build(self) -> CallVisibilityFilter<D> {
        let store = Arc::new(FilterStore::new(self.config.cache_ttl()));
        let resolver = AssignmentResolver::new(
            Arc::clone(&self.oracle),
            Arc::clone(&self.fingerprinter),
            Arc::clone(&store),
        );
        let decorator = VisibilityDecorator::new(
            Arc::clone(&self.document),
            self.config.selectors.clone(),
            self.config.labels.clone(),
        );
        let debouncer = Debouncer::new(self.config.debounce_window());

        log::debug!(
            "FILTER_BUILT cache_ttl_secs={} debounce_ms={}",
            self.config.cache_ttl_secs,
            self.config.debounce_ms
        );

        CallVisibilityFilter {
            inner: Arc::new(Inner {
                config: self.config,
                document: self.document,
                store,
                oracle: self.oracle,
                fingerprinter: self.fingerprinter,
                resolver,
                decorator,
                debouncer,
                watched_root: Mutex::new(None),
            }),
        }
    }
}

/// Handle to the filter. Clones share the same state.
pub struct CallVisibilityFilter<D: HostDocument> {
    inner: Arc<Inner<D>>,
}

impl<D: HostDocument> Clone for CallVisibilityFilter<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> CallVisibilityFilter<D>
where
    D: HostDocument + Send + 'static,
{
    pub fn builder(document: Arc<Mutex<D>>, oracle: Arc<dyn AssignmentOracle>) -> FilterBuilder<D> {
        FilterBuilder {
            document,
            oracle,
            fingerprinter: Arc::new(Sha256Fingerprinter),
            config: FilterConfig::default(),
        }
    }

    /// Filter backed by the HTTP oracle at `config.api_base_url`.
    pub fn http(document: Arc<Mutex<D>>, config: FilterConfig) -> Self {
        let oracle = Arc::new(HttpAssignmentOracle::new(&config));
        Self::builder(document, oracle).config(config).build()
    }

    pub fn config(&self) -> &FilterConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<FilterStore> {
        &self.inner.store
    }

    pub fn decorator(&self) -> &VisibilityDecorator<D> {
        &self.inner.decorator
    }

    pub fn document(&self) -> &Arc<Mutex<D>> {
        &self.inner.document
    }

    pub fn deal_id(&self) -> Option<String> {
        self.inner.store.deal_id()
    }

    pub fn last_error(&self) -> Option<FilterError> {
        self.inner.store.last_error()
    }

    /// Switch deal context.
    ///
    /// Leaving a deal always restores the page, even after a failed pass.
    /// Entering one runs a pass immediately and returns its outcome. Binding
    /// the already bound deal is a no-op and returns `None`.
    pub async fn bind_deal(&self, deal_id: Option<String>) -> Option<PassOutcome> {
        let deal_id = deal_id
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let previous = self.inner.store.deal_id();

        if !self.inner.store.bind_deal(deal_id.clone()) {
            return None;
        }

        self.disarm();
        let restored = self.inner.decorator.show_all();

        let Some(deal) = deal_id else {
            log_info!(
                LogContext::unbound(),
                "DEAL_UNBOUND",
                previous = previous,
                restored = restored
            );
            return None;
        };

        let root = {
            let doc = self.inner.document.lock();
            doc.feed_container(&self.inner.config.selectors.feed_container)
        };
        *self.inner.watched_root.lock() = root;

        log_info!(
            LogContext::new(&deal),
            "DEAL_BOUND",
            previous = previous,
            feed_rendered = root.is_some()
        );

        Some(self.check_and_hide_calls().await)
    }

    /// Unbind and restore the page. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.inner.store.bind_deal(None);
        self.disarm();
        let restored = self.inner.decorator.show_all();
        log::info!("FILTER_TEARDOWN restored={}", restored);
    }

    /// Run one extract -> resolve -> decorate pass for the bound deal.
    pub async fn check_and_hide_calls(&self) -> PassOutcome {
        let inner = &self.inner;
        let Some(deal) = inner.store.deal_id() else {
            log::debug!("PASS_SKIPPED reason=no_deal");
            return PassOutcome::Skipped(SkipReason::NoDeal);
        };

        let ctx = PassContext::new(&deal, inner.store.epoch());
        let log_ctx = ctx.log_context();

        let calls = {
            let doc = inner.document.lock();
            extract_calls(&*doc, &inner.config.selectors, &log_ctx)
        };
        if calls.is_empty() {
            log::debug!("{} PASS_SKIPPED reason=no_calls", log_ctx);
            return PassOutcome::Skipped(SkipReason::NoCalls);
        }

        log_info!(log_ctx, "PASS_START", calls = calls.len());

        let resolution = match inner.resolver.resolve(&ctx, &calls).await {
            Ok(resolution) => resolution,
            Err(FilterError::StalePass) => return PassOutcome::Stale,
            Err(e) => {
                log::error!("{} PASS_FAILED error={}", log_ctx, e);
                inner.store.record_error(e.clone());
                return PassOutcome::Failed(e);
            }
        };

        if !inner.store.is_current(&ctx) {
            log_warn!(log_ctx, "PASS_STALE_DISCARDED", stage = "decorate");
            return PassOutcome::Stale;
        }

        let hide_suppressed = inner.store.show_hidden_calls();
        let hidden = if hide_suppressed {
            0
        } else {
            inner.decorator.hide(&resolution.not_owned)
        };
        let shown = inner.decorator.show(&resolution.owned);
        inner.store.clear_error();

        log::info!(
            "{} PASS_COMPLETE calls={} hidden={} shown={} suppressed={} elapsed_ms={}",
            log_ctx,
            calls.len(),
            hidden,
            shown,
            hide_suppressed,
            ctx.elapsed_ms()
        );

        PassOutcome::Applied(PassReport {
            pass_id: ctx.pass_id,
            calls: calls.len(),
            owned: resolution.owned,
            not_owned: resolution.not_owned,
            hidden,
            shown,
            hide_suppressed,
        })
    }

    /// Restore every decorated call and clear the cache.
    pub fn show_all_calls(&self) -> usize {
        let dropped = self.inner.store.invalidate();
        let restored = self.inner.decorator.show_all();
        log::info!(
            "SHOW_ALL restored={} cache_dropped={}",
            restored,
            dropped
        );
        restored
    }

    /// Inspect a batch of mutation records and schedule a debounced pass if a
    /// call entry was added under the feed. Returns whether one was scheduled.
    pub fn handle_mutations(&self, records: &[MutationRecord]) -> bool {
        if self.inner.store.deal_id().is_none() {
            return false;
        }

        let qualifies = {
            let doc = self.inner.document.lock();
            let Some(root) = self.watch_root(&*doc) else {
                log::debug!("MUTATIONS_IGNORED reason=feed_not_rendered");
                return false;
            };
            let call_entry = &self.inner.config.selectors.call_entry;
            records.iter().any(|record| {
                record
                    .added
                    .iter()
                    .any(|&node| doc.contains(root, node) && doc.subtree_has_class(node, call_entry))
            })
        };

        if qualifies {
            log::debug!("PASS_SCHEDULED records={}", records.len());
            let filter = self.clone();
            self.inner.debouncer.schedule(move || async move {
                filter.check_and_hide_calls().await;
            });
        }
        qualifies
    }

    pub fn has_pending_pass(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Flip the show-hidden toggle. Turning it on reveals everything; turning
    /// it off runs a pass right away and returns its outcome.
    pub async fn set_show_hidden_calls(&self, show: bool) -> Option<PassOutcome> {
        if !self.inner.store.set_show_hidden_calls(show) {
            return None;
        }
        log::info!("SHOW_HIDDEN_TOGGLED show={}", show);

        if show {
            self.inner.decorator.show_all();
            None
        } else {
            Some(self.check_and_hide_calls().await)
        }
    }

    /// Dispatch a click on an injected show/hide control.
    pub fn handle_control_click(&self, node: NodeId) -> Option<(String, ControlAction)> {
        self.inner.decorator.handle_control_click(node)
    }

    /// Assign a DOM-visible call to the bound deal. On success the cache is
    /// updated and the call revealed without waiting for the next pass.
    pub async fn assign_call(
        &self,
        call_id: &str,
        contact_id: &str,
    ) -> Result<Assignment, FilterError> {
        let inner = &self.inner;
        let deal = inner.store.deal_id().ok_or(FilterError::NoDeal)?;
        let log_ctx = LogContext::new(&deal).with_call(call_id);

        let (call, fingerprint) = self.fingerprint_call(call_id).await?;
        let request = AssignByHashRequest::for_call(
            &fingerprint,
            contact_id,
            &deal,
            &call,
            MANUAL_ASSIGNMENT_REASON,
        )?;

        if let Err(e) = inner.oracle.assign_by_hash(&request).await {
            log::error!("{} ASSIGN_FAILED error={}", log_ctx, e);
            return Err(e.into());
        }

        let assignment = Assignment::new(Some(&deal), contact_id);
        if inner.store.deal_id().as_deref() == Some(deal.as_str()) {
            // Also turns any pass still waiting on the oracle stale.
            inner
                .store
                .record_assignment(fingerprint.clone(), Some(assignment.clone()));
            inner.decorator.show(&HashSet::from([call_id.to_string()]));
        }

        log_info!(log_ctx, "CALL_ASSIGNED", fingerprint = fingerprint.as_str());
        Ok(assignment)
    }

    /// Move a DOM-visible call to any deal, then run a pass against the
    /// bound deal so the feed reflects it.
    pub async fn assign_call_to_deal(
        &self,
        call_id: &str,
        deal_id: &str,
    ) -> Result<PassOutcome, FilterError> {
        self.reassign(call_id, Some(deal_id)).await
    }

    /// Detach a DOM-visible call from its deal, then run a pass.
    pub async fn unassign_call(&self, call_id: &str) -> Result<PassOutcome, FilterError> {
        self.reassign(call_id, None).await
    }

    /// DOM-visible calls that no deal claims, for the contact whose card is
    /// open.
    pub async fn unassigned_calls(
        &self,
        contact_id: &str,
    ) -> Result<Vec<UnassignedCall>, FilterError> {
        let calls = {
            let doc = self.inner.document.lock();
            extract_calls(&*doc, &self.inner.config.selectors, &LogContext::unbound())
        };
        self.inner.resolver.unassigned_calls(&calls, contact_id).await
    }

    /// The backend's own list of the contact's unassigned calls, including
    /// ones the feed has not rendered. `page` starts at 1.
    pub async fn unassigned_calls_page(
        &self,
        contact_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<UnassignedCallsPage, FilterError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_UNASSIGNED_PAGE_LIMIT);
        Ok(self
            .inner
            .oracle
            .unassigned_calls_page(contact_id, page, limit)
            .await?)
    }

    /// Route the contact's next call to the bound deal.
    pub async fn activate_attach_next(
        &self,
        contact_id: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<AttachNextActivation, FilterError> {
        let deal = self.inner.store.deal_id().ok_or(FilterError::NoDeal)?;
        let request = AttachNextRequest {
            contact_id: contact_id.to_string(),
            deal_id: deal.clone(),
            ttl_seconds: ttl_seconds.unwrap_or(DEFAULT_ATTACH_NEXT_TTL_SECS),
        };
        let activation = self.inner.oracle.activate_attach_next(&request).await?;
        log::info!(
            "{} ATTACH_NEXT_ACTIVATED contact={} expires_at={}",
            LogContext::new(&deal),
            contact_id,
            activation.expires_at
        );
        Ok(activation)
    }

    pub async fn cancel_attach_next(
        &self,
        contact_id: &str,
    ) -> Result<CancelAttachNextResponse, FilterError> {
        Ok(self.inner.oracle.cancel_attach_next(contact_id).await?)
    }

    pub async fn attach_next_status(&self, contact_id: &str) -> Result<AttachNextStatus, FilterError> {
        Ok(self.inner.oracle.attach_next_status(contact_id).await?)
    }

    async fn reassign(
        &self,
        call_id: &str,
        deal_id: Option<&str>,
    ) -> Result<PassOutcome, FilterError> {
        let inner = &self.inner;
        let log_ctx = match inner.store.deal_id() {
            Some(deal) => LogContext::new(&deal),
            None => LogContext::unbound(),
        }
        .with_call(call_id);

        let (_, fingerprint) = self.fingerprint_call(call_id).await?;
        let result = match deal_id {
            Some(deal) => inner.oracle.assign_call_to_deal(fingerprint.as_str(), deal).await,
            None => inner.oracle.unassign_call(fingerprint.as_str()).await,
        };
        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                log::error!("{} REASSIGN_FAILED error={}", log_ctx, e);
                return Err(e.into());
            }
        };

        // The next lookup must ask the oracle; in-flight passes go stale.
        inner.store.forget(&fingerprint);
        log_info!(
            log_ctx,
            "CALL_REASSIGNED",
            fingerprint = fingerprint.as_str(),
            deal = stored.deal_id
        );

        Ok(self.check_and_hide_calls().await)
    }

    async fn fingerprint_call(
        &self,
        call_id: &str,
    ) -> Result<(CallRecord, Fingerprint), FilterError> {
        let call = self
            .find_call(call_id)
            .ok_or_else(|| FilterError::CallNotFound(call_id.to_string()))?;
        let link = call
            .permanent_link
            .as_deref()
            .ok_or_else(|| FilterError::MissingLink(call_id.to_string()))?;
        let fingerprint = self.inner.fingerprinter.fingerprint(link).await?;
        Ok((call, fingerprint))
    }

    fn find_call(&self, call_id: &str) -> Option<CallRecord> {
        let doc = self.inner.document.lock();
        let element = doc.find_call_element(&self.inner.config.selectors.call_entry, call_id)?;
        extract_call(&*doc, &self.inner.config.selectors, element)
    }

    /// The feed container under watch. Re-resolved when it was not rendered
    /// at bind time or has since been replaced.
    fn watch_root(&self, doc: &D) -> Option<NodeId> {
        let mut watched = self.inner.watched_root.lock();
        if let Some(root) = *watched {
            if doc.is_connected(root) {
                return Some(root);
            }
        }
        *watched = doc.feed_container(&self.inner.config.selectors.feed_container);
        *watched
    }

    fn disarm(&self) {
        self.inner.debouncer.cancel();
        *self.inner.watched_root.lock() = None;
    }
}
