//! Host context polling.
//!
//! The CRM page gives no navigation events, so the current card is polled.
//! Each tick compares a small identity tuple with the previous one and only
//! rebinds the filter when it changed. Polling stops after a fixed number of
//! ticks or when cancelled.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::dom::HostDocument;

use super::filter::CallVisibilityFilter;

/// Widget areas where filtering is active.
pub const ALLOWED_AREAS: [&str; 2] = ["contacts_card", "leads_card"];

/// Type of the card the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contact,
    Lead,
}

/// What the host page is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct HostContext {
    /// Widget area; unknown areas are treated as allowed.
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub entity_kind: Option<EntityKind>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

impl HostContext {
    pub fn lead(id: &str) -> Self {
        Self {
            area: Some("leads_card".to_string()),
            entity_kind: Some(EntityKind::Lead),
            entity_id: Some(id.to_string()),
        }
    }

    pub fn contact(id: &str) -> Self {
        Self {
            area: Some("contacts_card".to_string()),
            entity_kind: Some(EntityKind::Contact),
            entity_id: Some(id.to_string()),
        }
    }

    pub fn is_allowed_area(&self) -> bool {
        self.area
            .as_deref()
            .map(|area| ALLOWED_AREAS.contains(&area))
            .unwrap_or(true)
    }

    /// The deal to bind, if the page is a deal card in an allowed area.
    pub fn deal_id(&self) -> Option<String> {
        if !self.is_allowed_area() || self.entity_kind != Some(EntityKind::Lead) {
            return None;
        }
        self.entity_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// Reads the current host context. `None` when the host API is unavailable.
pub trait HostContextSource: Send + Sync {
    fn current(&self) -> Option<HostContext>;
}

/// Poll `source` every `interval` and rebind `filter` when the context
/// changes. Returns the number of ticks performed.
pub async fn context_poll_loop<D>(
    filter: CallVisibilityFilter<D>,
    source: Arc<dyn HostContextSource>,
    interval: Duration,
    max_iterations: u32,
    cancel_token: CancellationToken,
) -> u32
where
    D: HostDocument + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut previous: Option<HostContext> = None;
    let mut iterations = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if iterations >= max_iterations {
                    log::warn!("CONTEXT_POLL_LIMIT iterations={}", iterations);
                    break;
                }
                iterations += 1;

                let current = source.current().unwrap_or_default();
                if previous.as_ref() == Some(&current) {
                    continue;
                }

                let deal_id = current.deal_id();
                log::info!(
                    "CONTEXT_CHANGED area={:?} entity={:?} deal={:?} tick={}",
                    current.area,
                    current.entity_kind,
                    deal_id,
                    iterations
                );
                previous = Some(current);

                if let Some(outcome) = filter.bind_deal(deal_id).await {
                    log::debug!("CONTEXT_BIND_PASS outcome={:?}", outcome);
                }
            }
            _ = cancel_token.cancelled() => {
                log::info!("CONTEXT_POLL_STOPPED iterations={}", iterations);
                break;
            }
        }
    }

    iterations
}

/// Owns the polling task.
pub struct ContextPoller {
    handle: Option<JoinHandle<u32>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for ContextPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPoller {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Start polling with the filter's configured interval and tick limit.
    pub fn start<D>(
        &mut self,
        filter: CallVisibilityFilter<D>,
        source: Arc<dyn HostContextSource>,
    ) -> Result<()>
    where
        D: HostDocument + Send + 'static,
    {
        if self.is_running() {
            bail!("context polling already active");
        }

        let interval = filter.config().context_poll_interval();
        let max_iterations = filter.config().context_poll_max_iterations;
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(context_poll_loop(
            filter,
            source,
            interval,
            max_iterations,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stop polling. Returns the number of ticks the loop performed.
    pub async fn stop(&mut self) -> Result<u32> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => handle.await.context("context poll task failed to join"),
            None => Ok(0),
        }
    }
}
