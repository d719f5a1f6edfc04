//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use amocalls_core::config::Selectors;
use amocalls_core::dom::CallEntryBuilder;
use amocalls_core::error::{FingerprintError, OracleError};
use amocalls_core::oracle::{AssignByHashRequest, BackendCall};
use amocalls_core::{
    Assignment, AssignmentOracle, CallVisibilityFilter, FilterConfig, Fingerprint, Fingerprinter,
    HostDocument, MemoryDocument, MutationRecord, NodeId,
};

pub const DEAL: &str = "42";
pub const OTHER_DEAL: &str = "43";

pub fn link(id: &str) -> String {
    format!("https://records.example/calls/{}.mp3", id)
}

/// In-process oracle that records every batch it receives.
///
/// A batch answers from the state at the moment it arrives; a delay only
/// holds the response back. Writes update the answers for later batches.
#[derive(Default)]
pub struct RecordingOracle {
    answers: Mutex<HashMap<Fingerprint, Option<Assignment>>>,
    requests: Mutex<Vec<Vec<Fingerprint>>>,
    writes: Mutex<Vec<(String, Option<String>)>>,
    delays: Mutex<VecDeque<Duration>>,
    fail: AtomicBool,
}

impl RecordingOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer for `link`. `None` deal means a confirmed unassigned call.
    pub fn assign(&self, link: &str, deal: Option<&str>) {
        self.answers
            .lock()
            .insert(Fingerprint::of_link(link), Some(Assignment::new(deal, "7")));
    }

    /// Answer `null` for `link`.
    pub fn assign_null(&self, link: &str) {
        self.answers.lock().insert(Fingerprint::of_link(link), None);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay the next response by `delay`.
    pub fn delay_next(&self, delay: Duration) {
        self.delays.lock().push_back(delay);
    }

    pub fn requests(&self) -> Vec<Vec<Fingerprint>> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// `(amo_id, deal)` of every write, in order.
    pub fn writes(&self) -> Vec<(String, Option<String>)> {
        self.writes.lock().clone()
    }

    fn write(&self, amo_id: &str, deal: Option<&str>, contact: &str) -> BackendCall {
        self.writes
            .lock()
            .push((amo_id.to_string(), deal.map(str::to_string)));
        self.answers.lock().insert(
            Fingerprint::from_hex(amo_id),
            Some(Assignment::new(deal, contact)),
        );
        BackendCall {
            id: amo_id.to_string(),
            contact_id: Some(contact.to_string()),
            deal_id: deal.map(str::to_string),
            ..BackendCall::default()
        }
    }
}

#[async_trait]
impl AssignmentOracle for RecordingOracle {
    async fn batch_deal_assignment(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<HashMap<Fingerprint, Option<Assignment>>, OracleError> {
        self.requests.lock().push(fingerprints.to_vec());

        let answered: HashMap<Fingerprint, Option<Assignment>> = {
            let answers = self.answers.lock();
            fingerprints
                .iter()
                .filter_map(|fp| answers.get(fp).map(|a| (fp.clone(), a.clone())))
                .collect()
        };

        let delay = self.delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(OracleError::Status(502));
        }
        Ok(answered)
    }

    async fn assign_by_hash(&self, request: &AssignByHashRequest) -> Result<(), OracleError> {
        let deal = request.deal_id.to_string();
        self.write(&request.amo_id, Some(&deal), &request.contact_id.to_string());
        Ok(())
    }

    async fn assign_call_to_deal(
        &self,
        call_id: &str,
        deal_id: &str,
    ) -> Result<BackendCall, OracleError> {
        Ok(self.write(call_id, Some(deal_id), "7"))
    }

    async fn unassign_call(&self, call_id: &str) -> Result<BackendCall, OracleError> {
        Ok(self.write(call_id, None, "7"))
    }
}

/// SHA-256 fingerprinter that counts how often each link is digested.
#[derive(Default)]
pub struct CountingFingerprinter {
    calls: Mutex<Vec<String>>,
}

impl CountingFingerprinter {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fingerprinter for CountingFingerprinter {
    async fn fingerprint(&self, link: &str) -> Result<Fingerprint, FingerprintError> {
        self.calls.lock().push(link.to_string());
        Ok(Fingerprint::of_link(link))
    }
}

/// A document with an activity feed, a filter over it and the oracle behind it.
pub struct Harness {
    pub filter: CallVisibilityFilter<MemoryDocument>,
    pub oracle: Arc<RecordingOracle>,
    pub feed: NodeId,
    pub selectors: Selectors,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_fingerprinter(None)
    }

    pub fn with_fingerprinter(fingerprinter: Option<Arc<dyn Fingerprinter>>) -> Self {
        let config = FilterConfig::default();
        let selectors = config.selectors.clone();

        let mut doc = MemoryDocument::new();
        let root = doc.root();
        let feed = doc
            .append_element(root, "div", &selectors.feed_container)
            .expect("feed container");
        doc.take_mutations();

        let oracle = RecordingOracle::new();
        let mut builder =
            CallVisibilityFilter::builder(Arc::new(Mutex::new(doc)), oracle.clone()).config(config);
        if let Some(fingerprinter) = fingerprinter {
            builder = builder.fingerprinter(fingerprinter);
        }

        Self {
            filter: builder.build(),
            oracle,
            feed,
            selectors,
        }
    }

    /// Render a call entry with a permanent link and return its element.
    pub fn add_call(&self, id: &str) -> NodeId {
        self.add_entry(CallEntryBuilder::new(id).link(&link(id)))
    }

    /// Render a call entry whose link is `shared`.
    pub fn add_call_with_link(&self, id: &str, shared: &str) -> NodeId {
        self.add_entry(CallEntryBuilder::new(id).link(shared))
    }

    /// Render a call entry without a permanent link.
    pub fn add_linkless_call(&self, id: &str) -> NodeId {
        self.add_entry(CallEntryBuilder::new(id))
    }

    pub fn add_entry(&self, builder: CallEntryBuilder) -> NodeId {
        let mut doc = self.filter.document().lock();
        builder
            .append_to(&mut doc, &self.selectors, self.feed)
            .expect("append call entry")
    }

    pub fn remove(&self, node: NodeId) {
        self.filter.document().lock().remove(node).expect("remove node");
    }

    pub fn take_mutations(&self) -> Vec<MutationRecord> {
        self.filter.document().lock().take_mutations()
    }

    pub fn element(&self, id: &str) -> Option<NodeId> {
        self.filter
            .document()
            .lock()
            .find_call_element(&self.selectors.call_entry, id)
    }

    pub fn display(&self, node: NodeId) -> String {
        self.filter
            .document()
            .lock()
            .display(node)
            .unwrap_or_default()
    }

    pub fn placeholder_count(&self) -> usize {
        self.filter
            .document()
            .lock()
            .query_by_class(&self.selectors.placeholder)
            .len()
    }

    pub fn hidden(&self) -> HashSet<String> {
        self.filter.decorator().hidden_ids()
    }
}

pub fn ids(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
