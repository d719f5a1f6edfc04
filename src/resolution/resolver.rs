//! Assignment resolver.
//!
//! One resolution pass:
//! 1. Split calls by presence of a permanent link (link-less calls are not owned)
//! 2. Fingerprint unique links concurrently
//! 3. Partition fingerprints against the cache
//! 4. One batched oracle lookup for everything pending
//! 5. Merge returned answers into the cache (missing keys stay pending)
//! 6. Classify each call against the bound deal

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::FilterError;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::logging::structured::LogContext;
use crate::models::{is_owned_by, is_unassigned, Assignment, CallRecord};
use crate::oracle::AssignmentOracle;
use crate::store::FilterStore;

use super::context::PassContext;

/// Ownership of the calls seen by one pass, by host call id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub owned: HashSet<String>,
    pub not_owned: HashSet<String>,
    /// Calls whose fingerprint failed. They are neither hidden nor shown.
    pub unresolved: HashSet<String>,
}

/// A DOM-visible call that no deal claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignedCall {
    pub call: CallRecord,
    pub fingerprint: Fingerprint,
    /// `None` when the oracle does not know the call yet.
    pub assignment: Option<Assignment>,
    /// The assignment's contact, or the contact the lookup was made for.
    pub contact_id: String,
}

/// Answers gathered for one batch of calls.
#[derive(Debug, Default)]
struct Lookup {
    /// Fingerprint per unique permanent link.
    fingerprints: HashMap<String, Fingerprint>,
    /// Cached and freshly fetched answers.
    answers: HashMap<Fingerprint, Option<Assignment>>,
}

impl Lookup {
    fn fingerprint_of(&self, call: &CallRecord) -> Option<&Fingerprint> {
        call.permanent_link
            .as_ref()
            .and_then(|link| self.fingerprints.get(link))
    }

    fn assignment_of(&self, fingerprint: &Fingerprint) -> Option<&Assignment> {
        self.answers.get(fingerprint).and_then(|a| a.as_ref())
    }
}

pub struct AssignmentResolver {
    oracle: Arc<dyn AssignmentOracle>,
    fingerprinter: Arc<dyn Fingerprinter>,
    store: Arc<FilterStore>,
}

impl AssignmentResolver {
    pub fn new(
        oracle: Arc<dyn AssignmentOracle>,
        fingerprinter: Arc<dyn Fingerprinter>,
        store: Arc<FilterStore>,
    ) -> Self {
        Self {
            oracle,
            fingerprinter,
            store,
        }
    }

    pub fn store(&self) -> &Arc<FilterStore> {
        &self.store
    }

    /// Classify `calls` as owned or not owned by the pass's deal.
    ///
    /// Fails when the oracle fails, or with `FilterError::StalePass` when the
    /// deal context changed while the lookup was in flight. Nothing is merged
    /// into the cache in either case.
    pub async fn resolve(
        &self,
        ctx: &PassContext,
        calls: &[CallRecord],
    ) -> Result<Resolution, FilterError> {
        let log_ctx = ctx.log_context();
        let mut resolution = Resolution::default();

        // [1] LINK-LESS CALLS
        let mut with_link = Vec::with_capacity(calls.len());
        for call in calls {
            if call.has_link() {
                with_link.push(call);
            } else {
                log::debug!("{} CALL_WITHOUT_LINK policy=hide", log_ctx.with_call(&call.id));
                resolution.not_owned.insert(call.id.clone());
            }
        }

        // [2..5] FINGERPRINT, CACHE, ORACLE, MERGE
        let lookup = self.lookup(&log_ctx, ctx.epoch, &with_link).await?;

        // [6] CLASSIFY
        for call in with_link {
            let Some(fp) = lookup.fingerprint_of(call) else {
                resolution.unresolved.insert(call.id.clone());
                continue;
            };
            if is_owned_by(lookup.assignment_of(fp), &ctx.deal_id) {
                resolution.owned.insert(call.id.clone());
            } else {
                resolution.not_owned.insert(call.id.clone());
            }
        }

        log::info!(
            "{} RESOLUTION_COMPLETE owned={} not_owned={} unresolved={}",
            log_ctx,
            resolution.owned.len(),
            resolution.not_owned.len(),
            resolution.unresolved.len()
        );

        Ok(resolution)
    }

    /// Calls that no deal claims: the assignment is missing or its deal is
    /// null. Link-less calls and calls whose fingerprint failed are skipped.
    ///
    /// `contact_id` is the contact whose card is open; it is reported for
    /// calls whose assignment names no contact.
    pub async fn unassigned_calls(
        &self,
        calls: &[CallRecord],
        contact_id: &str,
    ) -> Result<Vec<UnassignedCall>, FilterError> {
        let log_ctx = match self.store.deal_id() {
            Some(deal) => LogContext::new(&deal),
            None => LogContext::unbound(),
        };
        let with_link: Vec<&CallRecord> = calls.iter().filter(|c| c.has_link()).collect();
        let lookup = self.lookup(&log_ctx, self.store.epoch(), &with_link).await?;

        let unassigned: Vec<UnassignedCall> = with_link
            .into_iter()
            .filter_map(|call| {
                let fp = lookup.fingerprint_of(call)?;
                let assignment = lookup.assignment_of(fp);
                is_unassigned(assignment).then(|| UnassignedCall {
                    call: call.clone(),
                    fingerprint: fp.clone(),
                    assignment: assignment.cloned(),
                    contact_id: assignment
                        .map(|a| a.contact_id.as_str())
                        .filter(|c| !c.is_empty())
                        .unwrap_or(contact_id)
                        .to_string(),
                })
            })
            .collect();

        log::info!(
            "{} UNASSIGNED_CALLS contact={} total={} unassigned={}",
            log_ctx,
            contact_id,
            calls.len(),
            unassigned.len()
        );

        Ok(unassigned)
    }

    async fn lookup(
        &self,
        log_ctx: &LogContext,
        epoch: u64,
        calls: &[&CallRecord],
    ) -> Result<Lookup, FilterError> {
        let mut lookup = Lookup {
            fingerprints: self.fingerprint_links(log_ctx, calls).await,
            answers: HashMap::new(),
        };

        let unique: Vec<Fingerprint> = lookup
            .fingerprints
            .values()
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let pending = {
            let cache = self.store.cache();
            let now = Instant::now();
            let partition = cache.partition_at(&unique, now);
            for fp in &partition.cached {
                if let Some(entry) = cache.get_fresh_at(fp, now) {
                    lookup.answers.insert(fp.clone(), entry.assignment.clone());
                }
            }
            log::debug!(
                "{} CACHE_ANALYSIS cached={} pending={}",
                log_ctx,
                partition.cached.len(),
                partition.pending.len()
            );
            partition.pending
        };

        if pending.is_empty() {
            log::debug!("{} ORACLE_SKIPPED reason=all_cached", log_ctx);
            return Ok(lookup);
        }

        log::debug!("{} ORACLE_REQUEST count={}", log_ctx, pending.len());
        let fetched = match self.oracle.batch_deal_assignment(&pending).await {
            Ok(fetched) => fetched,
            Err(e) => {
                log::error!("{} ORACLE_FAILED error={}", log_ctx, e);
                return Err(FilterError::Oracle(e));
            }
        };

        let requested: HashSet<&Fingerprint> = pending.iter().collect();
        let mut merged = 0;
        {
            // Local cache writes advance the epoch under this lock.
            let mut cache = self.store.cache();
            if self.store.epoch() != epoch {
                log::warn!("{} PASS_STALE_DISCARDED stage=merge", log_ctx);
                return Err(FilterError::StalePass);
            }
            for (fp, assignment) in fetched {
                if !requested.contains(&fp) {
                    continue;
                }
                cache.insert(fp.clone(), assignment.clone());
                lookup.answers.insert(fp, assignment);
                merged += 1;
            }
        }

        log::debug!(
            "{} ORACLE_MERGED requested={} returned={}",
            log_ctx,
            pending.len(),
            merged
        );

        Ok(lookup)
    }

    /// Fingerprint every distinct link once, concurrently.
    ///
    /// Links whose fingerprint fails are logged and left out of the map.
    async fn fingerprint_links(
        &self,
        log_ctx: &LogContext,
        calls: &[&CallRecord],
    ) -> HashMap<String, Fingerprint> {
        let links: HashSet<&str> = calls
            .iter()
            .filter_map(|c| c.permanent_link.as_deref())
            .collect();

        let mut tasks = JoinSet::new();
        for link in links {
            let fingerprinter = Arc::clone(&self.fingerprinter);
            let link = link.to_string();
            tasks.spawn(async move {
                let result = fingerprinter.fingerprint(&link).await;
                (link, result)
            });
        }

        let mut fingerprints = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((link, Ok(fp))) => {
                    fingerprints.insert(link, fp);
                }
                Ok((link, Err(e))) => {
                    log::warn!("{} FINGERPRINT_FAILED link={} error={}", log_ctx, link, e);
                }
                Err(e) => {
                    log::error!("{} FINGERPRINT_TASK_FAILED error={}", log_ctx, e);
                }
            }
        }
        fingerprints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FingerprintError, OracleError};
    use crate::fingerprint::Sha256Fingerprinter;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeOracle {
        answers: HashMap<Fingerprint, Option<Assignment>>,
        requests: Mutex<Vec<Vec<Fingerprint>>>,
        fail: bool,
    }

    impl FakeOracle {
        fn with(mut self, link: &str, assignment: Option<Assignment>) -> Self {
            self.answers.insert(Fingerprint::of_link(link), assignment);
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl AssignmentOracle for FakeOracle {
        async fn batch_deal_assignment(
            &self,
            fingerprints: &[Fingerprint],
        ) -> Result<HashMap<Fingerprint, Option<Assignment>>, OracleError> {
            self.requests.lock().push(fingerprints.to_vec());
            if self.fail {
                return Err(OracleError::Status(500));
            }
            Ok(fingerprints
                .iter()
                .filter_map(|fp| self.answers.get(fp).map(|a| (fp.clone(), a.clone())))
                .collect())
        }
    }

    struct CountingFingerprinter {
        calls: Mutex<Vec<String>>,
        reject: &'static str,
    }

    #[async_trait]
    impl Fingerprinter for CountingFingerprinter {
        async fn fingerprint(&self, link: &str) -> Result<Fingerprint, FingerprintError> {
            self.calls.lock().push(link.to_string());
            if link == self.reject {
                return Err(FingerprintError::Digest("boom".to_string()));
            }
            Ok(Fingerprint::of_link(link))
        }
    }

    fn setup(oracle: FakeOracle) -> (AssignmentResolver, Arc<FakeOracle>, Arc<FilterStore>) {
        let oracle = Arc::new(oracle);
        let store = Arc::new(FilterStore::new(Duration::from_secs(300)));
        store.bind_deal(Some("42".to_string()));
        let resolver = AssignmentResolver::new(
            oracle.clone(),
            Arc::new(Sha256Fingerprinter),
            store.clone(),
        );
        (resolver, oracle, store)
    }

    fn ids(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_three_call_scenario() {
        let oracle = FakeOracle::default()
            .with("l1", Some(Assignment::new(Some("42"), "7")))
            .with("l2", Some(Assignment::new(Some("43"), "7")));
        let (resolver, oracle, store) = setup(oracle);

        let calls = vec![
            CallRecord::new("call-1").with_link("l1"),
            CallRecord::new("call-2").with_link("l2"),
            CallRecord::new("call-3"),
        ];
        let ctx = PassContext::new("42", store.epoch());
        let resolution = resolver.resolve(&ctx, &calls).await.unwrap();

        assert_eq!(resolution.owned, ids(&["call-1"]));
        assert_eq!(resolution.not_owned, ids(&["call-2", "call-3"]));
        assert!(resolution.unresolved.is_empty());
        assert_eq!(oracle.request_count(), 1);
        assert_eq!(oracle.requests.lock()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_ownership_predicate_variants() {
        let oracle = FakeOracle::default()
            .with("same", Some(Assignment::new(Some("42"), "7")))
            .with("other", Some(Assignment::new(Some("43"), "7")))
            .with("null-deal", Some(Assignment::new(None, "7")))
            .with("null", None);
        let (resolver, _, store) = setup(oracle);

        let calls = vec![
            CallRecord::new("a").with_link("same"),
            CallRecord::new("b").with_link("other"),
            CallRecord::new("c").with_link("null-deal"),
            CallRecord::new("d").with_link("null"),
            CallRecord::new("e").with_link("unknown"),
        ];
        let ctx = PassContext::new("42", store.epoch());
        let resolution = resolver.resolve(&ctx, &calls).await.unwrap();

        assert_eq!(resolution.owned, ids(&["a"]));
        assert_eq!(resolution.not_owned, ids(&["b", "c", "d", "e"]));
    }

    #[tokio::test]
    async fn test_second_pass_hits_cache() {
        let oracle = FakeOracle::default()
            .with("l1", Some(Assignment::new(Some("42"), "7")))
            .with("l2", None);
        let (resolver, oracle, store) = setup(oracle);
        let calls = vec![
            CallRecord::new("call-1").with_link("l1"),
            CallRecord::new("call-2").with_link("l2"),
        ];

        let ctx = PassContext::new("42", store.epoch());
        let first = resolver.resolve(&ctx, &calls).await.unwrap();
        let second = resolver.resolve(&ctx, &calls).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(oracle.request_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_keys_are_not_cached() {
        let oracle = FakeOracle::default().with("known", None);
        let (resolver, oracle, store) = setup(oracle);
        let calls = vec![
            CallRecord::new("a").with_link("known"),
            CallRecord::new("b").with_link("unknown"),
        ];

        let ctx = PassContext::new("42", store.epoch());
        resolver.resolve(&ctx, &calls).await.unwrap();
        assert_eq!(store.cache().len(), 1);

        resolver.resolve(&ctx, &calls).await.unwrap();
        let requests = oracle.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], vec![Fingerprint::of_link("unknown")]);
    }

    #[tokio::test]
    async fn test_duplicate_links_fingerprinted_once() {
        let fingerprinter = Arc::new(CountingFingerprinter {
            calls: Mutex::new(Vec::new()),
            reject: "",
        });
        let oracle = Arc::new(FakeOracle::default().with("shared", None));
        let store = Arc::new(FilterStore::new(Duration::from_secs(300)));
        store.bind_deal(Some("42".to_string()));
        let resolver = AssignmentResolver::new(oracle.clone(), fingerprinter.clone(), store.clone());

        let calls: Vec<CallRecord> = (0..5)
            .map(|i| CallRecord::new(&format!("call-{}", i)).with_link("shared"))
            .collect();
        let ctx = PassContext::new("42", store.epoch());
        let resolution = resolver.resolve(&ctx, &calls).await.unwrap();

        assert_eq!(fingerprinter.calls.lock().len(), 1);
        assert_eq!(oracle.requests.lock()[0].len(), 1);
        assert_eq!(resolution.not_owned.len(), 5);
    }

    #[tokio::test]
    async fn test_fingerprint_failure_excludes_call() {
        let fingerprinter = Arc::new(CountingFingerprinter {
            calls: Mutex::new(Vec::new()),
            reject: "bad",
        });
        let oracle = Arc::new(FakeOracle::default().with("good", None));
        let store = Arc::new(FilterStore::new(Duration::from_secs(300)));
        store.bind_deal(Some("42".to_string()));
        let resolver = AssignmentResolver::new(oracle.clone(), fingerprinter, store.clone());

        let calls = vec![
            CallRecord::new("a").with_link("good"),
            CallRecord::new("b").with_link("bad"),
        ];
        let ctx = PassContext::new("42", store.epoch());
        let resolution = resolver.resolve(&ctx, &calls).await.unwrap();

        assert_eq!(resolution.not_owned, ids(&["a"]));
        assert_eq!(resolution.unresolved, ids(&["b"]));
        assert_eq!(oracle.requests.lock()[0], vec![Fingerprint::of_link("good")]);
    }

    #[tokio::test]
    async fn test_linkless_only_skips_oracle() {
        let (resolver, oracle, store) = setup(FakeOracle::default());
        let calls = vec![CallRecord::new("a"), CallRecord::new("b")];

        let ctx = PassContext::new("42", store.epoch());
        let resolution = resolver.resolve(&ctx, &calls).await.unwrap();

        assert_eq!(resolution.not_owned, ids(&["a", "b"]));
        assert_eq!(oracle.request_count(), 0);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_reported() {
        let oracle = FakeOracle {
            fail: true,
            ..FakeOracle::default()
        };
        let (resolver, _, store) = setup(oracle);
        let calls = vec![CallRecord::new("a").with_link("l1")];

        let ctx = PassContext::new("42", store.epoch());
        let err = resolver.resolve(&ctx, &calls).await.unwrap_err();

        assert_eq!(err, FilterError::Oracle(OracleError::Status(500)));
        assert!(store.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stale_pass_does_not_merge() {
        let oracle = FakeOracle::default().with("l1", None);
        let (resolver, _, store) = setup(oracle);
        let calls = vec![CallRecord::new("a").with_link("l1")];

        let ctx = PassContext::new("42", store.epoch());
        store.bind_deal(Some("43".to_string()));
        let err = resolver.resolve(&ctx, &calls).await.unwrap_err();

        assert_eq!(err, FilterError::StalePass);
        assert!(store.cache().is_empty());
    }

    #[tokio::test]
    async fn test_unassigned_calls_inverted_predicate() {
        let oracle = FakeOracle::default()
            .with("owned", Some(Assignment::new(Some("42"), "7")))
            .with("null-deal", Some(Assignment::new(None, "7")))
            .with("null", None);
        let (resolver, _, _) = setup(oracle);

        let calls = vec![
            CallRecord::new("a").with_link("owned"),
            CallRecord::new("b").with_link("null-deal"),
            CallRecord::new("c").with_link("null"),
            CallRecord::new("d").with_link("unknown"),
            CallRecord::new("e"),
        ];
        let unassigned = resolver.unassigned_calls(&calls, "9").await.unwrap();
        let found: HashSet<String> = unassigned.iter().map(|u| u.call.id.clone()).collect();

        assert_eq!(found, ids(&["b", "c", "d"]));
        let b = unassigned.iter().find(|u| u.call.id == "b").unwrap();
        assert_eq!(b.fingerprint, Fingerprint::of_link("null-deal"));
        assert_eq!(b.assignment, Some(Assignment::new(None, "7")));
    }

    #[tokio::test]
    async fn test_unassigned_calls_contact_fallback() {
        let oracle = FakeOracle::default()
            .with("claimed", Some(Assignment::new(None, "7")))
            .with("anonymous", Some(Assignment::new(None, "")))
            .with("null", None);
        let (resolver, _, _) = setup(oracle);

        let calls = vec![
            CallRecord::new("a").with_link("claimed"),
            CallRecord::new("b").with_link("anonymous"),
            CallRecord::new("c").with_link("null"),
        ];
        let unassigned = resolver.unassigned_calls(&calls, "9").await.unwrap();
        let contact_of = |id: &str| {
            unassigned
                .iter()
                .find(|u| u.call.id == id)
                .map(|u| u.contact_id.clone())
                .unwrap()
        };

        assert_eq!(contact_of("a"), "7");
        assert_eq!(contact_of("b"), "9");
        assert_eq!(contact_of("c"), "9");
    }

    /// Writes a local answer into the store while its lookup is in flight.
    struct InterleavingOracle {
        store: Arc<FilterStore>,
        local: Fingerprint,
    }

    #[async_trait]
    impl AssignmentOracle for InterleavingOracle {
        async fn batch_deal_assignment(
            &self,
            fingerprints: &[Fingerprint],
        ) -> Result<HashMap<Fingerprint, Option<Assignment>>, OracleError> {
            self.store
                .record_assignment(self.local.clone(), Some(Assignment::new(Some("42"), "7")));
            Ok(fingerprints.iter().map(|fp| (fp.clone(), None)).collect())
        }
    }

    #[tokio::test]
    async fn test_local_write_during_lookup_wins() {
        let store = Arc::new(FilterStore::new(Duration::from_secs(300)));
        store.bind_deal(Some("42".to_string()));
        let local = Fingerprint::of_link("l1");
        let oracle = Arc::new(InterleavingOracle {
            store: store.clone(),
            local: local.clone(),
        });
        let resolver = AssignmentResolver::new(oracle, Arc::new(Sha256Fingerprinter), store.clone());

        let calls = vec![CallRecord::new("a").with_link("l1")];
        let ctx = PassContext::new("42", store.epoch());
        let err = resolver.resolve(&ctx, &calls).await.unwrap_err();

        assert_eq!(err, FilterError::StalePass);
        let cache = store.cache();
        let entry = cache.get_fresh(&local).unwrap();
        assert_eq!(entry.assignment.as_ref().unwrap().deal_id.as_deref(), Some("42"));
    }
}
