//! Pass benchmarks.
//!
//! - `steady_state_pass`: every fingerprint cached, measures extraction,
//!   hashing, and decoration for feeds of increasing size.
//! - `fingerprint`: SHA-256 of one permanent link.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parking_lot::Mutex;

use amocalls_core::dom::CallEntryBuilder;
use amocalls_core::error::OracleError;
use amocalls_core::{
    Assignment, AssignmentOracle, CallVisibilityFilter, FilterConfig, Fingerprint, MemoryDocument,
};

const DEAL: &str = "42";

/// Gives every other fingerprint of a batch to the bound deal.
struct AlternatingOracle;

#[async_trait]
impl AssignmentOracle for AlternatingOracle {
    async fn batch_deal_assignment(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<HashMap<Fingerprint, Option<Assignment>>, OracleError> {
        Ok(fingerprints
            .iter()
            .enumerate()
            .map(|(i, fp)| {
                let deal = if i % 2 == 0 { DEAL } else { "43" };
                (fp.clone(), Some(Assignment::new(Some(deal), "7")))
            })
            .collect())
    }
}

fn feed_with_calls(count: usize) -> MemoryDocument {
    let config = FilterConfig::default();
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let feed = doc
        .append_element(root, "div", &config.selectors.feed_container)
        .expect("feed container");
    for i in 0..count {
        CallEntryBuilder::new(&format!("call-{}", i))
            .link(&format!("https://records.example/calls/{}.mp3", i))
            .phone("79639588178")
            .duration("01:19")
            .append_to(&mut doc, &config.selectors, feed)
            .expect("call entry");
    }
    doc.take_mutations();
    doc
}

fn bench_steady_state_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("steady_state_pass");

    for count in [10usize, 50, 200] {
        let document = Arc::new(Mutex::new(feed_with_calls(count)));
        let filter = CallVisibilityFilter::builder(document, Arc::new(AlternatingOracle)).build();
        // Warm the cache and the decorations.
        rt.block_on(filter.bind_deal(Some(DEAL.to_string())));

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| rt.block_on(async { black_box(filter.check_and_hide_calls().await) }));
        });
    }

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let link = "https://records.example/calls/0a1b2c3d4e5f.mp3";
    c.bench_function("fingerprint", |b| {
        b.iter(|| Fingerprint::of_link(black_box(link)))
    });
}

criterion_group!(benches, bench_steady_state_pass, bench_fingerprint);
criterion_main!(benches);
