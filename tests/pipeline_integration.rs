//! Operator pipeline integration tests
//!
//! End-to-end coverage of composed pipelines: chained operators over hubs,
//! cancellation through multiple stages, the RAII token bag, type erasure
//! in the middle of a chain, and the process-wide protocol hooks.

mod common;

use common::{TestSink, TrackingPublisher};
use parking_lot::Mutex;
use rivulet::{
    hooks, AnyCancellable, Cancellable, CancellableSet, Completion, Demand, NodeId,
    PassthroughHub, ProtocolHook, Publisher, PublisherExt,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ─── Chained operators ───────────────────────────────────────────

#[test]
fn test_filter_map_fold_chain() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let sums = Arc::new(Mutex::new(Vec::new()));
    let sums_in = Arc::clone(&sums);
    let _token = hub
        .clone()
        .filter(|v| v % 2 == 0)
        .map(|v| v * 10)
        .fold(0, |acc, v| acc + v)
        .sink_values(move |total| sums_in.lock().push(total));

    for v in 1..=6 {
        hub.send(v);
    }
    hub.send_completion(Completion::Finished);
    // (2 + 4 + 6) * 10
    assert_eq!(*sums.lock(), vec![120]);
}

#[test]
fn test_dedupe_then_count() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let counts = Arc::new(Mutex::new(Vec::new()));
    let counts_in = Arc::clone(&counts);
    let _token = hub
        .clone()
        .dedupe()
        .count()
        .sink_values(move |n| counts_in.lock().push(n));

    for v in [1, 1, 2, 2, 3] {
        hub.send(v);
    }
    hub.send_completion(Completion::Finished);
    assert_eq!(*counts.lock(), vec![3]);
}

#[test]
fn test_take_while_short_circuits_the_whole_chain() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let (source, counters) = TrackingPublisher::new(hub.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let _token = source
        .map(|v| v + 1)
        .take_while(|v| *v < 4)
        .sink_values(move |v| seen_in.lock().push(v));

    for v in 1..=10 {
        hub.send(v);
    }
    assert_eq!(*seen.lock(), vec![2, 3]);
    // The early finish cancelled the source subscription exactly once.
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(hub.downstream_count(), 0);
}

#[test]
fn test_first_where_through_erased_middle() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);

    // Erase mid-chain; the pipeline behaves identically.
    let erased = hub.clone().map(|v| v * v).erase();
    let _token = erased
        .first_where(|v| *v > 10)
        .sink_values(move |v| seen_in.lock().push(v));

    for v in 1..=10 {
        hub.send(v);
    }
    assert_eq!(*seen.lock(), vec![16]);
}

// ─── Cancellation ────────────────────────────────────────────────

#[test]
fn test_token_bag_tears_down_all_pipelines() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let mut bag = CancellableSet::new();

    for _ in 0..3 {
        hub.clone()
            .map(|v| v)
            .sink_values(|_| {})
            .store_in(&mut bag);
    }
    assert_eq!(hub.downstream_count(), 3);

    drop(bag);
    assert_eq!(hub.downstream_count(), 0);
}

#[test]
fn test_cancel_twice_is_harmless() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let (source, counters) = TrackingPublisher::new(hub.clone());
    let sink = TestSink::<i32, &'static str>::new();
    source.map(|v| v).subscribe(Arc::clone(&sink));
    sink.request(Demand::max(1));

    let token = AnyCancellable::new({
        let sink = Arc::clone(&sink);
        move || sink.cancel()
    });
    token.cancel();
    token.cancel();
    drop(token);
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);

    hub.send(1);
    assert!(sink.values().is_empty());
}

#[test]
fn test_values_never_exceed_total_requested_through_stages() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let sink = TestSink::<i32, &'static str>::new();
    hub.clone().map(|v| v).subscribe(Arc::clone(&sink));

    sink.request(Demand::max(2));
    for v in 0..100 {
        hub.send(v);
    }
    sink.request(Demand::max(3));
    for v in 0..100 {
        hub.send(v);
    }
    assert_eq!(sink.values().len(), 5);
}

// ─── Protocol hooks ──────────────────────────────────────────────

/// Counts only requests for one marker demand, so concurrent tests in
/// this binary cannot skew the totals through the global registry.
#[derive(Default)]
struct CountingHook {
    wills: AtomicUsize,
    dids: AtomicUsize,
}

const MARKER: Demand = Demand::max(7777);

impl ProtocolHook for CountingHook {
    fn will_request(&self, _subscription: NodeId, demand: Demand) {
        if demand == MARKER {
            self.wills.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn did_request(&self, _subscription: NodeId, demand: Demand) {
        if demand == MARKER {
            self.dids.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_hooks_observe_requests_in_pairs() {
    let counting = Arc::new(CountingHook::default());
    let hook: Arc<dyn ProtocolHook> = counting.clone();
    hooks::install(Arc::clone(&hook));

    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let sink = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));
    sink.request(MARKER);
    sink.request(MARKER);

    hooks::uninstall(&hook);

    assert_eq!(counting.wills.load(Ordering::SeqCst), 2);
    assert_eq!(counting.dids.load(Ordering::SeqCst), 2);

    // After uninstall, traffic is no longer observed.
    sink.request(MARKER);
    assert_eq!(counting.wills.load(Ordering::SeqCst), 2);
}
