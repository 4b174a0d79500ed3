//! Hub and single-shot cache integration tests
//!
//! End-to-end coverage of the multicast hubs and the memoized one-shot
//! cache: strict pull discipline, per-conduit demand, current-value
//! replay, completion capture, feeder handling, and late subscribers.

mod common;

use common::TestSink;
use rivulet::{
    Completion, CurrentValueHub, Demand, OneShot, PassthroughHub, Publisher, PublisherExt,
};
use std::sync::Arc;

// ─── Pull discipline ─────────────────────────────────────────────

#[test]
fn test_no_request_no_delivery_then_bounded_delivery() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let sink = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));

    hub.send(1);
    assert!(sink.values().is_empty());

    sink.request(Demand::max(2));
    hub.send(2);
    hub.send(3);
    hub.send(4);
    assert_eq!(sink.values(), vec![2, 3]);
    assert!(sink.completions().is_empty());
}

#[test]
fn test_unlimited_demand_drains_everything() {
    let hub: PassthroughHub<u32, &'static str> = PassthroughHub::new();
    let sink = TestSink::<u32, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    for v in 0..1_000 {
        hub.send(v);
    }
    hub.send_completion(Completion::Finished);

    let values = sink.values();
    assert_eq!(values.len(), 1_000);
    assert_eq!(values[0], 0);
    assert_eq!(values[999], 999);
    assert_eq!(sink.completions(), vec![Completion::Finished]);
}

#[test]
fn test_values_delivered_at_most_requested_total() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let sink = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));

    sink.request(Demand::max(1));
    sink.request(Demand::max(2));
    for v in 0..10 {
        hub.send(v);
    }
    // Requests are additive: 1 + 2 = 3.
    assert_eq!(sink.values().len(), 3);
}

// ─── Current-value replay ────────────────────────────────────────

#[test]
fn test_current_value_replay_and_deferral() {
    let hub: CurrentValueHub<&'static str, &'static str> = CurrentValueHub::new("a");
    let sink = TestSink::<&'static str, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));

    sink.request(Demand::max(1));
    assert_eq!(sink.values(), vec!["a"]);

    hub.set_value("b");
    assert_eq!(sink.values(), vec!["a"]);

    sink.request(Demand::max(1));
    assert_eq!(sink.values(), vec!["a", "b"]);
}

#[test]
fn test_current_value_single_request_delivers_exactly_one() {
    let hub: CurrentValueHub<i32, &'static str> = CurrentValueHub::new(5);
    let sink = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));

    sink.request(Demand::max(1));
    assert_eq!(sink.values(), vec![5]);
    assert!(sink.completions().is_empty());
}

#[test]
fn test_current_value_feeds_new_subscriber_latest() {
    let hub: CurrentValueHub<i32, &'static str> = CurrentValueHub::new(1);
    hub.set_value(2);

    let late = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&late));
    late.request(Demand::UNLIMITED);
    assert_eq!(late.values(), vec![2]);
}

// ─── Completion capture and replay ───────────────────────────────

#[test]
fn test_completed_hub_replays_to_late_subscriber() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    hub.send_completion(Completion::Failure("gone"));

    let late = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&late));
    // The late subscriber got an empty subscription followed immediately
    // by the stored completion, with no values in between.
    assert_eq!(late.completions(), vec![Completion::Failure("gone")]);
    assert!(late.values().is_empty());
}

#[test]
fn test_terminal_is_delivered_at_most_once() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let sink = TestSink::<i32, &'static str>::new();
    hub.subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    hub.send_completion(Completion::Finished);
    hub.send_completion(Completion::Failure("late"));
    hub.send(1);

    assert_eq!(sink.completions(), vec![Completion::Finished]);
    assert!(sink.values().is_empty());
}

// ─── Feeders ─────────────────────────────────────────────────────

#[test]
fn test_hub_attached_downstream_of_publisher() {
    let source: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let relay: PassthroughHub<i32, &'static str> = PassthroughHub::new();

    // The relay is a subscriber of the source; its feeder subscription is
    // requested unlimited demand, so it observes every value.
    source.subscribe(relay.clone());

    let sink = TestSink::<i32, &'static str>::new();
    relay.subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    source.send(1);
    source.send(2);
    source.send_completion(Completion::Finished);

    assert_eq!(sink.values(), vec![1, 2]);
    assert_eq!(sink.completions(), vec![Completion::Finished]);
}

// ─── Single-shot cache ───────────────────────────────────────────

#[test]
fn test_oneshot_replays_to_every_subscriber() {
    let cache: OneShot<i32, &'static str> = OneShot::new(|resolver| resolver.resolve(Ok(42)));

    let first = TestSink::<i32, &'static str>::new();
    cache.subscribe(Arc::clone(&first));
    first.request(Demand::max(1));
    assert_eq!(first.values(), vec![42]);
    assert_eq!(first.completions(), vec![Completion::Finished]);

    let second = TestSink::<i32, &'static str>::new();
    cache.subscribe(Arc::clone(&second));
    second.request(Demand::max(1));
    assert_eq!(second.values(), vec![42]);
    assert_eq!(second.completions(), vec![Completion::Finished]);

    let silent = TestSink::<i32, &'static str>::new();
    cache.subscribe(Arc::clone(&silent));
    assert!(silent.values().is_empty());
    assert!(silent.completions().is_empty());
}

#[test]
fn test_oneshot_feeds_operator_chain() {
    let cache: OneShot<i32, &'static str> = OneShot::new(|resolver| resolver.resolve(Ok(21)));
    let sink = TestSink::<i32, &'static str>::new();
    cache.clone().map(|v| v * 2).subscribe(Arc::clone(&sink));
    sink.request(Demand::max(1));
    assert_eq!(sink.values(), vec![42]);
}

// ─── Erasure ─────────────────────────────────────────────────────

#[test]
fn test_erased_hub_behaves_identically() {
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let erased = hub.clone().erase();
    // Erasing twice preserves behavior.
    let erased = erased.erase();

    let sink = TestSink::<i32, &'static str>::new();
    erased.subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);
    hub.send(3);
    assert_eq!(sink.values(), vec![3]);
}
