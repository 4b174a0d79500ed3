//! Scheduler-interposed stage integration tests
//!
//! Deterministic virtual-time coverage of the time-shifting operators:
//! queued deliveries observing cancellation, timeout deadlines with
//! upstream cancel, delay ordering, debounce generations, and the
//! subscribe-on dispatch rules.

mod common;

use common::{TestSink, TrackingPublisher};
use rivulet::scheduler::testing::TestScheduler;
use rivulet::{Completion, Demand, PassthroughHub, Publisher, PublisherExt, SourceError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

// ─── Cancel vs queued deliveries ─────────────────────────────────

#[test]
fn test_cancel_voids_scheduled_deliveries_and_reaches_source_once() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let (source, counters) = TrackingPublisher::new(hub.clone());

    let sink = TestSink::<i32, &'static str>::new();
    source
        .map(|v| v * 2)
        .receive_on(scheduler.clone())
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::max(5));

    // Values queue behind the paused scheduler.
    hub.send(1);
    hub.send(2);
    hub.send(3);
    assert!(sink.values().is_empty());

    sink.cancel();
    scheduler.run();

    // The queued deliveries observed the terminal state and no-oped, and
    // the cancel propagated to the source exactly once.
    assert!(sink.values().is_empty());
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
}

// ─── Timeout ─────────────────────────────────────────────────────

#[test]
fn test_timeout_fires_with_custom_error_and_cancels_source() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, SourceError> = PassthroughHub::new();
    let (source, counters) = TrackingPublisher::new(hub.clone());

    let sink = TestSink::<i32, SourceError>::new();
    source
        .timeout(Duration::from_secs(1), scheduler.clone())
        .or_else(|| SourceError::Timeout)
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::max(1));

    scheduler.advance(Duration::from_secs(1));
    assert_eq!(
        sink.completions(),
        vec![Completion::Failure(SourceError::Timeout)]
    );
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timeout_survives_while_values_flow() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, SourceError> = PassthroughHub::new();

    let sink = TestSink::<i32, SourceError>::new();
    hub.clone()
        .timeout(Duration::from_millis(100), scheduler.clone())
        .or_else(|| SourceError::Timeout)
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    for _ in 0..5 {
        scheduler.advance(Duration::from_millis(60));
        hub.send(7);
    }
    scheduler.advance(Duration::from_millis(60));
    assert_eq!(sink.values().len(), 5);
    assert!(sink.completions().is_empty());

    scheduler.advance(Duration::from_millis(40));
    assert_eq!(
        sink.completions(),
        vec![Completion::Failure(SourceError::Timeout)]
    );
}

// ─── Delay ───────────────────────────────────────────────────────

#[test]
fn test_delay_preserves_order_across_terminal() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();

    let sink = TestSink::<i32, &'static str>::new();
    hub.clone()
        .delay(Duration::from_millis(50), scheduler.clone())
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    hub.send(1);
    scheduler.advance(Duration::from_millis(10));
    hub.send(2);
    hub.send_completion(Completion::Finished);

    // Nothing lands before the first deadline.
    scheduler.advance(Duration::from_millis(39));
    assert!(sink.values().is_empty());

    scheduler.advance(Duration::from_millis(50));
    assert_eq!(sink.values(), vec![1, 2]);
    assert_eq!(sink.completions(), vec![Completion::Finished]);
}

// ─── Debounce ────────────────────────────────────────────────────

#[test]
fn test_debounce_emits_only_after_quiescence() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();

    let sink = TestSink::<i32, &'static str>::new();
    hub.clone()
        .debounce(Duration::from_millis(100), scheduler.clone())
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    hub.send(1);
    scheduler.advance(Duration::from_millis(50));
    hub.send(2);
    scheduler.advance(Duration::from_millis(50));
    hub.send(3);
    assert!(sink.values().is_empty());

    scheduler.advance(Duration::from_millis(100));
    assert_eq!(sink.values(), vec![3]);
}

// ─── Subscribe-on ────────────────────────────────────────────────

#[test]
fn test_subscribe_on_defers_attach_and_cancel() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
    let (source, counters) = TrackingPublisher::new(hub.clone());

    let sink = TestSink::<i32, &'static str>::new();
    source
        .subscribe_on(scheduler.clone())
        .subscribe(Arc::clone(&sink));

    assert!(!sink.is_subscribed());
    scheduler.run();
    assert!(sink.is_subscribed());

    sink.request(Demand::UNLIMITED);
    // Requests hop through the scheduler too.
    hub.send(1);
    assert!(sink.values().is_empty());
    scheduler.run();
    hub.send(1);
    assert_eq!(sink.values(), vec![1]);

    sink.cancel();
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 0);
    scheduler.run();
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
}

// ─── Measure-interval ────────────────────────────────────────────

#[test]
fn test_measure_interval_reports_gaps() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();

    let sink = TestSink::<Duration, &'static str>::new();
    hub.clone()
        .measure_interval(scheduler.clone())
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::UNLIMITED);

    scheduler.advance(Duration::from_millis(30));
    hub.send(0);
    scheduler.advance(Duration::from_millis(70));
    hub.send(0);

    assert_eq!(
        sink.values(),
        vec![Duration::from_millis(30), Duration::from_millis(70)]
    );
}

// ─── Receive-on demand accounting ────────────────────────────────

#[test]
fn test_receive_on_requests_returned_demand_after_delivery() {
    let scheduler = TestScheduler::new();
    let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();

    // A sink that refills one per value: the refill must be requested
    // upstream only after the scheduled delivery lands.
    let sink = TestSink::<i32, &'static str>::with_refill(Demand::max(1));
    hub.clone()
        .receive_on(scheduler.clone())
        .subscribe(Arc::clone(&sink));
    sink.request(Demand::max(1));

    hub.send(1);
    // Demand is exhausted; a second send before the hop lands is dropped.
    hub.send(2);
    scheduler.run();
    assert_eq!(sink.values(), vec![1]);

    // The refill arrived upstream; the next send flows.
    hub.send(3);
    scheduler.run();
    assert_eq!(sink.values(), vec![1, 3]);
}
