//! Shared fixtures for the integration suites
//!
//! `TestSink` is a subscriber with externally driven demand that records
//! everything it receives; `TrackingPublisher` wraps any publisher and
//! counts the requests and cancels that cross its subscriptions.

#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use rivulet::{
    AnySubscription, Cancellable, Completion, Demand, Publisher, Subscriber, Subscription,
};

/// Recording subscriber whose demand is driven by the test
pub struct TestSink<I, E> {
    refill: Demand,
    state: Mutex<SinkRecord<I, E>>,
}

struct SinkRecord<I, E> {
    subscription: Option<AnySubscription>,
    values: Vec<I>,
    completions: Vec<Completion<E>>,
}

impl<I: Send + 'static, E: Send + 'static> TestSink<I, E> {
    /// A sink that requests nothing until told to
    pub fn new() -> Arc<TestSink<I, E>> {
        Arc::new(TestSink {
            refill: Demand::NONE,
            state: Mutex::new(SinkRecord {
                subscription: None,
                values: Vec::new(),
                completions: Vec::new(),
            }),
        })
    }

    /// A sink returning `refill` additional demand from every delivery
    pub fn with_refill(refill: Demand) -> Arc<TestSink<I, E>> {
        Arc::new(TestSink {
            refill,
            state: Mutex::new(SinkRecord {
                subscription: None,
                values: Vec::new(),
                completions: Vec::new(),
            }),
        })
    }

    /// Request more demand through the stored subscription
    pub fn request(&self, demand: Demand) {
        let subscription = self.state.lock().subscription.clone();
        subscription.expect("sink is not subscribed").request(demand);
    }

    /// Cancel the stored subscription
    pub fn cancel(&self) {
        let subscription = self.state.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    pub fn values(&self) -> Vec<I>
    where
        I: Clone,
    {
        self.state.lock().values.clone()
    }

    pub fn completions(&self) -> Vec<Completion<E>>
    where
        E: Clone,
    {
        self.state.lock().completions.clone()
    }
}

impl<I: Send + 'static, E: Send + 'static> Subscriber for TestSink<I, E> {
    type Input = I;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        self.state.lock().subscription = Some(subscription);
    }

    fn receive(&self, input: I) -> Demand {
        self.state.lock().values.push(input);
        self.refill
    }

    fn receive_completion(&self, completion: Completion<E>) {
        let mut state = self.state.lock();
        state.completions.push(completion);
        state.subscription = None;
    }
}

/// Counters shared with a [`TrackingPublisher`]
#[derive(Default)]
pub struct Counters {
    pub cancels: AtomicUsize,
    pub requests: Mutex<Vec<Demand>>,
}

/// Wrapper that observes protocol traffic into an inner publisher
pub struct TrackingPublisher<P> {
    inner: P,
    counters: Arc<Counters>,
}

impl<P> TrackingPublisher<P> {
    pub fn new(inner: P) -> (TrackingPublisher<P>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            TrackingPublisher {
                inner,
                counters: Arc::clone(&counters),
            },
            counters,
        )
    }
}

impl<P> Publisher for TrackingPublisher<P>
where
    P: Publisher,
    P::Output: Send + 'static,
    P::Failure: Send + 'static,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        self.inner.subscribe(TrackingSubscriber {
            inner: subscriber,
            counters: Arc::clone(&self.counters),
        });
    }
}

struct TrackingSubscriber<S> {
    inner: S,
    counters: Arc<Counters>,
}

impl<S> Subscriber for TrackingSubscriber<S>
where
    S: Subscriber,
{
    type Input = S::Input;
    type Failure = S::Failure;

    fn receive_subscription(&self, subscription: AnySubscription) {
        let tracked = AnySubscription::new(TrackingSubscription {
            inner: subscription,
            counters: Arc::clone(&self.counters),
        });
        self.inner.receive_subscription(tracked);
    }

    fn receive(&self, input: S::Input) -> Demand {
        self.inner.receive(input)
    }

    fn receive_completion(&self, completion: Completion<S::Failure>) {
        self.inner.receive_completion(completion);
    }
}

struct TrackingSubscription {
    inner: AnySubscription,
    counters: Arc<Counters>,
}

impl Subscription for TrackingSubscription {
    fn request(&self, demand: Demand) {
        self.counters.requests.lock().push(demand);
        self.inner.request(demand);
    }
}

impl Cancellable for TrackingSubscription {
    fn cancel(&self) {
        self.counters
            .cancels
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.cancel();
    }
}
