//! Value transform operator
//!
//! The simplest stage shape: every upstream value is transformed and
//! forwarded, and demand passes through both ways untouched.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by [`map`](crate::PublisherExt::map)
pub struct Map<U, F> {
    upstream: U,
    transform: F,
}

impl<U, F> Map<U, F> {
    pub(crate) fn new(upstream: U, transform: F) -> Map<U, F> {
        Map {
            upstream,
            transform,
        }
    }
}

impl<U: Clone, F: Clone> Clone for Map<U, F> {
    fn clone(&self) -> Self {
        Map {
            upstream: self.upstream.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<U, F, T> Publisher for Map<U, F>
where
    U: Publisher,
    U::Output: Send + 'static,
    F: Fn(U::Output) -> T + Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let stage = MapStage::new(subscriber, self.transform.clone());
        self.upstream.subscribe(stage);
    }
}

struct MapStage<I, S, F> {
    me: Weak<Self>,
    transform: F,
    downstream: S,
    status: Mutex<SubscriptionStatus>,
    delivery: ReentrantMutex<()>,
    _input: PhantomData<fn(I)>,
}

impl<I, S, F, T> MapStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber<Input = T>,
    F: Fn(I) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    fn new(downstream: S, transform: F) -> Arc<Self> {
        Arc::new_cyclic(|me| MapStage {
            me: me.clone(),
            transform,
            downstream,
            status: Mutex::new(SubscriptionStatus::Awaiting),
            delivery: ReentrantMutex::new(()),
            _input: PhantomData,
        })
    }
}

impl<I, S, F, T> Subscriber for MapStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber<Input = T>,
    F: Fn(I) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    type Input = I;
    type Failure = S::Failure;

    fn receive_subscription(&self, subscription: AnySubscription) {
        {
            let mut status = self.status.lock();
            match &*status {
                SubscriptionStatus::Awaiting => {
                    *status = SubscriptionStatus::Subscribed(subscription);
                }
                _ => {
                    drop(status);
                    subscription.cancel();
                    return;
                }
            }
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.downstream
            .receive_subscription(AnySubscription::from_arc(me));
    }

    fn receive(&self, input: I) -> Demand {
        if self.status.lock().is_terminal() {
            return Demand::NONE;
        }
        let output = (self.transform)(input);
        let _delivery = self.delivery.lock();
        self.downstream.receive(output)
    }

    fn receive_completion(&self, completion: Completion<S::Failure>) {
        {
            let mut status = self.status.lock();
            if status.is_terminal() {
                return;
            }
            status.take();
        }
        let _delivery = self.delivery.lock();
        self.downstream.receive_completion(completion);
    }
}

impl<I, S, F, T> Subscription for MapStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber<Input = T>,
    F: Fn(I) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    fn request(&self, demand: Demand) {
        let upstream = self.status.lock().subscription().cloned();
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }
}

impl<I, S, F, T> Cancellable for MapStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber<Input = T>,
    F: Fn(I) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    fn cancel(&self) {
        let upstream = self.status.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
