//! Per-value transform stage
//!
//! Skeleton for operators that look at each upstream value independently:
//! filter, filter-map, de-duplicate, take-while. The hook classifies each
//! value; a filtered-out value returns one demand upstream to refill the
//! slot it consumed.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::stage::Step;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Stage driven by a `FnMut(I) -> Step<Option<Output>, E>` hook
pub(crate) struct FilterStage<I, S, F>
where
    S: Subscriber,
{
    me: Weak<Self>,
    hook: Mutex<F>,
    downstream: S,
    status: Mutex<SubscriptionStatus>,
    delivery: ReentrantMutex<()>,
    _input: PhantomData<fn(I)>,
}

impl<I, S, F> FilterStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    F: FnMut(I) -> Step<Option<S::Input>, S::Failure> + Send + 'static,
{
    pub(crate) fn new(downstream: S, hook: F) -> Arc<Self> {
        Arc::new_cyclic(|me| FilterStage {
            me: me.clone(),
            hook: Mutex::new(hook),
            downstream,
            status: Mutex::new(SubscriptionStatus::Awaiting),
            delivery: ReentrantMutex::new(()),
            _input: PhantomData,
        })
    }

    /// Cancel upstream and deliver a terminal produced by the hook
    fn short_circuit(&self, completion: Completion<S::Failure>) {
        let upstream = self.status.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
        let _delivery = self.delivery.lock();
        self.downstream.receive_completion(completion);
    }
}

impl<I, S, F> Subscriber for FilterStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    F: FnMut(I) -> Step<Option<S::Input>, S::Failure> + Send + 'static,
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
        let step = {
            let mut hook = self.hook.lock();
            (*hook)(input)
        };
        match step {
            Step::Next(Some(output)) => {
                let _delivery = self.delivery.lock();
                self.downstream.receive(output)
            }
            // Filtered out: refill the slot this value consumed.
            Step::Next(None) => Demand::max(1),
            Step::Finished => {
                self.short_circuit(Completion::Finished);
                Demand::NONE
            }
            Step::Failure(error) => {
                self.short_circuit(Completion::Failure(error));
                Demand::NONE
            }
        }
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

impl<I, S, F> Subscription for FilterStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    F: FnMut(I) -> Step<Option<S::Input>, S::Failure> + Send + 'static,
{
    fn request(&self, demand: Demand) {
        let upstream = self.status.lock().subscription().cloned();
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }
}

impl<I, S, F> Cancellable for FilterStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    F: FnMut(I) -> Step<Option<S::Input>, S::Failure> + Send + 'static,
{
    fn cancel(&self) {
        let upstream = self.status.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
