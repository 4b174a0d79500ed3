//! Inter-arrival measurement operator
//!
//! Replaces each value with the stride between its arrival and the
//! previous one (the first value measures from attach time). The scheduler
//! is consulted only for `now`; no delivery hops contexts.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, SchedulerTime, StrideOf};
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by
/// [`measure_interval`](crate::PublisherExt::measure_interval)
pub struct MeasureInterval<U, Sch: Scheduler> {
    upstream: U,
    scheduler: Sch,
}

impl<U, Sch: Scheduler> MeasureInterval<U, Sch> {
    pub(crate) fn new(upstream: U, scheduler: Sch) -> MeasureInterval<U, Sch> {
        MeasureInterval {
            upstream,
            scheduler,
        }
    }
}

impl<U: Clone, Sch: Scheduler> Clone for MeasureInterval<U, Sch> {
    fn clone(&self) -> Self {
        MeasureInterval {
            upstream: self.upstream.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<U, Sch> Publisher for MeasureInterval<U, Sch>
where
    U: Publisher,
    U::Output: Send + 'static,
    Sch: Scheduler,
{
    type Output = StrideOf<Sch>;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = StrideOf<Sch>, Failure = U::Failure>,
    {
        let stage = MeasureStage::new(subscriber, self.scheduler.clone());
        self.upstream.subscribe(stage);
    }
}

struct MeasureStage<I, S, Sch: Scheduler> {
    me: Weak<Self>,
    scheduler: Sch,
    downstream: S,
    status: Mutex<SubscriptionStatus>,
    last: Mutex<Option<Sch::Time>>,
    delivery: ReentrantMutex<()>,
    _input: PhantomData<fn(I)>,
}

impl<I, S, Sch> MeasureStage<I, S, Sch>
where
    I: Send + 'static,
    S: Subscriber<Input = StrideOf<Sch>>,
    Sch: Scheduler,
{
    fn new(downstream: S, scheduler: Sch) -> Arc<Self> {
        Arc::new_cyclic(|me| MeasureStage {
            me: me.clone(),
            scheduler,
            downstream,
            status: Mutex::new(SubscriptionStatus::Awaiting),
            last: Mutex::new(None),
            delivery: ReentrantMutex::new(()),
            _input: PhantomData,
        })
    }
}

impl<I, S, Sch> Subscriber for MeasureStage<I, S, Sch>
where
    I: Send + 'static,
    S: Subscriber<Input = StrideOf<Sch>>,
    Sch: Scheduler,
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
        *self.last.lock() = Some(self.scheduler.now());
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.downstream
            .receive_subscription(AnySubscription::from_arc(me));
    }

    fn receive(&self, _input: I) -> Demand {
        if self.status.lock().is_terminal() {
            return Demand::NONE;
        }
        let now = self.scheduler.now();
        let stride = {
            let mut last = self.last.lock();
            match last.replace(now.clone()) {
                Some(previous) => previous.distance_to(&now),
                None => return Demand::NONE,
            }
        };
        let _delivery = self.delivery.lock();
        self.downstream.receive(stride)
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

impl<I, S, Sch> Subscription for MeasureStage<I, S, Sch>
where
    I: Send + 'static,
    S: Subscriber<Input = StrideOf<Sch>>,
    Sch: Scheduler,
{
    fn request(&self, demand: Demand) {
        let upstream = self.status.lock().subscription().cloned();
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }
}

impl<I, S, Sch> Cancellable for MeasureStage<I, S, Sch>
where
    I: Send + 'static,
    S: Subscriber<Input = StrideOf<Sch>>,
    Sch: Scheduler,
{
    fn cancel(&self) {
        let upstream = self.status.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
