//! Fixed-delay operator
//!
//! Holds every value and the terminal for `interval` (plus tolerance)
//! before delivering. A terminal observed mid-delay parks the stage in the
//! pending-terminal state so already-queued values still land first, in
//! order, before the terminal does.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, SchedulerStride, SchedulerTime, StrideOf};
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by [`delay`](crate::PublisherExt::delay)
pub struct Delay<U, Sch: Scheduler> {
    upstream: U,
    interval: StrideOf<Sch>,
    tolerance: StrideOf<Sch>,
    scheduler: Sch,
    options: Option<Sch::Options>,
}

impl<U, Sch: Scheduler> Delay<U, Sch> {
    pub(crate) fn new(upstream: U, interval: StrideOf<Sch>, scheduler: Sch) -> Delay<U, Sch> {
        Delay {
            upstream,
            interval,
            tolerance: SchedulerStride::zero(),
            scheduler,
            options: None,
        }
    }

    /// Allow the scheduler this much slack around each deadline
    pub fn with_tolerance(mut self, tolerance: StrideOf<Sch>) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Attach scheduler-specific dispatch options
    pub fn with_options(mut self, options: Sch::Options) -> Self {
        self.options = Some(options);
        self
    }
}

impl<U: Clone, Sch: Scheduler> Clone for Delay<U, Sch> {
    fn clone(&self) -> Self {
        Delay {
            upstream: self.upstream.clone(),
            interval: self.interval,
            tolerance: self.tolerance,
            scheduler: self.scheduler.clone(),
            options: self.options.clone(),
        }
    }
}

impl<U, Sch> Publisher for Delay<U, Sch>
where
    U: Publisher,
    U::Output: Send + 'static,
    U::Failure: Send + 'static,
    Sch: Scheduler,
{
    type Output = U::Output;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let stage = DelayStage::new(
            subscriber,
            self.interval,
            self.tolerance,
            self.scheduler.clone(),
            self.options.clone(),
        );
        self.upstream.subscribe(stage);
    }
}

struct DelayStage<S, Sch: Scheduler> {
    me: Weak<Self>,
    interval: StrideOf<Sch>,
    tolerance: StrideOf<Sch>,
    scheduler: Sch,
    options: Option<Sch::Options>,
    downstream: S,
    status: Mutex<SubscriptionStatus>,
    delivery: ReentrantMutex<()>,
}

impl<S, Sch> DelayStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn new(
        downstream: S,
        interval: StrideOf<Sch>,
        tolerance: StrideOf<Sch>,
        scheduler: Sch,
        options: Option<Sch::Options>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| DelayStage {
            me: me.clone(),
            interval,
            tolerance,
            scheduler,
            options,
            downstream,
            status: Mutex::new(SubscriptionStatus::Awaiting),
            delivery: ReentrantMutex::new(()),
        })
    }

    fn deliver_value(&self, value: S::Input) {
        if self.status.lock().is_terminal() {
            return;
        }
        let more = {
            let _delivery = self.delivery.lock();
            self.downstream.receive(value)
        };
        if !more.is_none() {
            let upstream = self.status.lock().subscription().cloned();
            if let Some(upstream) = upstream {
                upstream.request(more);
            }
        }
    }

    fn deliver_completion(&self, completion: Completion<S::Failure>) {
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

impl<S, Sch> Subscriber for DelayStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    type Input = S::Input;
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

    fn receive(&self, input: S::Input) -> Demand {
        if self.status.lock().is_terminal() {
            return Demand::NONE;
        }
        let Some(me) = self.me.upgrade() else {
            return Demand::NONE;
        };
        let due = self.scheduler.now().advanced_by(self.interval);
        self.scheduler.schedule_after(
            due,
            self.tolerance,
            self.options.as_ref(),
            Box::new(move || me.deliver_value(input)),
        );
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<S::Failure>) {
        {
            let mut status = self.status.lock();
            match status.take() {
                Some(upstream) => {
                    // Park pending: queued values still precede the
                    // terminal's own delay window.
                    *status = SubscriptionStatus::PendingTerminal(upstream);
                }
                None => return,
            }
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let due = self.scheduler.now().advanced_by(self.interval);
        self.scheduler.schedule_after(
            due,
            self.tolerance,
            self.options.as_ref(),
            Box::new(move || me.deliver_completion(completion)),
        );
    }
}

impl<S, Sch> Subscription for DelayStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn request(&self, demand: Demand) {
        let upstream = self.status.lock().subscription().cloned();
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }
}

impl<S, Sch> Cancellable for DelayStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn cancel(&self) {
        let upstream = self.status.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
