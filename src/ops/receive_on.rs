//! Downstream-context operator
//!
//! Re-dispatches values and terminals through a scheduler so the
//! downstream observes them in that scheduler's context. The subscription
//! handoff is not scheduled, and `request`/`cancel` from the downstream are
//! forwarded synchronously. Demand returned by a scheduled delivery is
//! requested upstream after the delivery lands.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by [`receive_on`](crate::PublisherExt::receive_on)
pub struct ReceiveOn<U, Sch: Scheduler> {
    upstream: U,
    scheduler: Sch,
    options: Option<Sch::Options>,
}

impl<U, Sch: Scheduler> ReceiveOn<U, Sch> {
    pub(crate) fn new(upstream: U, scheduler: Sch) -> ReceiveOn<U, Sch> {
        ReceiveOn {
            upstream,
            scheduler,
            options: None,
        }
    }

    /// Attach scheduler-specific dispatch options
    pub fn with_options(mut self, options: Sch::Options) -> Self {
        self.options = Some(options);
        self
    }
}

impl<U: Clone, Sch: Scheduler> Clone for ReceiveOn<U, Sch> {
    fn clone(&self) -> Self {
        ReceiveOn {
            upstream: self.upstream.clone(),
            scheduler: self.scheduler.clone(),
            options: self.options.clone(),
        }
    }
}

impl<U, Sch> Publisher for ReceiveOn<U, Sch>
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
        let stage = ReceiveOnStage::new(subscriber, self.scheduler.clone(), self.options.clone());
        self.upstream.subscribe(stage);
    }
}

struct ReceiveOnStage<S, Sch: Scheduler> {
    me: Weak<Self>,
    scheduler: Sch,
    options: Option<Sch::Options>,
    downstream: S,
    status: Mutex<SubscriptionStatus>,
    delivery: ReentrantMutex<()>,
}

impl<S, Sch> ReceiveOnStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    Sch: Scheduler,
{
    fn new(downstream: S, scheduler: Sch, options: Option<Sch::Options>) -> Arc<Self> {
        Arc::new_cyclic(|me| ReceiveOnStage {
            me: me.clone(),
            scheduler,
            options,
            downstream,
            status: Mutex::new(SubscriptionStatus::Awaiting),
            delivery: ReentrantMutex::new(()),
        })
    }

    /// Scheduled half of a value delivery
    fn deliver_value(&self, value: S::Input) {
        if self.status.lock().is_terminal() {
            // Cancelled while the delivery was queued.
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

    /// Scheduled half of a terminal delivery
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

impl<S, Sch> Subscriber for ReceiveOnStage<S, Sch>
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
        // The handoff itself stays on the caller's context.
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
        self.scheduler.schedule(
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
                    *status = SubscriptionStatus::PendingTerminal(upstream);
                }
                None => return,
            }
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.scheduler.schedule(
            self.options.as_ref(),
            Box::new(move || me.deliver_completion(completion)),
        );
    }
}

impl<S, Sch> Subscription for ReceiveOnStage<S, Sch>
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

impl<S, Sch> Cancellable for ReceiveOnStage<S, Sch>
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::PassthroughHub;
    use crate::ops::PublisherExt;
    use crate::scheduler::testing::TestScheduler;

    #[test]
    fn test_values_wait_for_the_scheduler() {
        let scheduler = TestScheduler::new();
        let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let _token = hub
            .clone()
            .receive_on(scheduler.clone())
            .sink_values(move |v| seen_in.lock().push(v));

        hub.send(1);
        hub.send(2);
        assert!(seen.lock().is_empty());

        scheduler.run();
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_completion_is_scheduled_after_values() {
        let scheduler = TestScheduler::new();
        let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let values_in = Arc::clone(&events);
        let done_in = Arc::clone(&events);
        let _token = hub.clone().receive_on(scheduler.clone()).sink(
            move |v| values_in.lock().push(format!("v{v}")),
            move |_| done_in.lock().push("done".to_string()),
        );

        hub.send(1);
        hub.send_completion(Completion::Finished);
        scheduler.run();
        assert_eq!(*events.lock(), vec!["v1".to_string(), "done".to_string()]);
    }

    #[test]
    fn test_cancel_voids_queued_deliveries() {
        let scheduler = TestScheduler::new();
        let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let token = hub
            .clone()
            .receive_on(scheduler.clone())
            .sink_values(move |v| seen_in.lock().push(v));

        hub.send(1);
        hub.send(2);
        token.cancel();
        scheduler.run();
        assert!(seen.lock().is_empty());
        assert_eq!(hub.downstream_count(), 0);
    }
}
