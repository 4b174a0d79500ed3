//! Upstream-context operator
//!
//! Performs the upstream attach on a scheduler, and dispatches downstream
//! `request` and `cancel` calls through it as well. Values and terminals
//! flow synchronously — there is no second hop on the delivery path.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by [`subscribe_on`](crate::PublisherExt::subscribe_on)
pub struct SubscribeOn<U, Sch: Scheduler> {
    upstream: Arc<U>,
    scheduler: Sch,
    options: Option<Sch::Options>,
}

impl<U, Sch: Scheduler> SubscribeOn<U, Sch> {
    pub(crate) fn new(upstream: U, scheduler: Sch) -> SubscribeOn<U, Sch> {
        SubscribeOn {
            upstream: Arc::new(upstream),
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

impl<U, Sch: Scheduler> Clone for SubscribeOn<U, Sch> {
    fn clone(&self) -> Self {
        SubscribeOn {
            upstream: Arc::clone(&self.upstream),
            scheduler: self.scheduler.clone(),
            options: self.options.clone(),
        }
    }
}

impl<U, Sch> Publisher for SubscribeOn<U, Sch>
where
    U: Publisher + Send + Sync + 'static,
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
        let stage = SubscribeOnStage::new(subscriber, self.scheduler.clone(), self.options.clone());
        let upstream = Arc::clone(&self.upstream);
        self.scheduler.schedule(
            self.options.as_ref(),
            Box::new(move || upstream.subscribe(stage)),
        );
    }
}

struct SubscribeOnStage<S, Sch: Scheduler> {
    me: Weak<Self>,
    scheduler: Sch,
    options: Option<Sch::Options>,
    downstream: S,
    status: Mutex<SubscriptionStatus>,
    delivery: ReentrantMutex<()>,
}

impl<S, Sch> SubscribeOnStage<S, Sch>
where
    S: Subscriber,
    Sch: Scheduler,
{
    fn new(downstream: S, scheduler: Sch, options: Option<Sch::Options>) -> Arc<Self> {
        Arc::new_cyclic(|me| SubscribeOnStage {
            me: me.clone(),
            scheduler,
            options,
            downstream,
            status: Mutex::new(SubscriptionStatus::Awaiting),
            delivery: ReentrantMutex::new(()),
        })
    }
}

impl<S, Sch> Subscriber for SubscribeOnStage<S, Sch>
where
    S: Subscriber,
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
        let _delivery = self.delivery.lock();
        self.downstream.receive(input)
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

impl<S, Sch> Subscription for SubscribeOnStage<S, Sch>
where
    S: Subscriber,
    Sch: Scheduler,
{
    fn request(&self, demand: Demand) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.scheduler.schedule(
            self.options.as_ref(),
            Box::new(move || {
                let upstream = me.status.lock().subscription().cloned();
                if let Some(upstream) = upstream {
                    upstream.request(demand);
                }
            }),
        );
    }
}

impl<S, Sch> Cancellable for SubscribeOnStage<S, Sch>
where
    S: Subscriber,
    Sch: Scheduler,
{
    fn cancel(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.scheduler.schedule(
            self.options.as_ref(),
            Box::new(move || {
                let upstream = me.status.lock().take();
                if let Some(upstream) = upstream {
                    upstream.cancel();
                }
            }),
        );
    }
}
