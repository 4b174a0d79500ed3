//! Deadline operator
//!
//! Arms a repeating timer whose first fire is the deadline; every incoming
//! value re-arms it. If the timer fires while the stage is still active,
//! the upstream is cancelled and the downstream receives either a
//! caller-supplied failure or a plain `Finished`. Values and terminals are
//! dispatched through the scheduler.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::{AnyCancellable, Cancellable};
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, SchedulerTime, StrideOf};
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by [`timeout`](crate::PublisherExt::timeout)
pub struct Timeout<U: Publisher, Sch: Scheduler> {
    upstream: U,
    interval: StrideOf<Sch>,
    scheduler: Sch,
    options: Option<Sch::Options>,
    custom_error: Option<Arc<dyn Fn() -> U::Failure + Send + Sync>>,
}

impl<U: Publisher, Sch: Scheduler> Timeout<U, Sch> {
    pub(crate) fn new(upstream: U, interval: StrideOf<Sch>, scheduler: Sch) -> Timeout<U, Sch> {
        Timeout {
            upstream,
            interval,
            scheduler,
            options: None,
            custom_error: None,
        }
    }

    /// Fail with `error()` instead of finishing when the deadline passes
    pub fn or_else(mut self, error: impl Fn() -> U::Failure + Send + Sync + 'static) -> Self {
        self.custom_error = Some(Arc::new(error));
        self
    }

    /// Attach scheduler-specific dispatch options
    pub fn with_options(mut self, options: Sch::Options) -> Self {
        self.options = Some(options);
        self
    }
}

impl<U: Publisher + Clone, Sch: Scheduler> Clone for Timeout<U, Sch> {
    fn clone(&self) -> Self {
        Timeout {
            upstream: self.upstream.clone(),
            interval: self.interval,
            scheduler: self.scheduler.clone(),
            options: self.options.clone(),
            custom_error: self.custom_error.clone(),
        }
    }
}

impl<U, Sch> Publisher for Timeout<U, Sch>
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
        let stage = TimeoutStage::new(
            subscriber,
            self.interval,
            self.scheduler.clone(),
            self.options.clone(),
            self.custom_error.clone(),
        );
        self.upstream.subscribe(stage);
    }
}

struct TimeoutStage<S: Subscriber, Sch: Scheduler> {
    me: Weak<Self>,
    interval: StrideOf<Sch>,
    scheduler: Sch,
    options: Option<Sch::Options>,
    custom_error: Option<Arc<dyn Fn() -> S::Failure + Send + Sync>>,
    downstream: S,
    state: Mutex<TimeoutState>,
    delivery: ReentrantMutex<()>,
}

struct TimeoutState {
    status: SubscriptionStatus,
    timer: Option<AnyCancellable>,
}

impl<S, Sch> TimeoutStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn new(
        downstream: S,
        interval: StrideOf<Sch>,
        scheduler: Sch,
        options: Option<Sch::Options>,
        custom_error: Option<Arc<dyn Fn() -> S::Failure + Send + Sync>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| TimeoutStage {
            me: me.clone(),
            interval,
            scheduler,
            options,
            custom_error,
            downstream,
            state: Mutex::new(TimeoutState {
                status: SubscriptionStatus::Awaiting,
                timer: None,
            }),
            delivery: ReentrantMutex::new(()),
        })
    }

    /// Arm (or re-arm) the deadline timer
    fn arm(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let deadline = self.scheduler.now().advanced_by(self.interval);
        let timer = self.scheduler.schedule_repeating(
            deadline,
            self.interval,
            self.scheduler.min_tolerance(),
            self.options.as_ref(),
            Box::new(move || me.timed_out()),
        );
        let stale = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                Some(timer)
            } else {
                state.timer.replace(timer)
            }
        };
        // Dropping the previous token stops its timer.
        drop(stale);
    }

    /// Timer body: the deadline elapsed with no event
    fn timed_out(&self) {
        let upstream = {
            let mut state = self.state.lock();
            if state.status.is_terminal()
                || matches!(state.status, SubscriptionStatus::PendingTerminal(_))
            {
                return;
            }
            state.timer = None;
            state.status.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
        tracing::debug!("Timeout elapsed, terminating stream");
        let completion = match &self.custom_error {
            Some(error) => Completion::Failure((**error)()),
            None => Completion::Finished,
        };
        let _delivery = self.delivery.lock();
        self.downstream.receive_completion(completion);
    }

    fn deliver_value(&self, value: S::Input) {
        if self.state.lock().status.is_terminal() {
            return;
        }
        let more = {
            let _delivery = self.delivery.lock();
            self.downstream.receive(value)
        };
        if !more.is_none() {
            let upstream = self.state.lock().status.subscription().cloned();
            if let Some(upstream) = upstream {
                upstream.request(more);
            }
        }
    }

    fn deliver_completion(&self, completion: Completion<S::Failure>) {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status.take();
        }
        let _delivery = self.delivery.lock();
        self.downstream.receive_completion(completion);
    }
}

impl<S, Sch> Subscriber for TimeoutStage<S, Sch>
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
            let mut state = self.state.lock();
            match &state.status {
                SubscriptionStatus::Awaiting => {
                    state.status = SubscriptionStatus::Subscribed(subscription);
                }
                _ => {
                    drop(state);
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
        self.arm();
    }

    fn receive(&self, input: S::Input) -> Demand {
        if self.state.lock().status.is_terminal() {
            return Demand::NONE;
        }
        // Every value pushes the deadline out.
        self.arm();
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
            let mut state = self.state.lock();
            state.timer = None;
            match state.status.take() {
                Some(upstream) => {
                    state.status = SubscriptionStatus::PendingTerminal(upstream);
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

impl<S, Sch> Subscription for TimeoutStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn request(&self, demand: Demand) {
        let upstream = self.state.lock().status.subscription().cloned();
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }
}

impl<S, Sch> Cancellable for TimeoutStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn cancel(&self) {
        let upstream = {
            let mut state = self.state.lock();
            state.timer = None;
            state.status.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
