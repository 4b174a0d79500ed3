//! Quiescence operator
//!
//! Latches the most recent value and arms a timer for `due` in the future;
//! a newer value bumps the generation counter, which voids the earlier
//! timer when it fires. Only a timer whose generation is still current
//! delivers, and only if the downstream has demand. Upstream demand is
//! unlimited — the stage must see every value.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, SchedulerTime, StrideOf};
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Publisher returned by [`debounce`](crate::PublisherExt::debounce)
pub struct Debounce<U, Sch: Scheduler> {
    upstream: U,
    due: StrideOf<Sch>,
    scheduler: Sch,
    options: Option<Sch::Options>,
}

impl<U, Sch: Scheduler> Debounce<U, Sch> {
    pub(crate) fn new(upstream: U, due: StrideOf<Sch>, scheduler: Sch) -> Debounce<U, Sch> {
        Debounce {
            upstream,
            due,
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

impl<U: Clone, Sch: Scheduler> Clone for Debounce<U, Sch> {
    fn clone(&self) -> Self {
        Debounce {
            upstream: self.upstream.clone(),
            due: self.due,
            scheduler: self.scheduler.clone(),
            options: self.options.clone(),
        }
    }
}

impl<U, Sch> Publisher for Debounce<U, Sch>
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
        let stage = DebounceStage::new(
            subscriber,
            self.due,
            self.scheduler.clone(),
            self.options.clone(),
        );
        self.upstream.subscribe(stage);
    }
}

struct DebounceStage<S: Subscriber, Sch: Scheduler> {
    me: Weak<Self>,
    due: StrideOf<Sch>,
    scheduler: Sch,
    options: Option<Sch::Options>,
    downstream: S,
    state: Mutex<DebounceState<S::Input>>,
    delivery: ReentrantMutex<()>,
}

struct DebounceState<I> {
    status: SubscriptionStatus,
    latest: Option<I>,
    generation: u64,
    demand: Demand,
}

impl<S, Sch> DebounceStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn new(
        downstream: S,
        due: StrideOf<Sch>,
        scheduler: Sch,
        options: Option<Sch::Options>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| DebounceStage {
            me: me.clone(),
            due,
            scheduler,
            options,
            downstream,
            state: Mutex::new(DebounceState {
                status: SubscriptionStatus::Awaiting,
                latest: None,
                generation: 0,
                demand: Demand::NONE,
            }),
            delivery: ReentrantMutex::new(()),
        })
    }

    /// Timer body: deliver the latched value if this fire is still current
    fn timer_fired(&self, generation: u64) {
        let value = {
            let mut state = self.state.lock();
            if state.status.is_terminal() || state.generation != generation {
                return;
            }
            let Some(value) = state.latest.take() else {
                return;
            };
            if state.demand.is_none() {
                // No downstream demand: the quiesced value is dropped.
                return;
            }
            state.demand -= Demand::max(1);
            value
        };
        let more = {
            let _delivery = self.delivery.lock();
            self.downstream.receive(value)
        };
        if !more.is_none() {
            self.state.lock().demand += more;
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

impl<S, Sch> Subscriber for DebounceStage<S, Sch>
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
                    state.status = SubscriptionStatus::Subscribed(subscription.clone());
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
        subscription.request(Demand::UNLIMITED);
    }

    fn receive(&self, input: S::Input) -> Demand {
        let generation = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return Demand::NONE;
            }
            state.generation += 1;
            state.latest = Some(input);
            state.generation
        };
        let Some(me) = self.me.upgrade() else {
            return Demand::NONE;
        };
        let due = self.scheduler.now().advanced_by(self.due);
        self.scheduler.schedule_after(
            due,
            self.scheduler.min_tolerance(),
            self.options.as_ref(),
            Box::new(move || me.timer_fired(generation)),
        );
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<S::Failure>) {
        {
            let mut state = self.state.lock();
            match state.status.take() {
                Some(upstream) => {
                    // Void any in-flight timers and park pending.
                    state.generation += 1;
                    state.latest = None;
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

impl<S, Sch> Subscription for DebounceStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn request(&self, demand: Demand) {
        let mut state = self.state.lock();
        state.demand += demand;
    }
}

impl<S, Sch> Cancellable for DebounceStage<S, Sch>
where
    S: Subscriber,
    S::Input: Send + 'static,
    S::Failure: Send + 'static,
    Sch: Scheduler,
{
    fn cancel(&self) {
        let upstream = {
            let mut state = self.state.lock();
            state.latest = None;
            state.generation += 1;
            state.status.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
