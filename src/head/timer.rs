//! Connectable periodic timer
//!
//! Emits the scheduler's current time on every fire, multicast to all
//! registered subscribers with per-subscription demand: a subscriber with
//! no outstanding demand misses that tick. `subscribe` only registers;
//! the timer starts at `connect` and stops when the returned token drops.

use std::convert::Infallible;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::{AnyCancellable, Cancellable};
use crate::demand::Demand;
use crate::head::Connectable;
use crate::ident::NodeId;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, SchedulerTime, StrideOf};
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription};

/// Connectable publisher of periodic timestamps
pub struct TimerPublisher<Sch: Scheduler> {
    core: Arc<TimerCore<Sch>>,
}

impl<Sch: Scheduler> Clone for TimerPublisher<Sch> {
    fn clone(&self) -> Self {
        TimerPublisher {
            core: Arc::clone(&self.core),
        }
    }
}

impl<Sch: Scheduler> TimerPublisher<Sch> {
    /// A timer that will fire every `interval` once connected
    pub fn new(interval: StrideOf<Sch>, scheduler: Sch) -> TimerPublisher<Sch> {
        TimerPublisher {
            core: Arc::new(TimerCore {
                scheduler,
                interval,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.lock().len()
    }
}

impl<Sch: Scheduler> Publisher for TimerPublisher<Sch> {
    type Output = Sch::Time;
    type Failure = Infallible;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Sch::Time, Failure = Infallible>,
    {
        let downstream = Arc::new(subscriber);
        let node = Arc::new(TickNode {
            id: NodeId::next(),
            state: Mutex::new(TickState {
                core: Some(Arc::clone(&self.core)),
                downstream: Some(Arc::clone(&downstream)),
                demand: Demand::NONE,
            }),
            delivery: ReentrantMutex::new(()),
        });
        self.core
            .subscribers
            .lock()
            .push(node.clone() as Arc<dyn TickSlot<Sch>>);
        downstream.receive_subscription(AnySubscription::from_arc(node));
    }
}

impl<Sch: Scheduler> Connectable for TimerPublisher<Sch> {
    fn connect(&self) -> AnyCancellable {
        let tick_core = Arc::clone(&self.core);
        let start = self
            .core
            .scheduler
            .now()
            .advanced_by(self.core.interval);
        let timer = self.core.scheduler.schedule_repeating(
            start,
            self.core.interval,
            self.core.scheduler.min_tolerance(),
            None,
            Box::new(move || {
                let tick = tick_core.scheduler.now();
                let slots = tick_core.subscribers.lock().clone();
                for slot in slots {
                    slot.offer(&tick);
                }
            }),
        );
        tracing::debug!("Timer connected");
        let core = Arc::clone(&self.core);
        AnyCancellable::new(move || {
            drop(timer);
            let slots = std::mem::take(&mut *core.subscribers.lock());
            for slot in slots {
                slot.shutdown();
            }
            tracing::debug!("Timer disconnected");
        })
    }
}

struct TimerCore<Sch: Scheduler> {
    scheduler: Sch,
    interval: StrideOf<Sch>,
    subscribers: Mutex<Vec<Arc<dyn TickSlot<Sch>>>>,
}

impl<Sch: Scheduler> TimerCore<Sch> {
    fn remove(&self, id: NodeId) {
        self.subscribers.lock().retain(|slot| slot.slot_id() != id);
    }
}

trait TickSlot<Sch: Scheduler>: Send + Sync {
    fn slot_id(&self) -> NodeId;
    fn offer(&self, tick: &Sch::Time);
    fn shutdown(&self);
}

struct TickNode<Sch: Scheduler, S> {
    id: NodeId,
    state: Mutex<TickState<Sch, S>>,
    delivery: ReentrantMutex<()>,
}

struct TickState<Sch: Scheduler, S> {
    core: Option<Arc<TimerCore<Sch>>>,
    downstream: Option<Arc<S>>,
    demand: Demand,
}

impl<Sch, S> TickSlot<Sch> for TickNode<Sch, S>
where
    Sch: Scheduler,
    S: Subscriber<Input = Sch::Time, Failure = Infallible>,
{
    fn slot_id(&self) -> NodeId {
        self.id
    }

    fn offer(&self, tick: &Sch::Time) {
        let downstream = {
            let mut state = self.state.lock();
            let Some(downstream) = state.downstream.clone() else {
                return;
            };
            if state.demand.is_none() {
                // This subscriber misses the tick.
                return;
            }
            state.demand -= Demand::max(1);
            downstream
        };
        let more = {
            let _delivery = self.delivery.lock();
            downstream.receive(tick.clone())
        };
        if !more.is_none() {
            self.state.lock().demand += more;
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.core = None;
        state.downstream = None;
        state.demand = Demand::NONE;
    }
}

impl<Sch, S> Subscription for TickNode<Sch, S>
where
    Sch: Scheduler,
    S: Subscriber<Input = Sch::Time, Failure = Infallible>,
{
    fn request(&self, demand: Demand) {
        let mut state = self.state.lock();
        if state.downstream.is_none() {
            return;
        }
        state.demand += demand;
    }
}

impl<Sch, S> Cancellable for TickNode<Sch, S>
where
    Sch: Scheduler,
    S: Subscriber<Input = Sch::Time, Failure = Infallible>,
{
    fn cancel(&self) {
        let core = {
            let mut state = self.state.lock();
            state.downstream = None;
            state.demand = Demand::NONE;
            state.core.take()
        };
        if let Some(core) = core {
            core.remove(self.id);
        }
    }
}
