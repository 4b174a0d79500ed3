//! Pass-through broadcast hub
//!
//! Fans every sent value out to its conduits; a conduit with no
//! outstanding demand drops the value silently. Once a completion has been
//! sent the hub is inactive: further sends are no-ops, and late subscribers
//! get an empty subscription followed by the stored completion.

use std::convert::Infallible;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::hooks;
use crate::hub::FeederSet;
use crate::ident::NodeId;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription};

/// Multicast hub without a retained value
///
/// Cheaply cloneable handle; all clones share one conduit registry. The
/// hub's core stays alive while any conduit is attached, and cancels its
/// upstream feeders when the last reference drops.
pub struct PassthroughHub<O, E = Infallible> {
    core: Arc<PassCore<O, E>>,
}

impl<O, E> Clone for PassthroughHub<O, E> {
    fn clone(&self) -> Self {
        PassthroughHub {
            core: Arc::clone(&self.core),
        }
    }
}

impl<O, E> Default for PassthroughHub<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<O, E> PassthroughHub<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create an active hub with no conduits
    pub fn new() -> PassthroughHub<O, E> {
        PassthroughHub {
            core: Arc::new(PassCore {
                state: Mutex::new(PassState::Active(Vec::new())),
                feeders: FeederSet::new(),
            }),
        }
    }

    /// Multicast a value to every conduit with outstanding demand
    ///
    /// A no-op once the hub has observed a completion.
    pub fn send(&self, value: O) {
        let slots = {
            match &*self.core.state.lock() {
                PassState::Active(conduits) => conduits.clone(),
                PassState::Completed(_) => return,
            }
        };
        for slot in slots {
            slot.offer(&value);
        }
    }

    /// Terminate the hub, flushing the completion to all conduits
    ///
    /// The completion is captured and replayed to any later subscriber.
    pub fn send_completion(&self, completion: Completion<E>) {
        let slots = {
            let mut state = self.core.state.lock();
            match &mut *state {
                PassState::Completed(_) => return,
                PassState::Active(conduits) => {
                    let taken = std::mem::take(conduits);
                    *state = PassState::Completed(completion.clone());
                    taken
                }
            }
        };
        tracing::debug!(
            conduits = slots.len(),
            failed = completion.is_failure(),
            "Hub completed"
        );
        for slot in slots {
            slot.terminate(&completion);
        }
    }

    /// Retain an upstream feeder subscription and request unlimited demand
    pub fn send_subscription(&self, subscription: AnySubscription) {
        if matches!(&*self.core.state.lock(), PassState::Completed(_)) {
            subscription.cancel();
            return;
        }
        self.core.feeders.attach(subscription);
    }

    /// Number of currently attached downstream conduits
    ///
    /// Zero once the hub has completed.
    pub fn downstream_count(&self) -> usize {
        match &*self.core.state.lock() {
            PassState::Active(conduits) => conduits.len(),
            PassState::Completed(_) => 0,
        }
    }
}

impl<O, E> Publisher for PassthroughHub<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = O;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = O, Failure = E>,
    {
        let downstream = Arc::new(subscriber);
        let attached = {
            let mut state = self.core.state.lock();
            match &mut *state {
                PassState::Completed(completion) => Err(completion.clone()),
                PassState::Active(conduits) => {
                    let conduit = Arc::new(PassConduit {
                        id: NodeId::next(),
                        state: Mutex::new(ConduitState {
                            hub: Some(Arc::clone(&self.core)),
                            downstream: Some(Arc::clone(&downstream)),
                            demand: Demand::NONE,
                        }),
                        delivery: ReentrantMutex::new(()),
                    });
                    conduits.push(conduit.clone() as Arc<dyn PassSlot<O, E>>);
                    Ok(conduit)
                }
            }
        };
        match attached {
            Ok(conduit) => {
                if hooks::enabled() {
                    let id = conduit.id;
                    hooks::each(|h| h.will_subscribe("PassthroughHub", id));
                    downstream.receive_subscription(AnySubscription::from_arc(conduit));
                    hooks::each(|h| h.did_subscribe("PassthroughHub", id));
                } else {
                    downstream.receive_subscription(AnySubscription::from_arc(conduit));
                }
            }
            Err(completion) => {
                downstream.receive_subscription(AnySubscription::empty());
                downstream.receive_completion(completion);
            }
        }
    }
}

impl<O, E> Subscriber for PassthroughHub<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        self.send_subscription(subscription);
    }

    fn receive(&self, input: O) -> Demand {
        self.send(input);
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.send_completion(completion);
    }
}

struct PassCore<O, E> {
    state: Mutex<PassState<O, E>>,
    feeders: FeederSet,
}

impl<O, E> PassCore<O, E> {
    fn remove_conduit(&self, id: NodeId) {
        if let PassState::Active(conduits) = &mut *self.state.lock() {
            conduits.retain(|slot| slot.slot_id() != id);
        }
    }
}

enum PassState<O, E> {
    Active(Vec<Arc<dyn PassSlot<O, E>>>),
    Completed(Completion<E>),
}

/// Type-erased face of a conduit, as stored in the hub registry
trait PassSlot<O, E>: Send + Sync {
    fn slot_id(&self) -> NodeId;
    fn offer(&self, value: &O);
    fn terminate(&self, completion: &Completion<E>);
}

/// Per-downstream node owning the downstream and its demand counter
struct PassConduit<O, E, S> {
    id: NodeId,
    state: Mutex<ConduitState<O, E, S>>,
    /// Re-entrant: a downstream may synchronously send back into the hub
    /// from within `receive`, reaching this same conduit again.
    delivery: ReentrantMutex<()>,
}

struct ConduitState<O, E, S> {
    hub: Option<Arc<PassCore<O, E>>>,
    downstream: Option<Arc<S>>,
    demand: Demand,
}

impl<O, E, S> PassSlot<O, E> for PassConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn slot_id(&self) -> NodeId {
        self.id
    }

    fn offer(&self, value: &O) {
        let downstream = {
            let mut state = self.state.lock();
            let Some(downstream) = state.downstream.clone() else {
                return;
            };
            if state.demand.is_none() {
                // No demand: this conduit drops the value.
                return;
            }
            state.demand -= Demand::max(1);
            downstream
        };
        let more = {
            let _delivery = self.delivery.lock();
            downstream.receive(value.clone())
        };
        if !more.is_none() {
            self.state.lock().demand += more;
        }
    }

    fn terminate(&self, completion: &Completion<E>) {
        let downstream = {
            let mut state = self.state.lock();
            state.hub = None;
            state.downstream.take()
        };
        if let Some(downstream) = downstream {
            let _delivery = self.delivery.lock();
            downstream.receive_completion(completion.clone());
        }
    }
}

impl<O, E, S> Subscription for PassConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn request(&self, demand: Demand) {
        let mut state = self.state.lock();
        if state.downstream.is_none() {
            return;
        }
        state.demand += demand;
    }
}

impl<O, E, S> Cancellable for PassConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn cancel(&self) {
        let hub = {
            let mut state = self.state.lock();
            state.downstream = None;
            state.demand = Demand::NONE;
            state.hub.take()
        };
        if let Some(hub) = hub {
            tracing::trace!(conduit = %self.id, "Conduit detached");
            hub.remove_conduit(self.id);
        }
    }
}
