//! Current-value broadcast hub
//!
//! Like the pass-through hub, but carries an initial value and retains the
//! most recent one. A freshly attached conduit synthesizes a delivery of
//! the current value on its first non-zero request; a conduit that had no
//! demand when a value arrived is re-armed to deliver the latest value once
//! demand shows up. The value is also readable and writable directly.

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

/// Multicast hub that retains its latest value
pub struct CurrentValueHub<O, E = Infallible> {
    core: Arc<ValueCore<O, E>>,
}

impl<O, E> Clone for CurrentValueHub<O, E> {
    fn clone(&self) -> Self {
        CurrentValueHub {
            core: Arc::clone(&self.core),
        }
    }
}

impl<O, E> CurrentValueHub<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create a hub seeded with an initial value
    pub fn new(initial: O) -> CurrentValueHub<O, E> {
        CurrentValueHub {
            core: Arc::new(ValueCore {
                value: Mutex::new(initial),
                state: Mutex::new(ValueState::Active(Vec::new())),
                feeders: FeederSet::new(),
            }),
        }
    }

    /// Read the retained value
    ///
    /// Remains readable after the hub has completed.
    pub fn value(&self) -> O {
        self.core.value.lock().clone()
    }

    /// Replace the retained value and broadcast it
    pub fn set_value(&self, value: O) {
        self.send(value);
    }

    /// Send a value: retain it, then multicast to conduits with demand
    ///
    /// A no-op once the hub has observed a completion.
    pub fn send(&self, value: O) {
        let slots = {
            let state = self.core.state.lock();
            match &*state {
                ValueState::Completed(_) => return,
                ValueState::Active(conduits) => {
                    *self.core.value.lock() = value.clone();
                    conduits.clone()
                }
            }
        };
        for slot in slots {
            slot.offer(&value);
        }
    }

    /// Terminate the hub, flushing the completion to all conduits
    pub fn send_completion(&self, completion: Completion<E>) {
        let slots = {
            let mut state = self.core.state.lock();
            match &mut *state {
                ValueState::Completed(_) => return,
                ValueState::Active(conduits) => {
                    let taken = std::mem::take(conduits);
                    *state = ValueState::Completed(completion.clone());
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
        if matches!(&*self.core.state.lock(), ValueState::Completed(_)) {
            subscription.cancel();
            return;
        }
        self.core.feeders.attach(subscription);
    }
}

impl<O, E> Publisher for CurrentValueHub<O, E>
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
                ValueState::Completed(completion) => Err(completion.clone()),
                ValueState::Active(conduits) => {
                    let conduit = Arc::new(ValueConduit {
                        id: NodeId::next(),
                        state: Mutex::new(ConduitState {
                            hub: Some(Arc::clone(&self.core)),
                            downstream: Some(Arc::clone(&downstream)),
                            demand: Demand::NONE,
                            delivered_current: false,
                        }),
                        delivery: ReentrantMutex::new(()),
                    });
                    conduits.push(conduit.clone() as Arc<dyn ValueSlot<O, E>>);
                    Ok(conduit)
                }
            }
        };
        match attached {
            Ok(conduit) => {
                if hooks::enabled() {
                    let id = conduit.id;
                    hooks::each(|h| h.will_subscribe("CurrentValueHub", id));
                    downstream.receive_subscription(AnySubscription::from_arc(conduit));
                    hooks::each(|h| h.did_subscribe("CurrentValueHub", id));
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

impl<O, E> Subscriber for CurrentValueHub<O, E>
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

struct ValueCore<O, E> {
    /// Retained value; lock order is `state` before `value` on the send
    /// path, and conduit-state before `value` on the request path. `value`
    /// is never held across a call into a conduit or a downstream.
    value: Mutex<O>,
    state: Mutex<ValueState<O, E>>,
    feeders: FeederSet,
}

impl<O, E> ValueCore<O, E> {
    fn remove_conduit(&self, id: NodeId) {
        if let ValueState::Active(conduits) = &mut *self.state.lock() {
            conduits.retain(|slot| slot.slot_id() != id);
        }
    }
}

enum ValueState<O, E> {
    Active(Vec<Arc<dyn ValueSlot<O, E>>>),
    Completed(Completion<E>),
}

trait ValueSlot<O, E>: Send + Sync {
    fn slot_id(&self) -> NodeId;
    fn offer(&self, value: &O);
    fn terminate(&self, completion: &Completion<E>);
}

struct ValueConduit<O, E, S> {
    id: NodeId,
    state: Mutex<ConduitState<O, E, S>>,
    delivery: ReentrantMutex<()>,
}

struct ConduitState<O, E, S> {
    hub: Option<Arc<ValueCore<O, E>>>,
    downstream: Option<Arc<S>>,
    demand: Demand,
    /// False while the latest retained value has not reached this conduit
    delivered_current: bool,
}

impl<O, E, S> ValueSlot<O, E> for ValueConduit<O, E, S>
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
                // Defer: the retained value will be synthesized on the
                // next request.
                state.delivered_current = false;
                return;
            }
            state.demand -= Demand::max(1);
            state.delivered_current = true;
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

impl<O, E, S> Subscription for ValueConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn request(&self, demand: Demand) {
        let pending = {
            let mut state = self.state.lock();
            let Some(downstream) = state.downstream.clone() else {
                return;
            };
            state.demand += demand;
            if state.delivered_current || state.demand.is_none() {
                None
            } else {
                let Some(hub) = state.hub.clone() else {
                    return;
                };
                state.delivered_current = true;
                state.demand -= Demand::max(1);
                let value = hub.value.lock().clone();
                Some((downstream, value))
            }
        };
        if let Some((downstream, value)) = pending {
            let more = {
                let _delivery = self.delivery.lock();
                downstream.receive(value)
            };
            if !more.is_none() {
                self.state.lock().demand += more;
            }
        }
    }
}

impl<O, E, S> Cancellable for ValueConduit<O, E, S>
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
