//! Broadcast-channel bridge
//!
//! Bridges a `tokio::sync::broadcast` channel into the protocol. Each
//! subscriber gets its own receiver pumped by a spawned task registered at
//! subscribe time; events arriving while a subscriber has no demand are
//! dropped, lagged receivers skip the missed window, and channel close
//! completes the stream. The failure type is `Infallible`.

use std::convert::Infallible;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription};

/// Publisher fed by a broadcast channel
pub struct BroadcastPublisher<T> {
    sender: broadcast::Sender<T>,
    handle: Handle,
}

impl<T> Clone for BroadcastPublisher<T> {
    fn clone(&self) -> Self {
        BroadcastPublisher {
            sender: self.sender.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BroadcastPublisher<T> {
    /// A publisher over a fresh channel with the given ring capacity
    ///
    /// Panics outside of a tokio runtime, as [`Handle::current`] does.
    pub fn new(capacity: usize) -> BroadcastPublisher<T> {
        BroadcastPublisher::with_handle(capacity, Handle::current())
    }

    /// Like [`new`](BroadcastPublisher::new), on an explicit runtime handle
    pub fn with_handle(capacity: usize, handle: Handle) -> BroadcastPublisher<T> {
        let (sender, _) = broadcast::channel(capacity);
        BroadcastPublisher { sender, handle }
    }

    /// Broadcast an event
    ///
    /// Dropped silently when no subscriber is attached, as broadcast
    /// sources do.
    pub fn send(&self, value: T) {
        let _ = self.sender.send(value);
    }

    /// Number of live channel receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Publisher for BroadcastPublisher<T> {
    type Output = T;
    type Failure = Infallible;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = Infallible>,
    {
        let downstream = Arc::new(subscriber);
        let node = Arc::new(BridgeNode {
            state: Mutex::new(BridgeState {
                downstream: Some(Arc::clone(&downstream)),
                demand: Demand::NONE,
                pump: None,
                _marker: std::marker::PhantomData,
            }),
            delivery: ReentrantMutex::new(()),
        });

        // Register with the source before handing over the subscription.
        let mut receiver = self.sender.subscribe();
        let pump_node = Arc::clone(&node);
        let pump = self.handle.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(value) => pump_node.deliver(value),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Broadcast subscriber lagged, skipping");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        pump_node.complete();
                        break;
                    }
                }
            }
        });
        node.state.lock().pump = Some(pump);

        downstream.receive_subscription(AnySubscription::from_arc(node));
    }
}

struct BridgeNode<T, S> {
    state: Mutex<BridgeState<T, S>>,
    delivery: ReentrantMutex<()>,
}

struct BridgeState<T, S> {
    downstream: Option<Arc<S>>,
    demand: Demand,
    pump: Option<JoinHandle<()>>,
    // T appears only through the pump task.
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, S> BridgeNode<T, S>
where
    T: Clone + Send + 'static,
    S: Subscriber<Input = T, Failure = Infallible>,
{
    fn deliver(&self, value: T) {
        let downstream = {
            let mut state = self.state.lock();
            let Some(downstream) = state.downstream.clone() else {
                return;
            };
            if state.demand.is_none() {
                // No demand: broadcast events are dropped, not buffered.
                return;
            }
            state.demand -= Demand::max(1);
            downstream
        };
        let more = {
            let _delivery = self.delivery.lock();
            downstream.receive(value)
        };
        if !more.is_none() {
            self.state.lock().demand += more;
        }
    }

    fn complete(&self) {
        let downstream = {
            let mut state = self.state.lock();
            state.pump = None;
            state.downstream.take()
        };
        if let Some(downstream) = downstream {
            let _delivery = self.delivery.lock();
            downstream.receive_completion(Completion::Finished);
        }
    }
}

impl<T, S> Subscription for BridgeNode<T, S>
where
    T: Clone + Send + 'static,
    S: Subscriber<Input = T, Failure = Infallible>,
{
    fn request(&self, demand: Demand) {
        let mut state = self.state.lock();
        if state.downstream.is_none() {
            return;
        }
        state.demand += demand;
    }
}

impl<T, S> Cancellable for BridgeNode<T, S>
where
    T: Clone + Send + 'static,
    S: Subscriber<Input = T, Failure = Infallible>,
{
    fn cancel(&self) {
        let pump = {
            let mut state = self.state.lock();
            state.downstream = None;
            state.demand = Demand::NONE;
            state.pump.take()
        };
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}
