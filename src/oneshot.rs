//! Single-shot memoized producer
//!
//! A [`OneShot`] runs its fulfill closure eagerly at construction and
//! memoizes the one `Result` handed to the [`Resolver`]. Every subscriber,
//! early or late, receives an active subscription; a success is delivered
//! on the first non-zero request followed by `Finished`, while a failure is
//! delivered regardless of demand — errors bypass backpressure.

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::hooks;
use crate::ident::NodeId;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription};

/// Eagerly fulfilled, memoized single-result publisher
pub struct OneShot<O, E> {
    core: Arc<CacheCore<O, E>>,
}

impl<O, E> Clone for OneShot<O, E> {
    fn clone(&self) -> Self {
        OneShot {
            core: Arc::clone(&self.core),
        }
    }
}

/// The promise handed to a [`OneShot`] fulfill closure
///
/// Resolving twice is a no-op; the first result wins.
pub struct Resolver<O, E> {
    core: Arc<CacheCore<O, E>>,
}

impl<O, E> Clone for Resolver<O, E> {
    fn clone(&self) -> Self {
        Resolver {
            core: Arc::clone(&self.core),
        }
    }
}

impl<O, E> OneShot<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Construct the cache and invoke `fulfill` immediately
    ///
    /// The closure receives the [`Resolver`] and may resolve synchronously
    /// or hand the resolver to another thread or task.
    pub fn new(fulfill: impl FnOnce(Resolver<O, E>)) -> OneShot<O, E> {
        let core = Arc::new(CacheCore {
            state: Mutex::new(CacheState::Pending(Vec::new())),
        });
        fulfill(Resolver {
            core: Arc::clone(&core),
        });
        OneShot { core }
    }

    /// The memoized result, if resolution has happened
    pub fn peek(&self) -> Option<Result<O, E>> {
        match &*self.core.state.lock() {
            CacheState::Pending(_) => None,
            CacheState::Resolved(result) => Some(result.clone()),
        }
    }

    /// Await the result
    ///
    /// Installs a one-shot subscriber that requests exactly one value and
    /// resumes at most once, on the value or on failure.
    pub async fn value(&self) -> Result<O, E> {
        crate::bridge::first_value(self)
            .await
            .map(|value| value.expect("single-shot cache finished without a value"))
    }
}

impl<O, E> Resolver<O, E>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Store the result and flush it to every waiting conduit
    ///
    /// Ignored if the cache is already resolved.
    pub fn resolve(&self, result: Result<O, E>) {
        let slots = {
            let mut state = self.core.state.lock();
            match &mut *state {
                CacheState::Resolved(_) => return,
                CacheState::Pending(slots) => {
                    let taken = std::mem::take(slots);
                    *state = CacheState::Resolved(result.clone());
                    taken
                }
            }
        };
        tracing::debug!(
            waiting = slots.len(),
            ok = result.is_ok(),
            "Single-shot cache resolved"
        );
        for slot in slots {
            slot.fulfill(&result);
        }
    }
}

impl<O, E> Publisher for OneShot<O, E>
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
        let conduit = Arc::new(CacheConduit {
            id: NodeId::next(),
            state: Mutex::new(ConduitState::Active {
                core: Arc::clone(&self.core),
                downstream: Arc::clone(&downstream),
                has_demand: false,
            }),
            delivery: ReentrantMutex::new(()),
        });

        let stored_failure = {
            let mut state = self.core.state.lock();
            match &mut *state {
                CacheState::Pending(slots) => {
                    slots.push(conduit.clone() as Arc<dyn CacheSlot<O, E>>);
                    None
                }
                // Success replay waits for demand; failure bypasses it.
                CacheState::Resolved(Err(error)) => Some(error.clone()),
                CacheState::Resolved(Ok(_)) => None,
            }
        };

        if hooks::enabled() {
            let id = conduit.id;
            hooks::each(|h| h.will_subscribe("OneShot", id));
            downstream.receive_subscription(AnySubscription::from_arc(conduit.clone()));
            hooks::each(|h| h.did_subscribe("OneShot", id));
        } else {
            downstream.receive_subscription(AnySubscription::from_arc(conduit.clone()));
        }

        if let Some(error) = stored_failure {
            conduit.deliver(&Err(error));
        }
    }
}

struct CacheCore<O, E> {
    state: Mutex<CacheState<O, E>>,
}

impl<O, E> CacheCore<O, E> {
    fn remove_conduit(&self, id: NodeId) {
        if let CacheState::Pending(slots) = &mut *self.state.lock() {
            slots.retain(|slot| slot.slot_id() != id);
        }
    }
}

enum CacheState<O, E> {
    Pending(Vec<Arc<dyn CacheSlot<O, E>>>),
    Resolved(Result<O, E>),
}

trait CacheSlot<O, E>: Send + Sync {
    fn slot_id(&self) -> NodeId;
    fn fulfill(&self, result: &Result<O, E>);
}

struct CacheConduit<O, E, S> {
    id: NodeId,
    state: Mutex<ConduitState<O, E, S>>,
    delivery: ReentrantMutex<()>,
}

enum ConduitState<O, E, S> {
    Active {
        core: Arc<CacheCore<O, E>>,
        downstream: Arc<S>,
        has_demand: bool,
    },
    Terminal,
}

impl<O, E, S> CacheConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    /// Deliver the memoized result if this conduit is allowed to
    ///
    /// A success needs `has_demand`; a failure goes through regardless.
    fn deliver(&self, result: &Result<O, E>) {
        let downstream = {
            let mut state = self.state.lock();
            match &mut *state {
                ConduitState::Terminal => return,
                ConduitState::Active {
                    downstream,
                    has_demand,
                    ..
                } => {
                    if result.is_ok() && !*has_demand {
                        return;
                    }
                    let downstream = Arc::clone(downstream);
                    *state = ConduitState::Terminal;
                    downstream
                }
            }
        };
        let _delivery = self.delivery.lock();
        match result {
            Ok(value) => {
                downstream.receive(value.clone());
                downstream.receive_completion(Completion::Finished);
            }
            Err(error) => {
                downstream.receive_completion(Completion::Failure(error.clone()));
            }
        }
    }
}

impl<O, E, S> CacheSlot<O, E> for CacheConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn slot_id(&self) -> NodeId {
        self.id
    }

    fn fulfill(&self, result: &Result<O, E>) {
        self.deliver(result);
    }
}

impl<O, E, S> Subscription for CacheConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn request(&self, _demand: Demand) {
        let resolved = {
            let mut state = self.state.lock();
            match &mut *state {
                ConduitState::Terminal => return,
                ConduitState::Active {
                    core, has_demand, ..
                } => {
                    *has_demand = true;
                    match &*core.state.lock() {
                        CacheState::Pending(_) => None,
                        CacheState::Resolved(result) => Some(result.clone()),
                    }
                }
            }
        };
        if let Some(result) = resolved {
            self.deliver(&result);
        }
    }
}

impl<O, E, S> Cancellable for CacheConduit<O, E, S>
where
    O: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Subscriber<Input = O, Failure = E>,
{
    fn cancel(&self) {
        let core = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ConduitState::Terminal) {
                ConduitState::Terminal => None,
                ConduitState::Active { core, .. } => Some(core),
            }
        };
        if let Some(core) = core {
            core.remove_conduit(self.id);
        }
    }
}
