//! The subscriber contract
//!
//! A `Subscriber` accepts, in order: one subscription, any number of values
//! bounded by the demand it granted, and at most one terminal. The erased
//! [`AnySubscriber`] wrapper forwards each call and carries the
//! introspection taps; it can also be assembled from plain closures.

use std::fmt;
use std::sync::Arc;

use crate::completion::Completion;
use crate::demand::Demand;
use crate::hooks;
use crate::ident::NodeId;
use crate::subscription::AnySubscription;

/// A consumer of a typed stream
///
/// Implementations must tolerate being called from multiple threads, but
/// calls for a single subscription are serialized by the upstream's
/// delivery lock.
pub trait Subscriber: Send + Sync + 'static {
    /// The value type this subscriber accepts
    type Input;
    /// The failure type this subscriber accepts
    type Failure;

    /// Upstream hands over the subscription handle
    ///
    /// Called exactly once, before any value. The subscriber must either
    /// retain the handle and eventually `request`, or cancel it; without a
    /// request no values will ever flow.
    fn receive_subscription(&self, subscription: AnySubscription);

    /// Deliver one value; the return is *additional* demand
    ///
    /// Returning `Demand::NONE` does not revoke outstanding demand.
    fn receive(&self, input: Self::Input) -> Demand;

    /// Deliver the terminal signal; no calls follow
    fn receive_completion(&self, completion: Completion<Self::Failure>);

    /// Erase into an [`AnySubscriber`]
    ///
    /// Erasing an `AnySubscriber` returns it unchanged.
    fn erase(self) -> AnySubscriber<Self::Input, Self::Failure>
    where
        Self: Sized,
        Self::Input: Send + 'static,
        Self::Failure: Send + 'static,
    {
        AnySubscriber::new(self)
    }
}

impl<T: Subscriber + ?Sized> Subscriber for Arc<T>
where
    Arc<T>: Send + Sync + 'static,
{
    type Input = T::Input;
    type Failure = T::Failure;

    fn receive_subscription(&self, subscription: AnySubscription) {
        (**self).receive_subscription(subscription)
    }

    fn receive(&self, input: Self::Input) -> Demand {
        (**self).receive(input)
    }

    fn receive_completion(&self, completion: Completion<Self::Failure>) {
        (**self).receive_completion(completion)
    }
}

/// Cloneable type-erased subscriber
pub struct AnySubscriber<I, E> {
    id: NodeId,
    inner: Arc<dyn Subscriber<Input = I, Failure = E>>,
}

impl<I, E> Clone for AnySubscriber<I, E> {
    fn clone(&self) -> Self {
        AnySubscriber {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: Send + 'static, E: Send + 'static> AnySubscriber<I, E> {
    /// Erase a concrete subscriber
    pub fn new(subscriber: impl Subscriber<Input = I, Failure = E>) -> AnySubscriber<I, E> {
        AnySubscriber {
            id: NodeId::next(),
            inner: Arc::new(subscriber),
        }
    }

    /// Erase an already shared subscriber without re-boxing
    pub fn from_arc(subscriber: Arc<dyn Subscriber<Input = I, Failure = E>>) -> AnySubscriber<I, E> {
        AnySubscriber {
            id: NodeId::next(),
            inner: subscriber,
        }
    }

    /// Build a subscriber from optional closures
    ///
    /// Absent closures default to no-ops; an absent value closure returns
    /// `Demand::NONE`.
    pub fn from_handlers(handlers: Handlers<I, E>) -> AnySubscriber<I, E> {
        AnySubscriber::new(handlers)
    }

    /// This wrapper's identity
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl<I: Send + 'static, E: Send + 'static> Subscriber for AnySubscriber<I, E> {
    type Input = I;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        self.inner.receive_subscription(subscription);
    }

    fn receive(&self, input: I) -> Demand {
        if hooks::enabled() {
            hooks::each(|h| h.will_receive_value(self.id));
        }
        let returned = self.inner.receive(input);
        if hooks::enabled() {
            hooks::each(|h| h.did_receive_value(self.id, returned));
        }
        returned
    }

    fn receive_completion(&self, completion: Completion<E>) {
        if hooks::enabled() {
            hooks::each(|h| h.will_receive_completion(self.id));
        }
        self.inner.receive_completion(completion);
        if hooks::enabled() {
            hooks::each(|h| h.did_receive_completion(self.id));
        }
    }

    fn erase(self) -> AnySubscriber<I, E> {
        self
    }
}

impl<I, E> fmt::Debug for AnySubscriber<I, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySubscriber").field("id", &self.id).finish()
    }
}

/// Optional closure bundle for [`AnySubscriber::from_handlers`]
pub struct Handlers<I, E> {
    /// Called with the subscription handle
    pub on_subscription: Option<Box<dyn Fn(AnySubscription) + Send + Sync>>,
    /// Called per value; the return is additional demand
    pub on_value: Option<Box<dyn Fn(I) -> Demand + Send + Sync>>,
    /// Called with the terminal signal
    pub on_completion: Option<Box<dyn Fn(Completion<E>) + Send + Sync>>,
}

impl<I, E> Default for Handlers<I, E> {
    fn default() -> Self {
        Handlers {
            on_subscription: None,
            on_value: None,
            on_completion: None,
        }
    }
}

impl<I: Send + 'static, E: Send + 'static> Subscriber for Handlers<I, E> {
    type Input = I;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        if let Some(on_subscription) = &self.on_subscription {
            on_subscription(subscription);
        }
    }

    fn receive(&self, input: I) -> Demand {
        match &self.on_value {
            Some(on_value) => on_value(input),
            None => Demand::NONE,
        }
    }

    fn receive_completion(&self, completion: Completion<E>) {
        if let Some(on_completion) = &self.on_completion {
            on_completion(completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_handlers_default_to_noops() {
        let handlers: Handlers<i32, &'static str> = Handlers::default();
        let erased = AnySubscriber::from_handlers(handlers);
        erased.receive_subscription(AnySubscription::empty());
        assert_eq!(erased.receive(1), Demand::NONE);
        erased.receive_completion(Completion::Finished);
    }

    #[test]
    fn test_handlers_forward() {
        let seen: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_values = Arc::clone(&seen);
        let erased = AnySubscriber::from_handlers(Handlers::<i32, &'static str> {
            on_subscription: None,
            on_value: Some(Box::new(move |v| {
                seen_values.lock().push(v);
                Demand::max(1)
            })),
            on_completion: None,
        });
        assert_eq!(erased.receive(7), Demand::max(1));
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let erased = AnySubscriber::from_handlers(Handlers::<i32, &'static str>::default());
        let id = erased.id();
        let again = erased.erase();
        assert_eq!(again.id(), id);
    }
}
