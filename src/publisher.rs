//! The publisher contract
//!
//! A `Publisher` attaches subscribers; everything else — demand, values,
//! terminals — flows through the subscription it hands back. Operator
//! chains are constructed from the downstream terminus up to the source:
//! each operator's `subscribe` is invoked by the operator downstream of it.

use std::fmt;
use std::sync::Arc;

use crate::hooks;
use crate::subscriber::{AnySubscriber, Subscriber};

/// A producer of a typed sequence of values and one terminal
pub trait Publisher {
    /// The values this publisher emits
    type Output;
    /// The failure type this publisher can terminate with
    type Failure;

    /// Attach `subscriber` to this publisher
    ///
    /// Constructs whatever internal node the pipeline needs, hands a
    /// subscription to the subscriber, and arranges for values to flow in
    /// response to `request`. No value flows before the subscriber
    /// requests.
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Self::Output, Failure = Self::Failure>;

    /// Erase into an [`AnyPublisher`]
    ///
    /// Erasing an `AnyPublisher` returns it unchanged.
    fn erase(self) -> AnyPublisher<Self::Output, Self::Failure>
    where
        Self: Sized + Send + Sync + 'static,
        Self::Output: Send + 'static,
        Self::Failure: Send + 'static,
    {
        AnyPublisher::new(self)
    }
}

/// Object-safe face of [`Publisher`] used by the erased wrapper
trait ErasedPublisher<O, E>: Send + Sync {
    fn subscribe_erased(&self, subscriber: AnySubscriber<O, E>);
}

impl<P> ErasedPublisher<P::Output, P::Failure> for P
where
    P: Publisher + Send + Sync,
    P::Output: Send + 'static,
    P::Failure: Send + 'static,
{
    fn subscribe_erased(&self, subscriber: AnySubscriber<P::Output, P::Failure>) {
        self.subscribe(subscriber);
    }
}

/// Cloneable type-erased publisher
pub struct AnyPublisher<O, E> {
    inner: Arc<dyn ErasedPublisher<O, E>>,
}

impl<O, E> Clone for AnyPublisher<O, E> {
    fn clone(&self) -> Self {
        AnyPublisher {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Send + 'static, E: Send + 'static> AnyPublisher<O, E> {
    /// Erase a concrete publisher
    pub fn new<P>(publisher: P) -> AnyPublisher<O, E>
    where
        P: Publisher<Output = O, Failure = E> + Send + Sync + 'static,
    {
        AnyPublisher {
            inner: Arc::new(publisher),
        }
    }
}

impl<O: Send + 'static, E: Send + 'static> Publisher for AnyPublisher<O, E> {
    type Output = O;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = O, Failure = E>,
    {
        let erased = subscriber.erase();
        if hooks::enabled() {
            let id = erased.id();
            hooks::each(|h| h.will_subscribe("AnyPublisher", id));
            self.inner.subscribe_erased(erased);
            hooks::each(|h| h.did_subscribe("AnyPublisher", id));
        } else {
            self.inner.subscribe_erased(erased);
        }
    }

    fn erase(self) -> AnyPublisher<O, E> {
        self
    }
}

impl<O, E> fmt::Debug for AnyPublisher<O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyPublisher").finish_non_exhaustive()
    }
}
