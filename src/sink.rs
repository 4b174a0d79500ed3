//! Closure-based terminal subscriber
//!
//! A [`Sink`] attaches to the end of a pipeline, requests unlimited demand,
//! and forwards every value and the terminal to user closures. It is
//! cancellable, and clears its retained subscription on terminal so no
//! reference cycle outlives the pipeline.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cancel::{AnyCancellable, Cancellable};
use crate::completion::Completion;
use crate::demand::Demand;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Subscriber that drains a pipeline with unlimited demand
pub struct Sink<I, E> {
    on_value: Box<dyn Fn(I) + Send + Sync>,
    on_completion: Box<dyn Fn(Completion<E>) + Send + Sync>,
    status: Mutex<SubscriptionStatus>,
}

impl<I: Send + 'static, E: Send + 'static> Sink<I, E> {
    /// Build a sink from a value closure and a completion closure
    pub fn new(
        on_value: impl Fn(I) + Send + Sync + 'static,
        on_completion: impl Fn(Completion<E>) + Send + Sync + 'static,
    ) -> Sink<I, E> {
        Sink {
            on_value: Box::new(on_value),
            on_completion: Box::new(on_completion),
            status: Mutex::new(SubscriptionStatus::Awaiting),
        }
    }

    /// Build a sink that ignores the terminal
    pub fn values(on_value: impl Fn(I) + Send + Sync + 'static) -> Sink<I, E> {
        Sink::new(on_value, |_| {})
    }
}

impl<I: Send + 'static, E: Send + 'static> Subscriber for Sink<I, E> {
    type Input = I;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        let mut status = self.status.lock();
        match &*status {
            SubscriptionStatus::Awaiting => {
                *status = SubscriptionStatus::Subscribed(subscription.clone());
                drop(status);
                // Request outside the lock: a current-value upstream may
                // deliver synchronously from within this call.
                subscription.request(Demand::UNLIMITED);
            }
            _ => {
                drop(status);
                subscription.cancel();
            }
        }
    }

    fn receive(&self, input: I) -> Demand {
        if self.status.lock().is_terminal() {
            return Demand::NONE;
        }
        (self.on_value)(input);
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        {
            let mut status = self.status.lock();
            if status.is_terminal() {
                return;
            }
            // The upstream delivered a terminal; drop our handle without
            // cancelling it.
            status.take();
        }
        (self.on_completion)(completion);
    }
}

impl<I: Send + 'static, E: Send + 'static> Cancellable for Sink<I, E> {
    fn cancel(&self) {
        let taken = self.status.lock().take();
        if let Some(subscription) = taken {
            subscription.cancel();
        }
    }
}

/// Subscribe a freshly built sink and hand back its cancellation token
pub(crate) fn attach_sink<P, I, E>(
    publisher: &P,
    on_value: impl Fn(I) + Send + Sync + 'static,
    on_completion: impl Fn(Completion<E>) + Send + Sync + 'static,
) -> AnyCancellable
where
    P: crate::publisher::Publisher<Output = I, Failure = E> + ?Sized,
    I: Send + 'static,
    E: Send + 'static,
{
    let sink = Arc::new(Sink::new(on_value, on_completion));
    publisher.subscribe(Arc::clone(&sink));
    AnyCancellable::new(move || sink.cancel())
}
