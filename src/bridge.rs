//! Async interop
//!
//! Two bridges out of the protocol: [`first_value`] awaits a pipeline's
//! first value (or terminal) by installing a one-shot subscriber that
//! requests exactly one and resumes its continuation at most once, and
//! [`values`] exposes a pipeline as a [`futures::Stream`] with strict
//! one-at-a-time demand.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures::Stream;
use parking_lot::Mutex;

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription};

/// Await the first value of `publisher`
///
/// Resolves to `Ok(Some(value))` on the first value, `Ok(None)` if the
/// stream finishes without one, and `Err(e)` on failure. The installed
/// subscriber requests exactly one value and cancels the upstream once
/// resolved.
pub fn first_value<P>(publisher: &P) -> FirstValue<P::Output, P::Failure>
where
    P: Publisher + ?Sized,
    P::Output: Send + 'static,
    P::Failure: Send + 'static,
{
    let shared = Arc::new(Mutex::new(OnceShared {
        subscription: None,
        outcome: None,
        waker: None,
        resumed: false,
    }));
    publisher.subscribe(Arc::new(OnceSubscriber {
        shared: Arc::clone(&shared),
    }));
    FirstValue { shared }
}

/// Future returned by [`first_value`]
pub struct FirstValue<O, E> {
    shared: Arc<Mutex<OnceShared<O, E>>>,
}

struct OnceShared<O, E> {
    subscription: Option<AnySubscription>,
    outcome: Option<Result<Option<O>, E>>,
    waker: Option<Waker>,
    resumed: bool,
}

struct OnceSubscriber<O, E> {
    shared: Arc<Mutex<OnceShared<O, E>>>,
}

impl<O, E> OnceSubscriber<O, E>
where
    O: Send + 'static,
    E: Send + 'static,
{
    /// Settle the continuation; only the first settlement counts
    fn resume(&self, outcome: Result<Option<O>, E>, cancel_upstream: bool) {
        let (subscription, waker) = {
            let mut shared = self.shared.lock();
            if shared.resumed {
                return;
            }
            shared.resumed = true;
            shared.outcome = Some(outcome);
            (shared.subscription.take(), shared.waker.take())
        };
        if cancel_upstream {
            if let Some(subscription) = subscription {
                subscription.cancel();
            }
        }
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<O, E> Subscriber for OnceSubscriber<O, E>
where
    O: Send + 'static,
    E: Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        {
            let mut shared = self.shared.lock();
            if shared.resumed {
                drop(shared);
                subscription.cancel();
                return;
            }
            shared.subscription = Some(subscription.clone());
        }
        subscription.request(Demand::max(1));
    }

    fn receive(&self, input: O) -> Demand {
        self.resume(Ok(Some(input)), true);
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        match completion {
            Completion::Finished => self.resume(Ok(None), false),
            Completion::Failure(error) => self.resume(Err(error), false),
        }
    }
}

impl<O, E> Future for FirstValue<O, E> {
    type Output = Result<Option<O>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.lock();
        match shared.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                shared.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// Expose `publisher` as a `futures::Stream`
///
/// The stream pulls one value per poll: demand is requested lazily, so the
/// upstream never runs ahead of the consumer by more than one item.
/// Dropping the stream cancels the pipeline.
pub fn values<P>(publisher: &P) -> ValueStream<P::Output, P::Failure>
where
    P: Publisher + ?Sized,
    P::Output: Send + 'static,
    P::Failure: Send + 'static,
{
    let shared = Arc::new(Mutex::new(StreamShared {
        subscription: None,
        queue: VecDeque::new(),
        terminal: TerminalState::Active,
        waker: None,
        outstanding: 0,
    }));
    publisher.subscribe(Arc::new(StreamSubscriber {
        shared: Arc::clone(&shared),
    }));
    ValueStream { shared }
}

/// Stream returned by [`values`]
pub struct ValueStream<O, E> {
    shared: Arc<Mutex<StreamShared<O, E>>>,
}

enum TerminalState<E> {
    Active,
    Failed(E),
    Done,
}

struct StreamShared<O, E> {
    subscription: Option<AnySubscription>,
    queue: VecDeque<O>,
    terminal: TerminalState<E>,
    waker: Option<Waker>,
    outstanding: usize,
}

struct StreamSubscriber<O, E> {
    shared: Arc<Mutex<StreamShared<O, E>>>,
}

impl<O, E> Subscriber for StreamSubscriber<O, E>
where
    O: Send + 'static,
    E: Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&self, subscription: AnySubscription) {
        let mut shared = self.shared.lock();
        if shared.subscription.is_some() {
            drop(shared);
            subscription.cancel();
            return;
        }
        shared.subscription = Some(subscription);
        let waker = shared.waker.take();
        drop(shared);
        if let Some(waker) = waker {
            // A poll may have happened before the attach completed.
            waker.wake();
        }
    }

    fn receive(&self, input: O) -> Demand {
        let waker = {
            let mut shared = self.shared.lock();
            shared.outstanding = shared.outstanding.saturating_sub(1);
            shared.queue.push_back(input);
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        let waker = {
            let mut shared = self.shared.lock();
            shared.terminal = match completion {
                Completion::Finished => TerminalState::Done,
                Completion::Failure(error) => TerminalState::Failed(error),
            };
            shared.subscription = None;
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<O, E> Stream for ValueStream<O, E>
where
    O: Send + 'static,
    E: Send + 'static,
{
    type Item = Result<O, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let mut shared = this.shared.lock();
            if let Some(value) = shared.queue.pop_front() {
                return Poll::Ready(Some(Ok(value)));
            }
            match std::mem::replace(&mut shared.terminal, TerminalState::Active) {
                TerminalState::Done => {
                    shared.terminal = TerminalState::Done;
                    return Poll::Ready(None);
                }
                TerminalState::Failed(error) => {
                    // Yield the failure once, then end.
                    shared.terminal = TerminalState::Done;
                    return Poll::Ready(Some(Err(error)));
                }
                TerminalState::Active => {}
            }
            shared.waker = Some(cx.waker().clone());
            if shared.outstanding == 0 {
                if let Some(subscription) = shared.subscription.clone() {
                    shared.outstanding += 1;
                    drop(shared);
                    subscription.request(Demand::max(1));
                    // A synchronous upstream may have delivered already.
                    continue;
                }
            }
            return Poll::Pending;
        }
    }
}

impl<O, E> Drop for ValueStream<O, E> {
    fn drop(&mut self) {
        let subscription = self.shared.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{CurrentValueHub, PassthroughHub};
    use crate::oneshot::OneShot;
    use futures::StreamExt;

    #[test]
    fn test_first_value_from_resolved_oneshot() {
        let cache: OneShot<i32, &'static str> = OneShot::new(|r| r.resolve(Ok(42)));
        let result = tokio_test::block_on(first_value(&cache));
        assert_eq!(result, Ok(Some(42)));
    }

    #[test]
    fn test_first_value_failure() {
        let cache: OneShot<i32, &'static str> = OneShot::new(|r| r.resolve(Err("nope")));
        let result = tokio_test::block_on(first_value(&cache));
        assert_eq!(result, Err("nope"));
    }

    #[test]
    fn test_first_value_finished_without_value() {
        let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
        hub.send_completion(Completion::Finished);
        let result = tokio_test::block_on(first_value(&hub));
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_oneshot_value_api() {
        let cache: OneShot<i32, &'static str> = OneShot::new(|r| r.resolve(Ok(7)));
        assert_eq!(tokio_test::block_on(cache.value()), Ok(7));
    }

    #[test]
    fn test_stream_pulls_current_value_synchronously() {
        let hub: CurrentValueHub<&'static str, &'static str> = CurrentValueHub::new("a");
        let mut stream = values(&hub);
        let first = tokio_test::block_on(stream.next());
        assert_eq!(first, Some(Ok("a")));
    }

    #[tokio::test]
    async fn test_stream_sees_values_and_end() {
        let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
        let stream = values(&hub);

        let sender = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            sender.send(1);
            sender.send(2);
            sender.send_completion(Completion::Finished);
        });

        let collected: Vec<Result<i32, &'static str>> = stream.collect().await;
        assert_eq!(collected, vec![Ok(1)]);
    }

    #[tokio::test]
    async fn test_stream_yields_failure_then_ends() {
        let hub: PassthroughHub<i32, &'static str> = PassthroughHub::new();
        let mut stream = values(&hub);

        let sender = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            sender.send_completion(Completion::Failure("down"));
        });

        assert_eq!(stream.next().await, Some(Err("down")));
        assert_eq!(stream.next().await, None);
    }
}
