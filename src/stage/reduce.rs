//! Fold-to-one stage
//!
//! Skeleton for operators that consume the whole stream and emit a single
//! value at completion: fold, count, first-where, all. The stage requests
//! unlimited demand upstream; the folded result is emitted only once the
//! downstream has requested and the upstream has completed, whichever
//! happens last. A hook may finish early ("I have my answer"), which
//! cancels the upstream without failing it.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::cancel::Cancellable;
use crate::completion::Completion;
use crate::demand::Demand;
use crate::stage::Step;
use crate::subscriber::Subscriber;
use crate::subscription::{AnySubscription, Subscription, SubscriptionStatus};

/// Stage driven by a `FnMut(&mut Option<Output>, I) -> Step<(), E>` hook
///
/// The hook owns the accumulator through the `&mut Option<Output>`.
pub(crate) struct ReduceStage<I, S, F>
where
    S: Subscriber,
{
    me: Weak<Self>,
    hook: Mutex<F>,
    downstream: S,
    state: Mutex<ReduceState<S::Input>>,
    delivery: ReentrantMutex<()>,
    _input: PhantomData<fn(I)>,
}

struct ReduceState<O> {
    status: SubscriptionStatus,
    result: Option<O>,
    downstream_requested: bool,
    upstream_completed: bool,
    delivered: bool,
}

impl<I, S, F> ReduceStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    F: FnMut(&mut Option<S::Input>, I) -> Step<(), S::Failure> + Send + 'static,
{
    pub(crate) fn new(downstream: S, initial: Option<S::Input>, hook: F) -> Arc<Self> {
        Arc::new_cyclic(|me| ReduceStage {
            me: me.clone(),
            hook: Mutex::new(hook),
            downstream,
            state: Mutex::new(ReduceState {
                status: SubscriptionStatus::Awaiting,
                result: initial,
                downstream_requested: false,
                upstream_completed: false,
                delivered: false,
            }),
            delivery: ReentrantMutex::new(()),
            _input: PhantomData,
        })
    }

    /// Emit the result and finish, once both gates are open
    fn maybe_deliver(&self) {
        let payload = {
            let mut state = self.state.lock();
            if state.delivered || !state.downstream_requested || !state.upstream_completed {
                return;
            }
            state.delivered = true;
            state.status.take();
            state.result.take()
        };
        let _delivery = self.delivery.lock();
        if let Some(value) = payload {
            self.downstream.receive(value);
        }
        self.downstream.receive_completion(Completion::Finished);
    }

    /// Fail downstream immediately, bypassing the demand gate
    fn fail(&self, error: S::Failure, cancel_upstream: bool) {
        let upstream = {
            let mut state = self.state.lock();
            if state.delivered {
                return;
            }
            state.delivered = true;
            state.status.take()
        };
        if cancel_upstream {
            if let Some(upstream) = upstream {
                upstream.cancel();
            }
        }
        let _delivery = self.delivery.lock();
        self.downstream.receive_completion(Completion::Failure(error));
    }
}

impl<I, S, F> Subscriber for ReduceStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    S::Input: Send,
    F: FnMut(&mut Option<S::Input>, I) -> Step<(), S::Failure> + Send + 'static,
{
    type Input = I;
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
        // The stage wants to see every upstream value.
        subscription.request(Demand::UNLIMITED);
    }

    fn receive(&self, input: I) -> Demand {
        let step = {
            let mut state = self.state.lock();
            if state.delivered || state.upstream_completed {
                return Demand::NONE;
            }
            let mut hook = self.hook.lock();
            (*hook)(&mut state.result, input)
        };
        match step {
            Step::Next(()) => Demand::NONE,
            Step::Finished => {
                // Early answer: stop the upstream, then emit as soon as
                // the downstream has demand.
                let upstream = {
                    let mut state = self.state.lock();
                    state.upstream_completed = true;
                    state.status.take()
                };
                if let Some(upstream) = upstream {
                    upstream.cancel();
                }
                self.maybe_deliver();
                Demand::NONE
            }
            Step::Failure(error) => {
                self.fail(error, true);
                Demand::NONE
            }
        }
    }

    fn receive_completion(&self, completion: Completion<S::Failure>) {
        match completion {
            Completion::Finished => {
                {
                    let mut state = self.state.lock();
                    if state.delivered {
                        return;
                    }
                    state.upstream_completed = true;
                    state.status.take();
                }
                self.maybe_deliver();
            }
            Completion::Failure(error) => {
                // Upstream already terminal: forward, do not cancel.
                self.fail(error, false);
            }
        }
    }
}

impl<I, S, F> Subscription for ReduceStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    S::Input: Send,
    F: FnMut(&mut Option<S::Input>, I) -> Step<(), S::Failure> + Send + 'static,
{
    fn request(&self, _demand: Demand) {
        {
            let mut state = self.state.lock();
            if state.delivered {
                return;
            }
            state.downstream_requested = true;
        }
        self.maybe_deliver();
    }
}

impl<I, S, F> Cancellable for ReduceStage<I, S, F>
where
    I: Send + 'static,
    S: Subscriber,
    S::Input: Send,
    F: FnMut(&mut Option<S::Input>, I) -> Step<(), S::Failure> + Send + 'static,
{
    fn cancel(&self) {
        let upstream = {
            let mut state = self.state.lock();
            state.delivered = true;
            state.status.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upstream {
        requests: Mutex<Vec<Demand>>,
        cancels: AtomicUsize,
    }

    impl Upstream {
        fn new() -> Arc<Upstream> {
            Arc::new(Upstream {
                requests: Mutex::new(Vec::new()),
                cancels: AtomicUsize::new(0),
            })
        }
    }

    impl Subscription for Upstream {
        fn request(&self, demand: Demand) {
            self.requests.lock().push(demand);
        }
    }

    impl Cancellable for Upstream {
        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Downstream {
        subscription: Mutex<Option<AnySubscription>>,
        values: Mutex<Vec<i32>>,
        completions: Mutex<Vec<Completion<&'static str>>>,
    }

    impl Downstream {
        fn new() -> Arc<Downstream> {
            Arc::new(Downstream {
                subscription: Mutex::new(None),
                values: Mutex::new(Vec::new()),
                completions: Mutex::new(Vec::new()),
            })
        }

        fn request_one(&self) {
            let subscription = self.subscription.lock().clone();
            subscription.expect("not subscribed").request(Demand::max(1));
        }
    }

    impl Subscriber for Downstream {
        type Input = i32;
        type Failure = &'static str;

        fn receive_subscription(&self, subscription: AnySubscription) {
            *self.subscription.lock() = Some(subscription);
        }

        fn receive(&self, input: i32) -> Demand {
            self.values.lock().push(input);
            Demand::NONE
        }

        fn receive_completion(&self, completion: Completion<&'static str>) {
            self.completions.lock().push(completion);
        }
    }

    fn summing_stage(
        downstream: Arc<Downstream>,
    ) -> Arc<
        ReduceStage<
            i32,
            Arc<Downstream>,
            impl FnMut(&mut Option<i32>, i32) -> Step<(), &'static str> + Send + 'static,
        >,
    > {
        ReduceStage::new(downstream, Some(0), |acc: &mut Option<i32>, v: i32| {
            *acc = Some(acc.unwrap_or(0) + v);
            Step::Next(())
        })
    }

    #[test]
    fn test_requests_unlimited_upstream() {
        let downstream = Downstream::new();
        let stage = summing_stage(downstream);
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));
        assert_eq!(*upstream.requests.lock(), vec![Demand::UNLIMITED]);
    }

    #[test]
    fn test_emits_only_after_both_gates() {
        let downstream = Downstream::new();
        let stage = summing_stage(Arc::clone(&downstream));
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));

        stage.receive(1);
        stage.receive(2);
        assert!(downstream.values.lock().is_empty());

        // Completion alone is not enough without downstream demand.
        stage.receive_completion(Completion::Finished);
        assert!(downstream.values.lock().is_empty());

        downstream.request_one();
        assert_eq!(*downstream.values.lock(), vec![3]);
        assert_eq!(*downstream.completions.lock(), vec![Completion::Finished]);
    }

    #[test]
    fn test_request_before_completion() {
        let downstream = Downstream::new();
        let stage = summing_stage(Arc::clone(&downstream));
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));

        downstream.request_one();
        stage.receive(5);
        assert!(downstream.values.lock().is_empty());
        stage.receive_completion(Completion::Finished);
        assert_eq!(*downstream.values.lock(), vec![5]);
    }

    #[test]
    fn test_early_finish_cancels_upstream_and_waits_for_demand() {
        let downstream = Downstream::new();
        let stage = ReduceStage::new(
            Arc::clone(&downstream),
            None,
            |acc: &mut Option<i32>, v: i32| {
                if v > 10 {
                    *acc = Some(v);
                    Step::Finished
                } else {
                    Step::Next(())
                }
            },
        );
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));

        stage.receive(3);
        stage.receive(42);
        assert_eq!(upstream.cancels.load(Ordering::SeqCst), 1);
        assert!(downstream.values.lock().is_empty());

        downstream.request_one();
        assert_eq!(*downstream.values.lock(), vec![42]);
        assert_eq!(*downstream.completions.lock(), vec![Completion::Finished]);
    }

    #[test]
    fn test_hook_failure_bypasses_demand_gate() {
        let downstream = Downstream::new();
        let stage = ReduceStage::new(
            Arc::clone(&downstream),
            Some(0),
            |_acc: &mut Option<i32>, v: i32| {
                if v < 0 {
                    Step::Failure("negative")
                } else {
                    Step::Next(())
                }
            },
        );
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));

        stage.receive(-1);
        assert_eq!(upstream.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(
            *downstream.completions.lock(),
            vec![Completion::Failure("negative")]
        );
    }

    #[test]
    fn test_empty_stream_emits_initial() {
        let downstream = Downstream::new();
        let stage = summing_stage(Arc::clone(&downstream));
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));

        downstream.request_one();
        stage.receive_completion(Completion::Finished);
        assert_eq!(*downstream.values.lock(), vec![0]);
    }

    #[test]
    fn test_cancel_blocks_delivery() {
        let downstream = Downstream::new();
        let stage = summing_stage(Arc::clone(&downstream));
        let upstream = Upstream::new();
        stage.receive_subscription(AnySubscription::from_arc(upstream.clone()));

        stage.receive(1);
        stage.cancel();
        assert_eq!(upstream.cancels.load(Ordering::SeqCst), 1);

        stage.receive_completion(Completion::Finished);
        downstream.request_one();
        assert!(downstream.values.lock().is_empty());
        assert!(downstream.completions.lock().is_empty());
    }
}
