//! Fold-to-one operators
//!
//! Fronts over the reduce-stage skeleton. Each consumes the whole upstream
//! (unlimited demand) and emits a single value once the downstream has
//! requested and the upstream has completed; `first_where` and `all` may
//! finish early.

use crate::publisher::Publisher;
use crate::stage::{ReduceStage, Step};
use crate::subscriber::Subscriber;

/// Publisher returned by [`fold`](crate::PublisherExt::fold)
pub struct Fold<U, T, F> {
    upstream: U,
    initial: T,
    fold: F,
}

impl<U, T, F> Fold<U, T, F> {
    pub(crate) fn new(upstream: U, initial: T, fold: F) -> Fold<U, T, F> {
        Fold {
            upstream,
            initial,
            fold,
        }
    }
}

impl<U: Clone, T: Clone, F: Clone> Clone for Fold<U, T, F> {
    fn clone(&self) -> Self {
        Fold {
            upstream: self.upstream.clone(),
            initial: self.initial.clone(),
            fold: self.fold.clone(),
        }
    }
}

impl<U, T, F> Publisher for Fold<U, T, F>
where
    U: Publisher,
    U::Output: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(T, U::Output) -> T + Clone + Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let fold = self.fold.clone();
        let seed = self.initial.clone();
        let stage = ReduceStage::new(
            subscriber,
            Some(self.initial.clone()),
            move |acc: &mut Option<T>, value| {
                let current = acc.take().unwrap_or_else(|| seed.clone());
                *acc = Some(fold(current, value));
                Step::Next(())
            },
        );
        self.upstream.subscribe(stage);
    }
}

/// Publisher returned by [`count`](crate::PublisherExt::count)
pub struct Count<U> {
    upstream: U,
}

impl<U> Count<U> {
    pub(crate) fn new(upstream: U) -> Count<U> {
        Count { upstream }
    }
}

impl<U: Clone> Clone for Count<U> {
    fn clone(&self) -> Self {
        Count {
            upstream: self.upstream.clone(),
        }
    }
}

impl<U> Publisher for Count<U>
where
    U: Publisher,
    U::Output: Send + 'static,
{
    type Output = usize;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = usize, Failure = U::Failure>,
    {
        let stage = ReduceStage::new(
            subscriber,
            Some(0),
            |acc: &mut Option<usize>, _value| {
                *acc = Some(acc.unwrap_or(0) + 1);
                Step::Next(())
            },
        );
        self.upstream.subscribe(stage);
    }
}

/// Publisher returned by [`first_where`](crate::PublisherExt::first_where)
pub struct FirstWhere<U, P> {
    upstream: U,
    predicate: P,
}

impl<U, P> FirstWhere<U, P> {
    pub(crate) fn new(upstream: U, predicate: P) -> FirstWhere<U, P> {
        FirstWhere {
            upstream,
            predicate,
        }
    }
}

impl<U: Clone, P: Clone> Clone for FirstWhere<U, P> {
    fn clone(&self) -> Self {
        FirstWhere {
            upstream: self.upstream.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<U, P> Publisher for FirstWhere<U, P>
where
    U: Publisher,
    U::Output: Send + 'static,
    P: Fn(&U::Output) -> bool + Clone + Send + 'static,
{
    type Output = U::Output;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let predicate = self.predicate.clone();
        let stage = ReduceStage::new(subscriber, None, move |acc, value| {
            if predicate(&value) {
                *acc = Some(value);
                Step::Finished
            } else {
                Step::Next(())
            }
        });
        self.upstream.subscribe(stage);
    }
}

/// Publisher returned by [`all`](crate::PublisherExt::all)
pub struct All<U, P> {
    upstream: U,
    predicate: P,
}

impl<U, P> All<U, P> {
    pub(crate) fn new(upstream: U, predicate: P) -> All<U, P> {
        All {
            upstream,
            predicate,
        }
    }
}

impl<U: Clone, P: Clone> Clone for All<U, P> {
    fn clone(&self) -> Self {
        All {
            upstream: self.upstream.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<U, P> Publisher for All<U, P>
where
    U: Publisher,
    U::Output: Send + 'static,
    P: Fn(&U::Output) -> bool + Clone + Send + 'static,
{
    type Output = bool;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = bool, Failure = U::Failure>,
    {
        let predicate = self.predicate.clone();
        let stage = ReduceStage::new(subscriber, Some(true), move |acc, value| {
            if predicate(&value) {
                Step::Next(())
            } else {
                // A counterexample settles the answer.
                *acc = Some(false);
                Step::Finished
            }
        });
        self.upstream.subscribe(stage);
    }
}
