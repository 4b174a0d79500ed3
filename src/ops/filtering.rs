//! Per-value selection operators
//!
//! All four are thin fronts over the filter-stage skeleton; each subscribe
//! composes a hook from the user closure and hands it to the stage.

use crate::publisher::Publisher;
use crate::stage::{FilterStage, Step};
use crate::subscriber::Subscriber;

/// Publisher returned by [`filter`](crate::PublisherExt::filter)
pub struct Filter<U, P> {
    upstream: U,
    predicate: P,
}

impl<U, P> Filter<U, P> {
    pub(crate) fn new(upstream: U, predicate: P) -> Filter<U, P> {
        Filter {
            upstream,
            predicate,
        }
    }
}

impl<U: Clone, P: Clone> Clone for Filter<U, P> {
    fn clone(&self) -> Self {
        Filter {
            upstream: self.upstream.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<U, P> Publisher for Filter<U, P>
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
        let stage = FilterStage::new(subscriber, move |value| {
            if predicate(&value) {
                Step::Next(Some(value))
            } else {
                Step::Next(None)
            }
        });
        self.upstream.subscribe(stage);
    }
}

/// Publisher returned by [`filter_map`](crate::PublisherExt::filter_map)
pub struct FilterMap<U, F> {
    upstream: U,
    transform: F,
}

impl<U, F> FilterMap<U, F> {
    pub(crate) fn new(upstream: U, transform: F) -> FilterMap<U, F> {
        FilterMap {
            upstream,
            transform,
        }
    }
}

impl<U: Clone, F: Clone> Clone for FilterMap<U, F> {
    fn clone(&self) -> Self {
        FilterMap {
            upstream: self.upstream.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<U, F, T> Publisher for FilterMap<U, F>
where
    U: Publisher,
    U::Output: Send + 'static,
    F: Fn(U::Output) -> Option<T> + Clone + Send + 'static,
    T: Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let transform = self.transform.clone();
        let stage = FilterStage::new(subscriber, move |value| Step::Next(transform(value)));
        self.upstream.subscribe(stage);
    }
}

/// Publisher returned by [`dedupe`](crate::PublisherExt::dedupe)
pub struct Dedupe<U> {
    upstream: U,
}

impl<U> Dedupe<U> {
    pub(crate) fn new(upstream: U) -> Dedupe<U> {
        Dedupe { upstream }
    }
}

impl<U: Clone> Clone for Dedupe<U> {
    fn clone(&self) -> Self {
        Dedupe {
            upstream: self.upstream.clone(),
        }
    }
}

impl<U> Publisher for Dedupe<U>
where
    U: Publisher,
    U::Output: PartialEq + Clone + Send + 'static,
{
    type Output = U::Output;
    type Failure = U::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let mut last: Option<U::Output> = None;
        let stage = FilterStage::new(subscriber, move |value| {
            if last.as_ref() == Some(&value) {
                Step::Next(None)
            } else {
                last = Some(value.clone());
                Step::Next(Some(value))
            }
        });
        self.upstream.subscribe(stage);
    }
}

/// Publisher returned by [`take_while`](crate::PublisherExt::take_while)
pub struct TakeWhile<U, P> {
    upstream: U,
    predicate: P,
}

impl<U, P> TakeWhile<U, P> {
    pub(crate) fn new(upstream: U, predicate: P) -> TakeWhile<U, P> {
        TakeWhile {
            upstream,
            predicate,
        }
    }
}

impl<U: Clone, P: Clone> Clone for TakeWhile<U, P> {
    fn clone(&self) -> Self {
        TakeWhile {
            upstream: self.upstream.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<U, P> Publisher for TakeWhile<U, P>
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
        let stage = FilterStage::new(subscriber, move |value| {
            if predicate(&value) {
                Step::Next(Some(value))
            } else {
                Step::Finished
            }
        });
        self.upstream.subscribe(stage);
    }
}
