//! Operators
//!
//! Combinators over any [`Publisher`], exposed through [`PublisherExt`].
//! Per-value operators are built on the filter-stage skeleton, folding
//! operators on the reduce-stage skeleton, and the scheduler-interposed
//! operators each own a small stage that shifts selected signals across an
//! execution context.

mod debounce;
mod delay;
mod filtering;
mod folding;
mod map;
mod measure;
mod receive_on;
mod subscribe_on;
mod timeout;

pub use debounce::Debounce;
pub use delay::Delay;
pub use filtering::{Dedupe, Filter, FilterMap, TakeWhile};
pub use folding::{All, Count, FirstWhere, Fold};
pub use map::Map;
pub use measure::MeasureInterval;
pub use receive_on::ReceiveOn;
pub use subscribe_on::SubscribeOn;
pub use timeout::Timeout;

use crate::cancel::AnyCancellable;
use crate::completion::Completion;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, StrideOf};
use crate::sink;

/// Combinator surface for publishers
///
/// All methods consume `self`; the returned operator publisher holds the
/// upstream by value and builds a fresh pipeline per subscribe.
pub trait PublisherExt: Publisher {
    /// Transform every value
    fn map<T, F>(self, transform: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Output) -> T,
    {
        Map::new(self, transform)
    }

    /// Keep only values matching the predicate
    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Output) -> bool,
    {
        Filter::new(self, predicate)
    }

    /// Transform values, dropping those mapped to `None`
    fn filter_map<T, F>(self, transform: F) -> FilterMap<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Output) -> Option<T>,
    {
        FilterMap::new(self, transform)
    }

    /// Drop consecutive repeats
    fn dedupe(self) -> Dedupe<Self>
    where
        Self: Sized,
        Self::Output: PartialEq + Clone,
    {
        Dedupe::new(self)
    }

    /// Pass values while the predicate holds, then finish
    fn take_while<P>(self, predicate: P) -> TakeWhile<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Output) -> bool,
    {
        TakeWhile::new(self, predicate)
    }

    /// Fold the stream to one value emitted at completion
    fn fold<T, F>(self, initial: T, fold: F) -> Fold<Self, T, F>
    where
        Self: Sized,
        F: Fn(T, Self::Output) -> T,
    {
        Fold::new(self, initial, fold)
    }

    /// Count the values, emitting the total at completion
    fn count(self) -> Count<Self>
    where
        Self: Sized,
    {
        Count::new(self)
    }

    /// Emit the first value matching the predicate, then finish
    fn first_where<P>(self, predicate: P) -> FirstWhere<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Output) -> bool,
    {
        FirstWhere::new(self, predicate)
    }

    /// True iff every value satisfies the predicate
    fn all<P>(self, predicate: P) -> All<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Output) -> bool,
    {
        All::new(self, predicate)
    }

    /// Re-dispatch values and terminals through a scheduler
    fn receive_on<Sch>(self, scheduler: Sch) -> ReceiveOn<Self, Sch>
    where
        Self: Sized,
        Sch: Scheduler,
    {
        ReceiveOn::new(self, scheduler)
    }

    /// Perform the upstream attach, requests, and cancels on a scheduler
    fn subscribe_on<Sch>(self, scheduler: Sch) -> SubscribeOn<Self, Sch>
    where
        Self: Sized,
        Sch: Scheduler,
    {
        SubscribeOn::new(self, scheduler)
    }

    /// Hold every signal for `interval`
    fn delay<Sch>(self, interval: StrideOf<Sch>, scheduler: Sch) -> Delay<Self, Sch>
    where
        Self: Sized,
        Sch: Scheduler,
    {
        Delay::new(self, interval, scheduler)
    }

    /// Emit only the latest value once `due` has passed without another
    fn debounce<Sch>(self, due: StrideOf<Sch>, scheduler: Sch) -> Debounce<Self, Sch>
    where
        Self: Sized,
        Sch: Scheduler,
    {
        Debounce::new(self, due, scheduler)
    }

    /// Terminate the stream if no value arrives within `interval`
    fn timeout<Sch>(self, interval: StrideOf<Sch>, scheduler: Sch) -> Timeout<Self, Sch>
    where
        Self: Sized,
        Sch: Scheduler,
    {
        Timeout::new(self, interval, scheduler)
    }

    /// Replace values with the stride separating their arrivals
    fn measure_interval<Sch>(self, scheduler: Sch) -> MeasureInterval<Self, Sch>
    where
        Self: Sized,
        Sch: Scheduler,
    {
        MeasureInterval::new(self, scheduler)
    }

    /// Attach a closure sink with unlimited demand
    ///
    /// The returned token cancels the pipeline; dropping it does the same.
    fn sink(
        self,
        on_value: impl Fn(Self::Output) + Send + Sync + 'static,
        on_completion: impl Fn(Completion<Self::Failure>) + Send + Sync + 'static,
    ) -> AnyCancellable
    where
        Self: Sized,
        Self::Output: Send + 'static,
        Self::Failure: Send + 'static,
    {
        sink::attach_sink(&self, on_value, on_completion)
    }

    /// Like [`sink`](PublisherExt::sink), ignoring the terminal
    fn sink_values(
        self,
        on_value: impl Fn(Self::Output) + Send + Sync + 'static,
    ) -> AnyCancellable
    where
        Self: Sized,
        Self::Output: Send + 'static,
        Self::Failure: Send + 'static,
    {
        sink::attach_sink(&self, on_value, |_| {})
    }
}

impl<P: Publisher> PublisherExt for P {}
