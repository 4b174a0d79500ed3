//! Scheduler abstraction and time algebra
//!
//! A scheduler runs closures now, after a deadline, or on an interval, in
//! whatever execution context it represents. The runtime itself never
//! schedules; stages that hop execution contexts do so exclusively through
//! this interface. Time is abstract: a `SchedulerTime` is strideable by a
//! `SchedulerStride` constructible from human-scale durations.

mod immediate;
mod runtime;
pub mod testing;

pub use immediate::ImmediateScheduler;
pub use runtime::TokioScheduler;

use std::time::Duration;

use crate::cancel::AnyCancellable;

/// A one-shot scheduled action
pub type Action = Box<dyn FnOnce() + Send>;

/// A repeating scheduled action
pub type RepeatingAction = Box<dyn FnMut() + Send>;

/// The stride type of a scheduler
pub type StrideOf<S> = <<S as Scheduler>::Time as SchedulerTime>::Stride;

/// A span of scheduler time, constructible from duration units
pub trait SchedulerStride:
    Copy + Clone + PartialEq + PartialOrd + Send + Sync + 'static
{
    /// A stride of `value` seconds
    fn seconds(value: u64) -> Self;
    /// A stride of `value` milliseconds
    fn milliseconds(value: u64) -> Self;
    /// A stride of `value` microseconds
    fn microseconds(value: u64) -> Self;
    /// A stride of `value` nanoseconds
    fn nanoseconds(value: u64) -> Self;
    /// The empty stride
    fn zero() -> Self;
}

impl SchedulerStride for Duration {
    fn seconds(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    fn milliseconds(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn microseconds(value: u64) -> Duration {
        Duration::from_micros(value)
    }

    fn nanoseconds(value: u64) -> Duration {
        Duration::from_nanos(value)
    }

    fn zero() -> Duration {
        Duration::ZERO
    }
}

/// A point in a scheduler's timeline
pub trait SchedulerTime: Clone + Send + Sync + 'static {
    /// The stride separating two points of this time
    type Stride: SchedulerStride;

    /// The stride from `self` forward to `other`, clamped at zero
    fn distance_to(&self, other: &Self) -> Self::Stride;

    /// The point `stride` later than `self`
    fn advanced_by(&self, stride: Self::Stride) -> Self;
}

impl SchedulerTime for std::time::Instant {
    type Stride = Duration;

    fn distance_to(&self, other: &Self) -> Duration {
        other.saturating_duration_since(*self)
    }

    fn advanced_by(&self, stride: Duration) -> Self {
        *self + stride
    }
}

impl SchedulerTime for tokio::time::Instant {
    type Stride = Duration;

    fn distance_to(&self, other: &Self) -> Duration {
        other.saturating_duration_since(*self)
    }

    fn advanced_by(&self, stride: Duration) -> Self {
        *self + stride
    }
}

/// Runs closures in an execution context, now or later
///
/// `Options` carries scheduler-specific dispatch hints; schedulers without
/// any use `()`.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// This scheduler's notion of time
    type Time: SchedulerTime;
    /// Scheduler-specific dispatch options
    type Options: Clone + Send + Sync + 'static;

    /// The current time
    fn now(&self) -> Self::Time;

    /// The smallest tolerance the scheduler honors
    fn min_tolerance(&self) -> StrideOf<Self> {
        SchedulerStride::zero()
    }

    /// Run `action` at the earliest opportunity in this context
    fn schedule(&self, options: Option<&Self::Options>, action: Action);

    /// Run `action` once, no earlier than `date`
    fn schedule_after(
        &self,
        date: Self::Time,
        tolerance: StrideOf<Self>,
        options: Option<&Self::Options>,
        action: Action,
    );

    /// Run `action` every `interval` starting no earlier than `date`
    ///
    /// The returned token stops the repetition when cancelled or dropped.
    fn schedule_repeating(
        &self,
        date: Self::Time,
        interval: StrideOf<Self>,
        tolerance: StrideOf<Self>,
        options: Option<&Self::Options>,
        action: RepeatingAction,
    ) -> AnyCancellable;
}
