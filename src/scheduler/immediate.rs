//! Inline scheduler
//!
//! Runs every action synchronously on the calling thread. Deadlines are
//! ignored and repeating schedules are unsupported; use
//! [`TokioScheduler`](super::TokioScheduler) or the virtual-time
//! [`TestScheduler`](super::testing::TestScheduler) for deferred work.

use std::time::{Duration, Instant};

use crate::cancel::AnyCancellable;
use crate::scheduler::{Action, RepeatingAction, Scheduler};

/// Scheduler that runs actions inline on the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    type Time = Instant;
    type Options = ();

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, _options: Option<&()>, action: Action) {
        action();
    }

    fn schedule_after(
        &self,
        _date: Instant,
        _tolerance: Duration,
        _options: Option<&()>,
        action: Action,
    ) {
        // The immediate scheduler cannot defer; the deadline is ignored.
        action();
    }

    fn schedule_repeating(
        &self,
        _date: Instant,
        _interval: Duration,
        _tolerance: Duration,
        _options: Option<&()>,
        _action: RepeatingAction,
    ) -> AnyCancellable {
        debug_assert!(
            false,
            "ImmediateScheduler cannot run repeating schedules; use a deferring scheduler"
        );
        AnyCancellable::empty()
    }
}
