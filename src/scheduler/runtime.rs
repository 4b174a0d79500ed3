//! Tokio-backed scheduler
//!
//! Dispatches actions onto a captured tokio runtime handle: `schedule`
//! spawns immediately, `schedule_after` sleeps until the deadline, and
//! `schedule_repeating` drives a tokio interval. Tolerances are accepted
//! for interface compatibility but tokio's timer has no tolerance knob.

use tokio::runtime::Handle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::cancel::AnyCancellable;
use crate::scheduler::{Action, RepeatingAction, Scheduler};

/// Scheduler that runs actions as tasks on a tokio runtime
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Capture the current runtime's handle
    ///
    /// Panics outside of a tokio runtime, as [`Handle::current`] does.
    pub fn current() -> TokioScheduler {
        TokioScheduler {
            handle: Handle::current(),
        }
    }

    /// Wrap an explicit runtime handle
    pub fn new(handle: Handle) -> TokioScheduler {
        TokioScheduler { handle }
    }
}

impl Scheduler for TokioScheduler {
    type Time = Instant;
    type Options = ();

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, _options: Option<&()>, action: Action) {
        self.handle.spawn(async move {
            action();
        });
    }

    fn schedule_after(
        &self,
        date: Instant,
        _tolerance: Duration,
        _options: Option<&()>,
        action: Action,
    ) {
        self.handle.spawn(async move {
            tokio::time::sleep_until(date).await;
            action();
        });
    }

    fn schedule_repeating(
        &self,
        date: Instant,
        interval: Duration,
        _tolerance: Duration,
        _options: Option<&()>,
        mut action: RepeatingAction,
    ) -> AnyCancellable {
        let task = self.handle.spawn(async move {
            let mut timer = tokio::time::interval_at(date, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                action();
            }
        });
        AnyCancellable::new(move || {
            tracing::trace!("Repeating schedule stopped");
            task.abort();
        })
    }
}
