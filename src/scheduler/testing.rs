//! Virtual-time scheduler for deterministic tests
//!
//! The [`TestScheduler`] queues every action and runs nothing until told
//! to. [`advance`](TestScheduler::advance) moves the virtual clock forward,
//! firing due actions in deadline order (FIFO among equal deadlines);
//! [`run`](TestScheduler::run) fires everything already due. Actions run
//! with no scheduler lock held, so they may freely schedule more work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cancel::AnyCancellable;
use crate::scheduler::{Action, RepeatingAction, Scheduler, SchedulerStride, SchedulerTime};

/// A point on the virtual timeline, measured from scheduler creation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualTime(Duration);

impl VirtualTime {
    /// The scheduler's epoch
    pub const ZERO: VirtualTime = VirtualTime(Duration::ZERO);

    /// The offset from the epoch
    pub fn offset(&self) -> Duration {
        self.0
    }
}

impl SchedulerTime for VirtualTime {
    type Stride = Duration;

    fn distance_to(&self, other: &Self) -> Duration {
        other.0.saturating_sub(self.0)
    }

    fn advanced_by(&self, stride: Duration) -> Self {
        VirtualTime(self.0 + stride)
    }
}

/// Deterministic scheduler driven by explicit clock advancement
#[derive(Clone)]
pub struct TestScheduler {
    core: Arc<TestCore>,
}

struct TestCore {
    state: Mutex<QueueState>,
}

struct QueueState {
    now: VirtualTime,
    seq: u64,
    entries: Vec<Entry>,
}

struct Entry {
    due: VirtualTime,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    kind: EntryKind,
}

enum EntryKind {
    Once(Action),
    Repeating {
        interval: Duration,
        action: RepeatingAction,
    },
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TestScheduler {
    /// A scheduler whose clock starts at [`VirtualTime::ZERO`]
    pub fn new() -> TestScheduler {
        TestScheduler {
            core: Arc::new(TestCore {
                state: Mutex::new(QueueState {
                    now: VirtualTime::ZERO,
                    seq: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Number of queued, uncancelled actions
    pub fn pending(&self) -> usize {
        let state = self.core.state.lock();
        state
            .entries
            .iter()
            .filter(|e| !e.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Fire everything already due without moving the clock
    pub fn run(&self) {
        self.advance(Duration::ZERO);
    }

    /// Move the clock forward, firing due actions in deadline order
    ///
    /// Actions scheduled while advancing also fire if they fall within the
    /// window. Repeating actions re-enqueue themselves after each fire.
    pub fn advance(&self, by: Duration) {
        let target = {
            let state = self.core.state.lock();
            state.now.advanced_by(by)
        };
        loop {
            let next = {
                let mut state = self.core.state.lock();
                state
                    .entries
                    .retain(|e| !e.cancelled.load(Ordering::SeqCst));
                let due_index = state
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due <= target)
                    .min_by_key(|(_, e)| (e.due, e.seq))
                    .map(|(i, _)| i);
                match due_index {
                    Some(index) => {
                        let entry = state.entries.remove(index);
                        // The clock never runs backwards.
                        if entry.due > state.now {
                            state.now = entry.due;
                        }
                        Some(entry)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            let Some(entry) = next else {
                break;
            };
            match entry.kind {
                EntryKind::Once(action) => action(),
                EntryKind::Repeating {
                    interval,
                    mut action,
                } => {
                    action();
                    if !entry.cancelled.load(Ordering::SeqCst) {
                        let mut state = self.core.state.lock();
                        let seq = state.seq;
                        state.seq += 1;
                        let due = entry.due.advanced_by(interval);
                        state.entries.push(Entry {
                            due,
                            seq,
                            cancelled: entry.cancelled,
                            kind: EntryKind::Repeating { interval, action },
                        });
                    }
                }
            }
        }
    }

    fn enqueue(&self, due: VirtualTime, kind: EntryKind) -> Arc<AtomicBool> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.core.state.lock();
        let seq = state.seq;
        state.seq += 1;
        state.entries.push(Entry {
            due,
            seq,
            cancelled: Arc::clone(&cancelled),
            kind,
        });
        cancelled
    }
}

impl Scheduler for TestScheduler {
    type Time = VirtualTime;
    type Options = ();

    fn now(&self) -> VirtualTime {
        self.core.state.lock().now
    }

    fn schedule(&self, _options: Option<&()>, action: Action) {
        let now = self.now();
        self.enqueue(now, EntryKind::Once(action));
    }

    fn schedule_after(
        &self,
        date: VirtualTime,
        _tolerance: Duration,
        _options: Option<&()>,
        action: Action,
    ) {
        self.enqueue(date, EntryKind::Once(action));
    }

    fn schedule_repeating(
        &self,
        date: VirtualTime,
        interval: Duration,
        _tolerance: Duration,
        _options: Option<&()>,
        action: RepeatingAction,
    ) -> AnyCancellable {
        let cancelled = self.enqueue(date, EntryKind::Repeating { interval, action });
        AnyCancellable::new(move || {
            cancelled.store(true, Ordering::SeqCst);
        })
    }
}
