//! Broadcast hubs
//!
//! A hub is a publisher that is also driven imperatively: values pushed
//! into it with `send` are multicast to every attached downstream, each
//! with its own demand accounting (a *conduit*). Two variants share the
//! skeleton: [`PassthroughHub`] drops values a conduit has no demand for,
//! [`CurrentValueHub`] retains the latest value and replays it once demand
//! arrives.
//!
//! Hubs also implement [`Subscriber`](crate::Subscriber), so one can be
//! attached downstream of any publisher; such upstream feeders are
//! requested unlimited demand — backpressure is enforced per conduit, never
//! against feeders.

mod current_value;
mod passthrough;

pub use current_value::CurrentValueHub;
pub use passthrough::PassthroughHub;

use parking_lot::Mutex;

use crate::cancel::Cancellable;
use crate::demand::Demand;
use crate::subscription::{AnySubscription, Subscription};

/// Upstream feeder subscriptions retained by a hub
///
/// Feeders are requested `Demand::UNLIMITED` at attach and cancelled when
/// the hub's core drops.
pub(crate) struct FeederSet {
    feeders: Mutex<Vec<AnySubscription>>,
}

impl FeederSet {
    pub(crate) fn new() -> FeederSet {
        FeederSet {
            feeders: Mutex::new(Vec::new()),
        }
    }

    /// Retain a feeder and grant it unlimited demand
    pub(crate) fn attach(&self, subscription: AnySubscription) {
        self.feeders.lock().push(subscription.clone());
        // Request outside the list lock; the feeder may deliver
        // synchronously.
        subscription.request(Demand::UNLIMITED);
    }

    /// Cancel and release every retained feeder
    pub(crate) fn cancel_all(&self) {
        let feeders = std::mem::take(&mut *self.feeders.lock());
        for feeder in feeders {
            feeder.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.feeders.lock().len()
    }
}

impl Drop for FeederSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
