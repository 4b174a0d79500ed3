//! Head-node publishers
//!
//! Publishers that bridge an external event source into the protocol. The
//! subscription object is the bridge: it registers with the source, checks
//! per-subscription demand on every inbound event, and deregisters on
//! cancel. Multi-subscriber sources implement [`Connectable`] — attaching
//! subscribers only populates a dispatch table, and nothing runs until
//! `connect`.

mod broadcast;
mod task;
mod timer;

pub use broadcast::BroadcastPublisher;
pub use task::{DataSource, DataTaskPublisher, Payload};
pub use timer::TimerPublisher;

use crate::cancel::AnyCancellable;
use crate::publisher::Publisher;

/// A publisher whose source starts only when `connect` is called
pub trait Connectable: Publisher {
    /// Start the underlying source
    ///
    /// Dropping (or cancelling) the returned token stops the source and
    /// detaches every attached subscriber.
    fn connect(&self) -> AnyCancellable;
}
