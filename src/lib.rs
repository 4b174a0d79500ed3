//! # rivulet
//!
//! Pull-driven, typed reactive streams with demand-based backpressure.
//!
//! ## Overview
//!
//! `rivulet` is a declarative streams runtime: a [`Publisher`] produces a
//! typed sequence of values, transformation stages compose over it, and a
//! [`Subscriber`] drains the pipeline at its own pace. No value is ever
//! delivered without having been requested, pipelines are cancellable at
//! any point, and every stream ends with at most one terminal — a normal
//! finish or a typed failure.
//!
//! ## Quick Start
//!
//! ```rust
//! use rivulet::{PassthroughHub, PublisherExt};
//! use std::sync::{Arc, Mutex};
//!
//! let hub: PassthroughHub<i32> = PassthroughHub::new();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink_seen = Arc::clone(&seen);
//! let _token = hub
//!     .clone()
//!     .map(|v| v * 2)
//!     .sink_values(move |v| sink_seen.lock().unwrap().push(v));
//!
//! hub.send(1);
//! hub.send(2);
//! assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
//! ```
//!
//! ## Architecture
//!
//! - **Demand** — saturating backpressure counts with an unlimited sentinel
//! - **Publisher / Subscriber / Subscription** — the four-message protocol:
//!   subscribe, request, value, terminal
//! - **Hubs** — imperatively driven multicast ([`PassthroughHub`],
//!   [`CurrentValueHub`]) with per-subscriber demand accounting
//! - **OneShot** — eagerly fulfilled, memoized single-result publisher
//! - **Schedulers** — pluggable execution contexts for the time-shifting
//!   operators (`receive_on`, `delay`, `debounce`, `timeout`, …)
//! - **Head nodes** — bridges from external sources (timers, async tasks,
//!   broadcast channels) that honor the same demand contract

pub mod bridge;
pub mod cancel;
pub mod completion;
pub mod demand;
pub mod error;
pub mod head;
pub mod hooks;
pub mod hub;
pub mod ident;
pub mod oneshot;
pub mod ops;
pub mod publisher;
pub mod scheduler;
pub mod sink;
mod stage;
pub mod subscriber;
pub mod subscription;

// Re-export core types
pub use bridge::{first_value, values, FirstValue, ValueStream};
pub use cancel::{AnyCancellable, Cancellable, CancellableSet};
pub use completion::Completion;
pub use demand::Demand;
pub use error::SourceError;
pub use head::{BroadcastPublisher, Connectable, DataSource, DataTaskPublisher, Payload, TimerPublisher};
pub use hooks::ProtocolHook;
pub use hub::{CurrentValueHub, PassthroughHub};
pub use ident::NodeId;
pub use oneshot::{OneShot, Resolver};
pub use ops::PublisherExt;
pub use publisher::{AnyPublisher, Publisher};
pub use scheduler::{
    ImmediateScheduler, Scheduler, SchedulerStride, SchedulerTime, TokioScheduler,
};
pub use sink::Sink;
pub use subscriber::{AnySubscriber, Handlers, Subscriber};
pub use subscription::{AnySubscription, Subscription};
