//! Operator stage skeletons
//!
//! The two shared stage shapes the operator catalogue is built from. A
//! stage plays both protocol roles at once: it is the upstream's subscriber
//! and the downstream's subscription. Behavior is injected as a hook
//! closure rather than through inheritance; the skeleton owns the state
//! machine, the locking discipline, and the demand bookkeeping.

mod filter;
mod reduce;

pub(crate) use filter::FilterStage;
pub(crate) use reduce::ReduceStage;

/// Outcome of a stage hook for one upstream value
pub(crate) enum Step<V, E> {
    /// Keep the stream going, optionally producing output
    Next(V),
    /// The stage has its answer: cancel upstream, finish downstream
    Finished,
    /// Cancel upstream and fail downstream
    Failure(E),
}
