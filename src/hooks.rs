//! Process-wide protocol introspection
//!
//! A [`ProtocolHook`] observes every protocol transition that crosses an
//! erased boundary: subscribe, request, cancel, value, and completion, each
//! as a `will_*`/`did_*` pair. When no hook is installed the fast path costs
//! a single relaxed atomic load per guard and never takes the registry lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::demand::Demand;
use crate::ident::NodeId;

/// Observer of protocol transitions
///
/// Every method has an empty default body; implement only the events of
/// interest. No ordering is guaranteed between concurrently installed
/// hooks.
#[allow(unused_variables)]
pub trait ProtocolHook: Send + Sync {
    /// A subscriber is about to be attached to a publisher
    fn will_subscribe(&self, publisher: &'static str, subscriber: NodeId) {}
    /// A subscriber was attached to a publisher
    fn did_subscribe(&self, publisher: &'static str, subscriber: NodeId) {}

    /// Demand is about to be requested from a subscription
    fn will_request(&self, subscription: NodeId, demand: Demand) {}
    /// Demand was requested from a subscription
    fn did_request(&self, subscription: NodeId, demand: Demand) {}

    /// A subscription is about to be cancelled
    fn will_cancel(&self, subscription: NodeId) {}
    /// A subscription was cancelled
    fn did_cancel(&self, subscription: NodeId) {}

    /// A value is about to be delivered to a subscriber
    fn will_receive_value(&self, subscriber: NodeId) {}
    /// A value was delivered; `returned` is the additional demand
    fn did_receive_value(&self, subscriber: NodeId, returned: Demand) {}

    /// A terminal is about to be delivered to a subscriber
    fn will_receive_completion(&self, subscriber: NodeId) {}
    /// A terminal was delivered to a subscriber
    fn did_receive_completion(&self, subscriber: NodeId) {}
}

static ENABLED: AtomicBool = AtomicBool::new(false);

fn registry() -> &'static RwLock<Vec<Arc<dyn ProtocolHook>>> {
    static REGISTRY: OnceLock<RwLock<Vec<Arc<dyn ProtocolHook>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

/// Install a hook process-wide
pub fn install(hook: Arc<dyn ProtocolHook>) {
    let mut hooks = registry().write();
    hooks.push(hook);
    ENABLED.store(true, Ordering::Release);
    tracing::debug!(count = hooks.len(), "Protocol hook installed");
}

/// Remove a previously installed hook, matched by handle identity
pub fn uninstall(hook: &Arc<dyn ProtocolHook>) {
    let mut hooks = registry().write();
    hooks.retain(|h| !Arc::ptr_eq(h, hook));
    if hooks.is_empty() {
        ENABLED.store(false, Ordering::Release);
    }
    tracing::debug!(count = hooks.len(), "Protocol hook uninstalled");
}

/// Fast-path guard: true if at least one hook is installed
#[inline]
pub(crate) fn enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}

/// Invoke `f` on every installed hook
///
/// Callers must check [`enabled`] first; this takes the registry lock.
pub(crate) fn each(f: impl Fn(&dyn ProtocolHook)) {
    for hook in registry().read().iter() {
        f(hook.as_ref());
    }
}
