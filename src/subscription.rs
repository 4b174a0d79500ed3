//! The subscription contract
//!
//! A `Subscription` is the handle a subscriber uses to pull values
//! (`request`) and to tear the pipeline down (`cancel`). Requests are
//! additive and serialized per subscription; cancel is idempotent. The
//! shared [`SubscriptionStatus`] state machine is the progression every
//! stage in the crate follows.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::cancel::Cancellable;
use crate::demand::Demand;
use crate::hooks;
use crate::ident::NodeId;

/// The handle by which a subscriber requests demand and cancels
///
/// After a subscription has delivered a completion, or after `cancel`, no
/// further values or terminals may be delivered through it.
pub trait Subscription: Cancellable {
    /// Allow up to `demand` additional values to be delivered
    ///
    /// Additive: multiple calls sum, saturating at unlimited. `demand` must
    /// be non-zero; passing `Demand::NONE` is a contract violation caught by
    /// a debug assertion.
    fn request(&self, demand: Demand);
}

impl<T: Subscription + ?Sized> Subscription for Arc<T> {
    fn request(&self, demand: Demand) {
        (**self).request(demand)
    }
}

impl<T: Cancellable + ?Sized> Cancellable for Arc<T> {
    fn cancel(&self) {
        (**self).cancel()
    }
}

/// Cloneable type-erased subscription handle
///
/// All requests and cancels flow through this wrapper, which is also where
/// the zero-demand assertion and the introspection taps live.
#[derive(Clone)]
pub struct AnySubscription {
    id: NodeId,
    inner: Arc<dyn Subscription>,
}

impl AnySubscription {
    /// Erase a concrete subscription
    pub fn new(subscription: impl Subscription + 'static) -> AnySubscription {
        AnySubscription {
            id: NodeId::next(),
            inner: Arc::new(subscription),
        }
    }

    /// Erase an already shared subscription without re-boxing
    pub fn from_arc(subscription: Arc<dyn Subscription>) -> AnySubscription {
        AnySubscription {
            id: NodeId::next(),
            inner: subscription,
        }
    }

    /// The shared no-op subscription
    ///
    /// Handed to subscribers by publishers that have nothing to produce,
    /// e.g. a hub that already completed. Its `request` and `cancel` do
    /// nothing.
    pub fn empty() -> AnySubscription {
        static EMPTY: OnceLock<AnySubscription> = OnceLock::new();
        EMPTY
            .get_or_init(|| AnySubscription::new(EmptySubscription))
            .clone()
    }

    /// This handle's identity
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Subscription for AnySubscription {
    fn request(&self, demand: Demand) {
        debug_assert!(
            !demand.is_none(),
            "request(Demand::NONE) violates the subscription contract"
        );
        if hooks::enabled() {
            hooks::each(|h| h.will_request(self.id, demand));
        }
        self.inner.request(demand);
        if hooks::enabled() {
            hooks::each(|h| h.did_request(self.id, demand));
        }
    }
}

impl Cancellable for AnySubscription {
    fn cancel(&self) {
        if hooks::enabled() {
            hooks::each(|h| h.will_cancel(self.id));
        }
        self.inner.cancel();
        if hooks::enabled() {
            hooks::each(|h| h.did_cancel(self.id));
        }
    }
}

impl fmt::Debug for AnySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySubscription").field("id", &self.id).finish()
    }
}

/// The no-op subscription behind [`AnySubscription::empty`]
struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}
}

impl Cancellable for EmptySubscription {
    fn cancel(&self) {}
}

/// Lifecycle state shared by every stage in the crate
///
/// The only legal progression is
/// `Awaiting → Subscribed → (PendingTerminal →)? Terminal`.
/// `PendingTerminal` appears only when a stage defers terminal delivery
/// across a scheduler hop and must still honor the upstream handle until
/// the hop lands.
pub(crate) enum SubscriptionStatus {
    /// No upstream subscription has arrived yet
    Awaiting,
    /// Actively subscribed upstream
    Subscribed(AnySubscription),
    /// A terminal has been observed but not yet delivered downstream
    PendingTerminal(AnySubscription),
    /// Completed, failed, or cancelled; all references released
    Terminal,
}

impl SubscriptionStatus {
    /// The upstream handle while one is retained
    pub(crate) fn subscription(&self) -> Option<&AnySubscription> {
        match self {
            SubscriptionStatus::Subscribed(s) | SubscriptionStatus::PendingTerminal(s) => Some(s),
            _ => None,
        }
    }

    /// True once no further deliveries are permitted
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Terminal)
    }

    /// Move to `Terminal`, returning the retained upstream handle, if any
    pub(crate) fn take(&mut self) -> Option<AnySubscription> {
        match std::mem::replace(self, SubscriptionStatus::Terminal) {
            SubscriptionStatus::Subscribed(s) | SubscriptionStatus::PendingTerminal(s) => Some(s),
            _ => None,
        }
    }
}
