//! Cancellation tokens
//!
//! An [`AnyCancellable`] owns a teardown closure that runs at most once:
//! explicitly via [`cancel`](Cancellable::cancel), or implicitly when the
//! token is dropped. Tokens hash and compare by identity so they can be
//! collected into a `HashSet` and torn down together when the set drops.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

use crate::ident::NodeId;

/// A handle whose `cancel` tears down a pipeline at most once
pub trait Cancellable: Send + Sync {
    /// Stop the activity this handle controls
    ///
    /// Idempotent: calling twice is observationally equivalent to calling
    /// once.
    fn cancel(&self);

    /// Erase into an [`AnyCancellable`]
    ///
    /// Erasing an `AnyCancellable` returns it unchanged.
    fn erased(self) -> AnyCancellable
    where
        Self: Sized + 'static,
    {
        AnyCancellable::new(move || self.cancel())
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Type-erased cancellation token that cancels on drop
pub struct AnyCancellable {
    id: NodeId,
    teardown: Mutex<Option<Teardown>>,
}

impl AnyCancellable {
    /// Wrap a teardown closure
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> AnyCancellable {
        AnyCancellable {
            id: NodeId::next(),
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A token with no teardown, useful as a placeholder
    pub fn empty() -> AnyCancellable {
        AnyCancellable {
            id: NodeId::next(),
            teardown: Mutex::new(None),
        }
    }

    /// The token's identity
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Move this token into a collection of cancellables
    ///
    /// Works with both `HashSet<AnyCancellable>` and `Vec<AnyCancellable>`.
    /// Dropping the collection drops every stored token, tearing the
    /// associated pipelines down.
    pub fn store_in<C>(self, collection: &mut C)
    where
        C: Extend<AnyCancellable>,
    {
        collection.extend(std::iter::once(self));
    }
}

impl Cancellable for AnyCancellable {
    fn cancel(&self) {
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    fn erased(self) -> AnyCancellable {
        self
    }
}

impl Drop for AnyCancellable {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl PartialEq for AnyCancellable {
    fn eq(&self, other: &AnyCancellable) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyCancellable {}

impl Hash for AnyCancellable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AnyCancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyCancellable")
            .field("id", &self.id)
            .field("armed", &self.teardown.lock().is_some())
            .finish()
    }
}

/// Convenience alias for the idiomatic RAII bag of tokens
pub type CancellableSet = HashSet<AnyCancellable>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_token(count: &Arc<AtomicUsize>) -> AnyCancellable {
        let count = Arc::clone(count);
        AnyCancellable::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_cancel_runs_teardown_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let token = counting_token(&count);
        token.cancel();
        token.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_teardown() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(counting_token(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_after_cancel_is_noop() {
        let count = Arc::new(AtomicUsize::new(0));
        let token = counting_token(&count);
        token.cancel();
        drop(token);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identity_equality_and_hashing() {
        let a = AnyCancellable::empty();
        let b = AnyCancellable::empty();
        assert_ne!(a, b);

        let mut set = CancellableSet::new();
        let id = a.id();
        a.store_in(&mut set);
        b.store_in(&mut set);
        assert_eq!(set.len(), 2);
        assert!(set.iter().any(|t| t.id() == id));
    }

    #[test]
    fn test_bag_drop_tears_down_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut set = CancellableSet::new();
        counting_token(&count).store_in(&mut set);
        counting_token(&count).store_in(&mut set);
        counting_token(&count).store_in(&mut set);
        drop(set);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_store_in_vec() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut bag: Vec<AnyCancellable> = Vec::new();
        counting_token(&count).store_in(&mut bag);
        counting_token(&count).store_in(&mut bag);
        drop(bag);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_erased_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let token = counting_token(&count);
        let id = token.id();
        let erased = token.erased();
        assert_eq!(erased.id(), id);
        erased.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
