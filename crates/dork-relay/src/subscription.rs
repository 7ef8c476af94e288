//! In-memory subject-pattern subscriptions.
//!
//! Generic over the payload handlers receive: the Maildir-backed
//! subscription path hands subscribers the claimed [`dork_relay_types::Envelope`]
//! (so they can read its payload/from/budget), while the best-effort
//! `onSignal` side-channel has no envelope at all and uses the bare subject
//! string. Both share the same pattern-matching/registration machinery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dork_relay_types::matches;
use parking_lot::RwLock;

/// Opaque handle returned by [`SubscriptionRegistry::subscribe`]; dropping it
/// does nothing — call [`Unsubscribe::run`] (or just `unsubscribe(id)`)
/// explicitly, matching the callback-registry style used elsewhere.
pub struct Subscription {
    id: u64,
}

impl Subscription {
    /// The subscription id, for explicit `unsubscribe` calls.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct Entry<T: ?Sized> {
    id: u64,
    pattern: String,
    handler: Arc<dyn Fn(&T) + Send + Sync>,
}

/// Associates subject patterns with handler callbacks. `T` is the payload
/// type handed to subscribers — `Envelope` for Maildir-backed deliveries,
/// `str` for the bare-subject `onSignal` side-channel.
pub struct SubscriptionRegistry<T: ?Sized = str> {
    entries: RwLock<Vec<Entry<T>>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self { entries: RwLock::new(Vec::new()), next_id: AtomicU64::new(0) }
    }
}

impl<T: ?Sized> SubscriptionRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every concrete subject matching `pattern`.
    /// Returns a [`Subscription`] handle; call [`Self::unsubscribe`] with its
    /// id to remove it. Independent calls with the same pattern are
    /// independent subscriptions — both fire on a matching delivery.
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push(Entry {
            id,
            pattern: pattern.into(),
            handler: Arc::new(handler),
        });
        Subscription { id }
    }

    /// Remove a subscription by id. Returns `true` iff it existed.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Every handler whose pattern matches `concrete_subject`, in
    /// registration order.
    #[must_use]
    pub fn get_subscribers(&self, concrete_subject: &str) -> Vec<Arc<dyn Fn(&T) + Send + Sync>> {
        self.entries
            .read()
            .iter()
            .filter(|e| matches(&e.pattern, concrete_subject))
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }
}
