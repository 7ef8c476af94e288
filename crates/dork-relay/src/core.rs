//! The publish pipeline: the single entry point tying together endpoint
//! resolution, budget enforcement, maildir delivery, adapter dispatch, and
//! trace recording.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dork_core::errors::{BudgetKind, RelayError};
use dork_core::{SpanId, TraceId};
use dork_db::ConnectionPool;
use dork_relay_store::{IndexedMessage, MaildirStore, MessageIndex, MessageQuery, MessageStatus};
use dork_relay_types::{endpoint_hash, validate_subject, Budget, Envelope, EndpointInfo, Span, SpanKind};
use tracing::{instrument, warn};

use crate::adapter::{AdapterContext, AdapterRegistry};
use crate::circuit::CircuitBreakerManager;
use crate::endpoint::EndpointRegistry;
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::trace_store::TraceStore;
use crate::watcher::WatcherManager;

/// Adapter deliveries are wrapped in this timeout; exceeding it is treated
/// as an adapter failure but never rolls back Maildir deliveries.
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Synthetic endpoint hash dead-lettered envelopes are filed under.
const DEADLETTER_HASH: &str = "deadletter";

/// A policy hook consulted before routing; denial aborts the publish.
pub trait AccessPolicy: Send + Sync {
    /// Return `Err(reason)` to deny the publish.
    fn check(&self, subject: &str, from: &str) -> Result<(), String>;
}

/// Options accompanying a [`RelayCore::publish`] call.
#[derive(Clone, Debug, Default)]
pub struct PublishOptions {
    /// The sender subject.
    pub from: String,
    /// Optional reply-to subject.
    pub reply_to: Option<String>,
    /// Caller-supplied budget; defaults are applied for missing fields.
    pub budget: Option<Budget>,
    /// Trace continuation, if this publish is itself caused by another span.
    pub trace_id: Option<TraceId>,
    /// Parent span, if any.
    pub parent_span_id: Option<SpanId>,
}

/// Result of a successful [`RelayCore::publish`] call.
#[derive(Clone, Debug)]
pub struct PublishResult {
    /// The minted envelope's id.
    pub message_id: String,
    /// Count of successful maildir + adapter deliveries.
    pub delivered_to: u32,
}

/// A page of [`RelayCore::read_inbox`] results.
#[derive(Clone, Debug)]
pub struct InboxPage {
    /// Matching messages.
    pub messages: Vec<IndexedMessage>,
    /// Cursor for the next page, if more remain.
    pub next_cursor: Option<String>,
}

/// Ties every Relay subsystem together behind the operations
/// names: `publish`, `readInbox`, `registerEndpoint`, `listEndpoints`,
/// `onSignal`.
pub struct RelayCore {
    maildir: MaildirStore,
    db_pool: ConnectionPool,
    endpoints: EndpointRegistry,
    adapters: AdapterRegistry,
    breakers: Arc<CircuitBreakerManager>,
    policy: Option<Arc<dyn AccessPolicy>>,
    mailboxes_root: String,
    /// Subscriptions fired by the per-endpoint filesystem watchers started
    /// in [`Self::register_endpoint`]. Durable: backed by the Maildir, so a
    /// handler failure is recorded and the message retried from `new/`.
    /// Handlers receive the claimed [`Envelope`] itself, not just its subject.
    subscriptions: Arc<SubscriptionRegistry<Envelope>>,
    /// Drives claim/handle/complete for every watched endpoint.
    watcher: WatcherManager,
    /// `onSignal` handlers. Unlike `subscriptions`, these are invoked
    /// directly by [`Self::publish_signal`] with no Maildir or index
    /// involvement — best-effort, no persistence, no retry, no envelope.
    signals: SubscriptionRegistry<str>,
}

impl RelayCore {
    /// Build a new core rooted at `mailboxes_root`, sharing `db_pool` with
    /// the rest of the daemon.
    ///
    /// # Errors
    /// Returns [`RelayError::Index`] if the index/trace schema cannot be
    /// created.
    pub fn new(mailboxes_root: impl Into<String>, db_pool: ConnectionPool) -> Result<Self, RelayError> {
        let mailboxes_root = mailboxes_root.into();
        {
            let conn = db_pool.get().map_err(|e| {
                RelayError::Filesystem(std::io::Error::other(e.to_string()))
            })?;
            dork_relay_store::ensure_schema(&conn).map_err(RelayError::Index)?;
            crate::trace_store::ensure_schema(&conn).map_err(RelayError::Index)?;
        }
        let maildir = MaildirStore::new(&mailboxes_root);
        let breakers = Arc::new(CircuitBreakerManager::new());
        let subscriptions = Arc::new(SubscriptionRegistry::<Envelope>::new());
        let watcher = WatcherManager::new(maildir.clone(), db_pool.clone(), Arc::clone(&subscriptions), Arc::clone(&breakers));
        Ok(Self {
            maildir,
            db_pool,
            endpoints: EndpointRegistry::new(),
            adapters: AdapterRegistry::new(),
            breakers,
            policy: None,
            mailboxes_root,
            subscriptions,
            watcher,
            signals: SubscriptionRegistry::<str>::new(),
        })
    }

    /// Install an access policy hook. `None` (the default) permits every
    /// publish.
    pub fn set_policy(&mut self, policy: Arc<dyn AccessPolicy>) {
        self.policy = Some(policy);
    }

    /// The endpoint registry, for wiring into the watcher manager.
    #[must_use]
    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    /// The adapter registry, for wiring adapters at startup.
    #[must_use]
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// The circuit breaker manager, consulted by the watcher manager.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    /// Whether `hash` currently has a live filesystem watcher.
    #[must_use]
    pub fn is_watching(&self, hash: &str) -> bool {
        self.watcher.is_watching(hash)
    }

    /// The maildir store, for wiring into the watcher manager.
    #[must_use]
    pub fn maildir(&self) -> &MaildirStore {
        &self.maildir
    }

    fn conn(&self) -> Result<dork_db::PooledConnection, RelayError> {
        self.db_pool
            .get()
            .map_err(|e| RelayError::Filesystem(std::io::Error::other(e.to_string())))
    }

    /// Create the maildir, start watching, and register the subject. No-op
    /// if already registered.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] if the maildir cannot be created or
    /// the watcher cannot be started.
    pub fn register_endpoint(&self, subject: &str) -> Result<EndpointInfo, RelayError> {
        validate_subject(subject).map_err(|reason| RelayError::InvalidSubject {
            subject: subject.to_owned(),
            reason,
        })?;
        let info = self.endpoints.register(subject, &self.mailboxes_root);
        self.maildir.ensure_maildir(&info.hash)?;
        self.watcher
            .watch(&info.hash, subject)
            .map_err(|e| RelayError::Filesystem(std::io::Error::other(e)))?;
        Ok(info)
    }

    /// Remove a registered endpoint and tear down its watcher. The maildir
    /// directory itself is left in place. Returns `false` if the subject was
    /// not registered.
    pub fn unregister_endpoint(&self, subject: &str) -> bool {
        let Some(info) = self.endpoints.get(subject) else {
            return false;
        };
        self.watcher.unwatch(&info.hash);
        self.endpoints.unregister(subject).is_some()
    }

    /// Every registered endpoint.
    #[must_use]
    pub fn list_endpoints(&self) -> Vec<EndpointInfo> {
        self.endpoints.list()
    }

    /// Subscribe a handler to messages arriving at subjects matching
    /// `pattern`. Only fires for subjects with a watched endpoint, once the
    /// message has been claimed out of `new/`, and receives the claimed
    /// envelope itself (payload, sender, budget); a handler panic fails the
    /// delivery (see the watcher module).
    pub fn subscribe(&self, pattern: impl Into<String>, handler: impl Fn(&Envelope) + Send + Sync + 'static) -> Subscription {
        self.subscriptions.subscribe(pattern, handler)
    }

    /// Remove a prior [`Self::subscribe`] registration.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.subscriptions.unsubscribe(subscription.id())
    }

    /// Register an `onSignal` handler. Signals bypass the Maildir entirely:
    /// no persistence, no retry, no circuit breaker involvement. A signal
    /// emitted with no matching handlers is silently dropped.
    pub fn on_signal(&self, pattern: impl Into<String>, handler: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.signals.subscribe(pattern, handler)
    }

    /// Remove a prior [`Self::on_signal`] registration.
    pub fn unsubscribe_signal(&self, subscription: &Subscription) -> bool {
        self.signals.unsubscribe(subscription.id())
    }

    /// Fire every `onSignal` handler whose pattern matches `subject`,
    /// synchronously and in registration order.
    pub fn publish_signal(&self, subject: &str) {
        for handler in self.signals.get_subscribers(subject) {
            handler(subject);
        }
    }

    /// Publish an envelope. See module docs for the full pipeline.
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidSubject`], a `BudgetExceeded` variant, or
    /// [`RelayError::AccessDenied`] if the publish is rejected before
    /// delivery is attempted.
    #[instrument(skip(self, payload), fields(subject = %subject))]
    pub async fn publish(
        &self,
        subject: &str,
        payload: serde_json::Value,
        opts: PublishOptions,
    ) -> Result<PublishResult, RelayError> {
        validate_subject(subject).map_err(|reason| RelayError::InvalidSubject {
            subject: subject.to_owned(),
            reason,
        })?;

        let budget = opts.budget.unwrap_or_else(Budget::default_for_now);
        let envelope = Envelope::mint(subject.to_owned(), opts.from.clone(), opts.reply_to.clone(), payload, budget);
        let trace_id = opts.trace_id.unwrap_or_default();

        if let Err(kind) = self.check_budget(&envelope) {
            self.dead_letter(&envelope, trace_id, opts.parent_span_id, kind)?;
            return Err(RelayError::BudgetExceeded {
                kind,
                message_id: envelope.id.as_str(),
            });
        }

        if let Some(policy) = &self.policy {
            if let Err(reason) = policy.check(subject, &opts.from) {
                self.dead_letter_with_reason(&envelope, trace_id, opts.parent_span_id, &reason)?;
                return Err(RelayError::AccessDenied { reason });
            }
        }

        let started = Instant::now();
        let mut delivered_to = 0u32;

        if let Some(endpoint) = self.endpoints.get(subject) {
            self.maildir.deliver(&endpoint.hash, &envelope)?;
            let conn = self.conn()?;
            let index = MessageIndex::new(&conn);
            index
                .insert_message(&IndexedMessage {
                    id: envelope.id.as_str(),
                    subject: subject.to_owned(),
                    endpoint_hash: endpoint.hash.clone(),
                    status: MessageStatus::Pending,
                    created_at: envelope.created_at.clone(),
                    expires_at: None,
                })
                .map_err(RelayError::Index)?;
            delivered_to += 1;

            let span = Span::new(trace_id, opts.parent_span_id, envelope.id.as_str(), subject, 0, SpanKind::Deliver, 0, None);
            TraceStore::new(&conn).record(&span).map_err(RelayError::Index)?;
        }

        if let Ok(Some(outcome)) = self.deliver_to_adapter(subject, &envelope).await {
            if outcome.success {
                delivered_to += 1;
                let conn = self.conn()?;
                MessageIndex::new(&conn)
                    .insert_message(&IndexedMessage {
                        id: envelope.id.as_str(),
                        subject: subject.to_owned(),
                        endpoint_hash: format!("adapter:{}", endpoint_hash(subject)),
                        status: MessageStatus::Delivered,
                        created_at: envelope.created_at.clone(),
                        expires_at: None,
                    })
                    .map_err(RelayError::Index)?;
            }
        }

        let conn = self.conn()?;
        let publish_span = Span::new(
            trace_id,
            opts.parent_span_id,
            envelope.id.as_str(),
            subject,
            envelope.budget.hop_count,
            SpanKind::Publish,
            i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
            None,
        );
        TraceStore::new(&conn).record(&publish_span).map_err(RelayError::Index)?;

        Ok(PublishResult {
            message_id: envelope.id.as_str(),
            delivered_to,
        })
    }

    fn check_budget(&self, envelope: &Envelope) -> Result<(), BudgetKind> {
        if envelope.budget.hops_exceeded() {
            return Err(BudgetKind::Hops);
        }
        let now = chrono::Utc::now().timestamp_millis();
        if envelope.budget.ttl_exceeded(now) {
            return Err(BudgetKind::Ttl);
        }
        if envelope.budget.calls_exhausted() {
            return Err(BudgetKind::Calls);
        }
        Ok(())
    }

    fn dead_letter(
        &self,
        envelope: &Envelope,
        trace_id: TraceId,
        parent_span_id: Option<SpanId>,
        kind: BudgetKind,
    ) -> Result<(), RelayError> {
        self.dead_letter_with_reason(envelope, trace_id, parent_span_id, &format!("budget exceeded: {kind}"))
    }

    fn dead_letter_with_reason(
        &self,
        envelope: &Envelope,
        trace_id: TraceId,
        parent_span_id: Option<SpanId>,
        reason: &str,
    ) -> Result<(), RelayError> {
        self.maildir.fail_direct(DEADLETTER_HASH, envelope, reason)?;
        let conn = self.conn()?;
        let span = Span::new(
            trace_id,
            parent_span_id,
            envelope.id.as_str(),
            envelope.subject.as_str(),
            envelope.budget.hop_count,
            SpanKind::DeadLetter,
            0,
            Some(reason.to_owned()),
        );
        TraceStore::new(&conn).record(&span).map_err(RelayError::Index)?;
        MessageIndex::new(&conn)
            .insert_message(&IndexedMessage {
                id: envelope.id.as_str(),
                subject: envelope.subject.clone(),
                endpoint_hash: DEADLETTER_HASH.to_owned(),
                status: MessageStatus::Failed,
                created_at: envelope.created_at.clone(),
                expires_at: None,
            })
            .map_err(RelayError::Index)?;
        Ok(())
    }

    async fn deliver_to_adapter(
        &self,
        subject: &str,
        envelope: &Envelope,
    ) -> Result<Option<crate::adapter::AdapterDeliveryOutcome>, RelayError> {
        let hash = format!("adapter:{}", endpoint_hash(subject));
        if !self.breakers.allow(&hash) {
            warn!(subject, "adapter delivery short-circuited by open breaker");
            return Ok(None);
        }

        let result = tokio::time::timeout(
            ADAPTER_TIMEOUT,
            self.adapters.deliver(subject, envelope, Some(AdapterContext::default())),
        )
        .await;

        match result {
            Ok(Ok(outcome)) => {
                match &outcome {
                    Some(o) if o.success => self.breakers.record_success(&hash),
                    Some(_) => self.breakers.record_failure(&hash),
                    None => {}
                }
                Ok(outcome)
            }
            Ok(Err(e)) => {
                self.breakers.record_failure(&hash);
                warn!(subject, error = %e, "adapter delivery failed");
                Ok(None)
            }
            Err(_) => {
                self.breakers.record_failure(&hash);
                warn!(subject, "adapter delivery timed out after 30s");
                Ok(None)
            }
        }
    }

    /// Query an endpoint's SQLite-indexed inbox.
    ///
    /// # Errors
    /// Returns [`RelayError::Index`] on query failure.
    pub fn read_inbox(
        &self,
        endpoint_subject: &str,
        limit: usize,
        status: Option<MessageStatus>,
        cursor: Option<String>,
    ) -> Result<InboxPage, RelayError> {
        let conn = self.conn()?;
        let index = MessageIndex::new(&conn);
        let page = index
            .query_messages(&MessageQuery {
                subject: Some(endpoint_subject.to_owned()),
                status,
                limit,
                cursor,
            })
            .map_err(RelayError::Index)?;
        Ok(InboxPage {
            messages: page.messages,
            next_cursor: page.next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_db::ConnectionConfig;

    fn core() -> (tempfile::TempDir, RelayCore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = dork_db::new_in_memory(&ConnectionConfig::default()).unwrap();
        let core = RelayCore::new(dir.path().join("mailboxes").to_str().unwrap(), pool).unwrap();
        (dir, core)
    }

    #[tokio::test]
    async fn publish_delivers_to_registered_endpoint() {
        let (_dir, core) = core();
        core.register_endpoint("relay.agent.backend").unwrap();

        let result = core
            .publish(
                "relay.agent.backend",
                serde_json::json!({"hello": "world"}),
                PublishOptions {
                    from: "relay.agent.frontend".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.delivered_to, 1);
    }

    #[tokio::test]
    async fn publish_without_registered_endpoint_delivers_nowhere() {
        let (_dir, core) = core();
        let result = core
            .publish(
                "relay.agent.backend",
                serde_json::json!({}),
                PublishOptions {
                    from: "relay.agent.frontend".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.delivered_to, 0);
    }

    #[tokio::test]
    async fn publish_rejects_invalid_subject() {
        let (_dir, core) = core();
        let result = core
            .publish(
                "not-a-subject",
                serde_json::json!({}),
                PublishOptions {
                    from: "relay.agent.frontend".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(RelayError::InvalidSubject { .. })));
    }

    #[tokio::test]
    async fn publish_rejects_exhausted_hop_budget() {
        let (_dir, core) = core();
        core.register_endpoint("relay.agent.backend").unwrap();

        let mut budget = Budget::default_for_now();
        budget.max_hops = 1;
        budget.hop_count = 5;

        let result = core
            .publish(
                "relay.agent.backend",
                serde_json::json!({}),
                PublishOptions {
                    from: "relay.agent.frontend".into(),
                    budget: Some(budget),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(RelayError::BudgetExceeded { kind: BudgetKind::Hops, .. })
        ));
    }

    #[tokio::test]
    async fn publish_denied_by_policy() {
        struct DenyAll;
        impl AccessPolicy for DenyAll {
            fn check(&self, _subject: &str, _from: &str) -> Result<(), String> {
                Err("no access".into())
            }
        }
        let (_dir, mut core) = core();
        core.register_endpoint("relay.agent.backend").unwrap();
        core.set_policy(Arc::new(DenyAll));

        let result = core
            .publish(
                "relay.agent.backend",
                serde_json::json!({}),
                PublishOptions {
                    from: "relay.agent.frontend".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(RelayError::AccessDenied { .. })));
    }

    #[tokio::test]
    async fn read_inbox_returns_pending_message() {
        let (_dir, core) = core();
        core.register_endpoint("relay.agent.backend").unwrap();
        core.publish(
            "relay.agent.backend",
            serde_json::json!({}),
            PublishOptions {
                from: "relay.agent.frontend".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = core.read_inbox("relay.agent.backend", 10, None, None).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].status, MessageStatus::Pending);
    }

    #[test]
    fn register_endpoint_is_idempotent() {
        let (_dir, core) = core();
        let a = core.register_endpoint("relay.agent.backend").unwrap();
        let b = core.register_endpoint("relay.agent.backend").unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(core.list_endpoints().len(), 1);
    }

    #[tokio::test]
    async fn register_endpoint_starts_watcher_and_delivers_to_subscriber() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, core) = core();
        let info = core.register_endpoint("relay.agent.backend").unwrap();
        assert!(core.is_watching(&info.hash));

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let seen_payload = Arc::new(parking_lot::Mutex::new(None));
        let seen = Arc::clone(&seen_payload);
        core.subscribe("relay.agent.*", move |envelope: &Envelope| {
            c.fetch_add(1, Ordering::SeqCst);
            *seen.lock() = Some(envelope.payload.clone());
        });

        core.publish(
            "relay.agent.backend",
            serde_json::json!({"hello": "world"}),
            PublishOptions {
                from: "relay.agent.frontend".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen_payload.lock(), Some(serde_json::json!({"hello": "world"})));
    }

    #[test]
    fn unregister_endpoint_stops_watcher() {
        let (_dir, core) = core();
        let info = core.register_endpoint("relay.agent.backend").unwrap();
        assert!(core.unregister_endpoint("relay.agent.backend"));
        assert!(!core.is_watching(&info.hash));
        assert!(core.list_endpoints().is_empty());
        assert!(!core.unregister_endpoint("relay.agent.backend"));
    }

    #[test]
    fn signal_is_delivered_without_maildir_or_index() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, core) = core();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let subscription = core.on_signal("relay.control.*", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        core.publish_signal("relay.control.pause");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(core.unsubscribe_signal(&subscription));
        core.publish_signal("relay.control.pause");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
