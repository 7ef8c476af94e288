//! One filesystem watcher per registered endpoint, observing `new/` for
//! freshly delivered envelopes and driving them through claim → handle →
//! complete/fail.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dork_core::errors::ErrorCollector;
use dork_relay_store::{MaildirStore, MessageIndex, MessageStatus};
use dork_relay_types::Envelope;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::circuit::CircuitBreakerManager;
use crate::subscription::SubscriptionRegistry;

/// Owns the live `notify` watcher and its draining task for one endpoint.
struct WatchedEndpoint {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

/// Drives `notify` events for every registered endpoint's `new/` directory
/// into claim/handle/complete cycles.
pub struct WatcherManager {
    maildir: MaildirStore,
    db_pool: dork_db::ConnectionPool,
    subscriptions: Arc<SubscriptionRegistry<Envelope>>,
    breakers: Arc<CircuitBreakerManager>,
    watched: DashMap<String, WatchedEndpoint>,
}

impl WatcherManager {
    /// Build a new manager sharing the maildir store, database pool,
    /// subscription registry, and circuit breaker manager with the rest of
    /// the relay.
    #[must_use]
    pub fn new(
        maildir: MaildirStore,
        db_pool: dork_db::ConnectionPool,
        subscriptions: Arc<SubscriptionRegistry<Envelope>>,
        breakers: Arc<CircuitBreakerManager>,
    ) -> Self {
        Self {
            maildir,
            db_pool,
            subscriptions,
            breakers,
            watched: DashMap::new(),
        }
    }

    /// Start watching `hash`'s `new/` directory. Idempotent: starting an
    /// already-watched endpoint is a no-op.
    ///
    /// # Errors
    /// Returns a description of the `notify` failure.
    pub fn watch(&self, hash: &str, subject: &str) -> Result<(), String> {
        if self.watched.contains_key(hash) {
            return Ok(());
        }

        let dir = self.maildir.root().join(hash).join("new");
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Create(_)) {
                return;
            }
            for path in event.paths {
                let _ = tx.send(path);
            }
        })
        .map_err(|e| e.to_string())?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| e.to_string())?;

        let maildir = self.maildir.clone();
        let db_pool = self.db_pool.clone();
        let subscriptions = Arc::clone(&self.subscriptions);
        let breakers = Arc::clone(&self.breakers);
        let hash = hash.to_owned();
        let subject = subject.to_owned();

        let task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(id) = file_name.strip_suffix(".json") else {
                    continue;
                };
                handle_new_message(&maildir, &db_pool, &subscriptions, &breakers, &hash, &subject, id);
            }
        });

        self.watched.insert(hash.to_owned(), WatchedEndpoint { _watcher: watcher, task });
        Ok(())
    }

    /// Tear down every watcher. Failures are isolated: one watcher's task
    /// failing to join does not prevent the others from being aborted.
    pub async fn close_all(&self) -> ErrorCollector {
        let mut collector = ErrorCollector::new();
        let hashes: Vec<String> = self.watched.iter().map(|e| e.key().clone()).collect();
        for hash in hashes {
            if let Some((_, endpoint)) = self.watched.remove(&hash) {
                endpoint.task.abort();
                if let Err(e) = endpoint.task.await {
                    if !e.is_cancelled() {
                        collector.collect(format!("watcher:{hash}"), e);
                    }
                }
            }
        }
        collector
    }

    /// Is `hash` currently being watched?
    #[must_use]
    pub fn is_watching(&self, hash: &str) -> bool {
        self.watched.contains_key(hash)
    }

    /// Stop watching `hash`, if currently watched. The draining task is
    /// aborted without waiting for it to join. Returns `false` if `hash`
    /// was not being watched.
    pub fn unwatch(&self, hash: &str) -> bool {
        let Some((_, endpoint)) = self.watched.remove(hash) else {
            return false;
        };
        endpoint.task.abort();
        true
    }
}

fn handle_new_message(
    maildir: &MaildirStore,
    db_pool: &dork_db::ConnectionPool,
    subscriptions: &SubscriptionRegistry<Envelope>,
    breakers: &CircuitBreakerManager,
    hash: &str,
    subject: &str,
    id: &str,
) {
    let Ok(Some(envelope)) = maildir.claim(hash, id) else {
        return;
    };

    if !breakers.allow(hash) {
        warn!(hash, id, "delivery short-circuited by open breaker");
        if let Err(e) = maildir.fail(hash, id, "circuit breaker open") {
            error!(hash, id, error = %e, "failed to move message to failed/");
        }
        if let Ok(conn) = db_pool.get() {
            let _ = MessageIndex::new(&conn).update_status(id, MessageStatus::Failed);
        } else {
            error!(hash, id, "failed to acquire db connection for delivery bookkeeping");
        }
        return;
    }

    let handlers = subscriptions.get_subscribers(subject);
    let mut failure: Option<String> = None;
    for handler in &handlers {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&envelope)));
        if outcome.is_err() {
            failure = Some("handler panicked".to_owned());
            break;
        }
    }

    let Ok(conn) = db_pool.get() else {
        error!(hash, id, "failed to acquire db connection for delivery bookkeeping");
        return;
    };
    let index = MessageIndex::new(&conn);

    match failure {
        Some(reason) => {
            breakers.record_failure(hash);
            if let Err(e) = maildir.fail(hash, id, &reason) {
                error!(hash, id, error = %e, "failed to move message to failed/");
            }
            let _ = index.update_status(id, MessageStatus::Failed);
            warn!(hash, id, reason, "message delivery failed");
        }
        None => {
            breakers.record_success(hash);
            if let Err(e) = maildir.complete(hash, id) {
                error!(hash, id, error = %e, "failed to complete delivered message");
            }
            let _ = index.update_status(id, MessageStatus::Delivered);
            info!(hash, id, "message delivered");
        }
    }
}
