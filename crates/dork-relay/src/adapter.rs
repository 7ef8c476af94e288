//! Adapter registry: external channel drivers addressed by subject prefix.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use dork_core::errors::RelayError;
use dork_relay_types::Envelope;
use serde::Serialize;
use serde_json::Value;

/// Connection lifecycle state reported by an adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    /// Not connected and not currently attempting to connect.
    Disconnected,
    /// `start()` is in flight.
    Connecting,
    /// Ready to deliver.
    Connected,
    /// The last connection attempt or delivery failed.
    Error,
}

/// A snapshot of an adapter's status. Always a copy — callers may not
/// observe or mutate the adapter's live internal state through this type.
#[derive(Clone, Debug, Serialize)]
pub struct AdapterStatus {
    /// Current lifecycle state.
    pub state: AdapterState,
    /// Messages received from the external channel.
    pub inbound_count: u64,
    /// Messages delivered to the external channel.
    pub outbound_count: u64,
    /// Total delivery errors observed.
    pub error_count: u64,
    /// When `start()` last completed successfully, ISO-8601.
    pub started_at: Option<String>,
    /// The most recent error message, if any.
    pub last_error: Option<String>,
}

/// Outcome of an outbound [`RelayAdapter::deliver`] call.
#[derive(Clone, Debug)]
pub struct AdapterDeliveryOutcome {
    /// Whether the adapter reports success.
    pub success: bool,
    /// Wall-clock duration of the delivery attempt.
    pub duration_ms: i64,
    /// Error message, if unsuccessful.
    pub error: Option<String>,
    /// Whether the envelope was dead-lettered as a result.
    pub dead_lettered: bool,
}

/// Context passed to an adapter's `deliver` call, carrying anything the
/// driver needs beyond the envelope itself (reply routing, auth tokens).
#[derive(Clone, Debug, Default)]
pub struct AdapterContext {
    /// Arbitrary structured context, adapter-defined.
    pub fields: Value,
}

/// An external channel driver (chat bot, webhook sink, etc).
#[async_trait]
pub trait RelayAdapter: Send + Sync {
    /// Stable instance identifier.
    fn id(&self) -> &str;

    /// Every subject beginning with this dot-bounded prefix is owned by this
    /// adapter.
    fn subject_prefix(&self) -> &str;

    /// Human-readable name for status displays.
    fn display_name(&self) -> &str;

    /// Begin the adapter's connection lifecycle.
    ///
    /// # Errors
    /// Returns [`RelayError::AdapterFailed`] if the adapter could not start.
    async fn start(&self) -> Result<(), RelayError>;

    /// Tear down the adapter's connection.
    ///
    /// # Errors
    /// Returns [`RelayError::AdapterFailed`] if teardown failed.
    async fn stop(&self) -> Result<(), RelayError>;

    /// Deliver one envelope to the external channel.
    ///
    /// # Errors
    /// Returns [`RelayError::AdapterFailed`] if the delivery attempt itself
    /// could not be made (distinct from an unsuccessful
    /// [`AdapterDeliveryOutcome`], which is reported via `Ok`).
    async fn deliver(
        &self,
        subject: &str,
        envelope: &Envelope,
        context: Option<AdapterContext>,
    ) -> Result<AdapterDeliveryOutcome, RelayError>;

    /// Current status snapshot.
    fn status(&self) -> AdapterStatus;
}

struct Registration {
    adapter: Arc<dyn RelayAdapter>,
}

/// Holds at most one adapter per `id`; registering an existing id is a
/// hot-reload.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<String, Registration>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or hot-reload) an adapter. Starts the new instance first;
    /// only if its `start()` succeeds is any prior instance with the same id
    /// stopped. If the new instance fails to start, the prior instance (if
    /// any) remains active and this call returns the error.
    ///
    /// # Errors
    /// Returns [`RelayError::AdapterFailed`] if the new adapter's `start()`
    /// fails. The prior registration, if any, is left untouched.
    pub async fn register(&self, adapter: Arc<dyn RelayAdapter>) -> Result<(), RelayError> {
        adapter.start().await?;

        let previous = self
            .adapters
            .insert(adapter.id().to_owned(), Registration { adapter: Arc::clone(&adapter) })
            .map(|r| r.adapter);

        if let Some(previous) = previous {
            let _ = previous.stop().await;
        }
        Ok(())
    }

    /// Find the adapter whose `subjectPrefix` is a dot-bounded prefix of
    /// `subject` and deliver through it.
    ///
    /// # Errors
    /// Propagates the adapter's [`RelayError`] if delivery could not be
    /// attempted.
    pub async fn deliver(
        &self,
        subject: &str,
        envelope: &Envelope,
        context: Option<AdapterContext>,
    ) -> Result<Option<AdapterDeliveryOutcome>, RelayError> {
        let matched = self
            .adapters
            .iter()
            .find(|entry| is_prefix_match(entry.value().adapter.subject_prefix(), subject))
            .map(|entry| Arc::clone(&entry.value().adapter));

        match matched {
            Some(adapter) => Ok(Some(adapter.deliver(subject, envelope, context).await?)),
            None => Ok(None),
        }
    }

    /// Stop every registered adapter concurrently, isolating failures so one
    /// failing shutdown does not block the others.
    pub async fn shutdown(&self) -> dork_core::errors::ErrorCollector {
        let handles: Vec<_> = self.adapters.iter().map(|e| Arc::clone(&e.value().adapter)).collect();

        let mut collector = dork_core::errors::ErrorCollector::new();
        let results = futures::future::join_all(handles.iter().map(|a| a.stop())).await;
        for (adapter, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                collector.collect(format!("adapter:{}", adapter.id()), e);
            }
        }
        collector
    }

    /// Snapshot of every registered adapter's status, keyed by id.
    #[must_use]
    pub fn statuses(&self) -> std::collections::BTreeMap<String, AdapterStatus> {
        self.adapters
            .iter()
            .map(|e| (e.key().clone(), e.value().adapter.status()))
            .collect()
    }
}

fn is_prefix_match(prefix: &str, subject: &str) -> bool {
    if subject == prefix {
        return true;
    }
    subject
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Helper for adapter implementations tracking wall-clock delivery duration.
#[must_use]
pub fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
