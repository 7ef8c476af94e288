//! Endpoint registry: the `{subject -> hash -> maildirPath}` mapping.

use dashmap::DashMap;
use dork_relay_types::{endpoint_hash, matches, EndpointInfo};

/// In-memory endpoint registry, backed by the maildir store for persistence
/// of the directories themselves (the mapping is recomputed deterministically
/// from the subject via [`endpoint_hash`], so no separate persistence file is
/// required to survive restart).
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<String, EndpointInfo>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subject`, returning its info. Idempotent: re-registering
    /// the same subject returns the existing entry unchanged.
    pub fn register(&self, subject: &str, maildir_root: &str) -> EndpointInfo {
        self.endpoints
            .entry(subject.to_owned())
            .or_insert_with(|| EndpointInfo::new(subject.to_owned(), maildir_root))
            .clone()
    }

    /// Remove the entry for `subject`. The maildir directory itself is left
    /// on disk so a later re-register recovers any undelivered messages.
    pub fn unregister(&self, subject: &str) -> Option<EndpointInfo> {
        self.endpoints.remove(subject).map(|(_, v)| v)
    }

    /// Look up by exact subject.
    #[must_use]
    pub fn get(&self, subject: &str) -> Option<EndpointInfo> {
        self.endpoints.get(subject).map(|e| e.clone())
    }

    /// Look up by endpoint hash.
    #[must_use]
    pub fn get_by_hash(&self, hash: &str) -> Option<EndpointInfo> {
        self.endpoints.iter().find(|e| e.hash == hash).map(|e| e.clone())
    }

    /// Every concrete endpoint whose subject matches `pattern`.
    #[must_use]
    pub fn list_matching(&self, pattern: &str) -> Vec<EndpointInfo> {
        self.endpoints
            .iter()
            .filter(|e| matches(pattern, e.subject.as_str()))
            .map(|e| e.clone())
            .collect()
    }

    /// Every registered endpoint.
    #[must_use]
    pub fn list(&self) -> Vec<EndpointInfo> {
        self.endpoints.iter().map(|e| e.clone()).collect()
    }

    /// The deterministic hash for a subject, independent of registration
    /// state (used by the publish pipeline for dead-letter routing).
    #[must_use]
    pub fn hash_for(subject: &str) -> String {
        endpoint_hash(subject)
    }
}
