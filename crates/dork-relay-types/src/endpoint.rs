//! Endpoint descriptors — the `{subject → hash → maildirPath}` mapping.

use serde::{Deserialize, Serialize};

use crate::subject::endpoint_hash;

/// Describes one registered concrete-subject endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// The concrete subject this endpoint serves.
    pub subject: String,
    /// Deterministic hash of `subject`, used as the maildir directory name.
    pub hash: String,
    /// Filesystem path of the endpoint's maildir root (containing `new/`,
    /// `cur/`, `failed/`).
    #[serde(rename = "maildirPath")]
    pub maildir_path: String,
}

impl EndpointInfo {
    /// Build an endpoint descriptor, deriving its hash from `subject`.
    #[must_use]
    pub fn new(subject: String, maildir_root: &str) -> Self {
        let hash = endpoint_hash(&subject);
        let maildir_path = format!("{maildir_root}/{hash}");
        Self {
            subject,
            hash,
            maildir_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_hash_and_path() {
        let info = EndpointInfo::new("relay.agent.backend".into(), "/var/dork/relay");
        assert_eq!(info.hash, endpoint_hash("relay.agent.backend"));
        assert!(info.maildir_path.ends_with(&info.hash));
    }

    #[test]
    fn same_subject_yields_same_hash() {
        let a = EndpointInfo::new("relay.agent.backend".into(), "/root");
        let b = EndpointInfo::new("relay.agent.backend".into(), "/root");
        assert_eq!(a.hash, b.hash);
    }
}
