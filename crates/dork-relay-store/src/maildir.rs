//! Maildir-backed envelope persistence.
//!
//! Three sibling directories per endpoint — `new/`, `cur/`, `failed/` — with
//! every write-visible transition implemented as an atomic rename. Writers
//! land in a scratch `tmp/` directory, fsync, then rename into place; the
//! rename is the commit point. A crash mid-write leaves at most a stray
//! `tmp/` file, never a half-written entry a watcher would try to parse.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use dork_core::errors::RelayError;
use dork_relay_types::Envelope;

/// Outcome of [`MaildirStore::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverOutcome {
    /// Always true: `deliver` either succeeds or returns an error.
    pub ok: bool,
}

/// Maildir persistence rooted at one directory per the daemon's `mailboxes/`
/// tree (`mailboxes/<hash>/{new,cur,failed,tmp}`).
#[derive(Clone, Debug)]
pub struct MaildirStore {
    root: PathBuf,
}

impl MaildirStore {
    /// Root directory containing one subdirectory per endpoint hash.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn endpoint_dir(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// Idempotently create `new/`, `cur/`, `failed/`, and a scratch `tmp/`
    /// directory for a newly registered endpoint.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] if directory creation fails.
    pub fn ensure_maildir(&self, hash: &str) -> Result<(), RelayError> {
        let dir = self.endpoint_dir(hash);
        for sub in ["new", "cur", "failed", "tmp"] {
            fs::create_dir_all(dir.join(sub)).map_err(RelayError::Filesystem)?;
        }
        Ok(())
    }

    /// Write `envelope` to a scratch file, fsync it, then atomically rename
    /// into `new/<id>.json`.
    ///
    /// Idempotent per id: if `new/<id>.json`, `cur/<id>.json`, or
    /// `failed/<id>.json` already exists, this is a no-op that still
    /// returns `ok`.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] if the maildir does not exist or
    /// the write/rename fails.
    pub fn deliver(&self, hash: &str, envelope: &Envelope) -> Result<DeliverOutcome, RelayError> {
        let dir = self.endpoint_dir(hash);
        let id = envelope.id.as_str();

        for sub in ["new", "cur", "failed"] {
            if dir.join(sub).join(format!("{id}.json")).exists() {
                return Ok(DeliverOutcome { ok: true });
            }
        }

        let json = serde_json::to_vec_pretty(envelope).map_err(|e| {
            RelayError::Filesystem(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let scratch_dir = dir.join("tmp");
        fs::create_dir_all(&scratch_dir).map_err(RelayError::Filesystem)?;
        let scratch_path = scratch_dir.join(format!("{id}.json.tmp"));

        {
            let mut file = File::create(&scratch_path).map_err(RelayError::Filesystem)?;
            file.write_all(&json).map_err(RelayError::Filesystem)?;
            file.sync_all().map_err(RelayError::Filesystem)?;
        }

        let target = dir.join("new").join(format!("{id}.json"));
        fs::rename(&scratch_path, &target).map_err(RelayError::Filesystem)?;

        Ok(DeliverOutcome { ok: true })
    }

    /// Write `envelope` straight into `failed/` without transiting `new/`.
    ///
    /// Used for budget rejections and policy denials at publish time, where
    /// the envelope is dead-lettered before ever being eligible for
    /// delivery.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] if the write fails.
    pub fn fail_direct(
        &self,
        hash: &str,
        envelope: &Envelope,
        reason: &str,
    ) -> Result<(), RelayError> {
        let dir = self.endpoint_dir(hash);
        self.ensure_maildir(hash)?;
        let id = envelope.id.as_str();

        let record = FailedRecord {
            envelope: envelope.clone(),
            reason: reason.to_owned(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| {
            RelayError::Filesystem(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let scratch_dir = dir.join("tmp");
        let scratch_path = scratch_dir.join(format!("{id}.json.tmp"));
        {
            let mut file = File::create(&scratch_path).map_err(RelayError::Filesystem)?;
            file.write_all(&json).map_err(RelayError::Filesystem)?;
            file.sync_all().map_err(RelayError::Filesystem)?;
        }
        let target = dir.join("failed").join(format!("{id}.json"));
        fs::rename(&scratch_path, &target).map_err(RelayError::Filesystem)?;
        Ok(())
    }

    /// Rename `new/<id>.json` to `cur/<id>.json` and parse its contents.
    ///
    /// Returns `Ok(None)` if the file is absent — another watcher already
    /// claimed it, or it was never delivered.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] on I/O failure other than
    /// not-found, or if the claimed file fails to parse as an envelope.
    pub fn claim(&self, hash: &str, id: &str) -> Result<Option<Envelope>, RelayError> {
        let dir = self.endpoint_dir(hash);
        let source = dir.join("new").join(format!("{id}.json"));
        let target = dir.join("cur").join(format!("{id}.json"));

        match fs::rename(&source, &target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RelayError::Filesystem(e)),
        }

        let bytes = fs::read(&target).map_err(RelayError::Filesystem)?;
        let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| {
            RelayError::Filesystem(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        Ok(Some(envelope))
    }

    /// Remove `cur/<id>.json`. Safe if already absent.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] on I/O failure other than
    /// not-found.
    pub fn complete(&self, hash: &str, id: &str) -> Result<(), RelayError> {
        let path = self.endpoint_dir(hash).join("cur").join(format!("{id}.json"));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::Filesystem(e)),
        }
    }

    /// Rename `cur/<id>.json` to `failed/<id>.json`, embedding `reason` in a
    /// `.meta` sidecar. Safe if the source file is already absent.
    ///
    /// # Errors
    /// Returns [`RelayError::Filesystem`] on I/O failure other than
    /// not-found.
    pub fn fail(&self, hash: &str, id: &str, reason: &str) -> Result<(), RelayError> {
        let dir = self.endpoint_dir(hash);
        let source = dir.join("cur").join(format!("{id}.json"));
        let target = dir.join("failed").join(format!("{id}.json"));

        match fs::rename(&source, &target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(RelayError::Filesystem(e)),
        }

        let meta_path = dir.join("failed").join(format!("{id}.meta"));
        let _ = fs::write(&meta_path, reason);
        Ok(())
    }

    /// List message ids currently sitting in `new/` for an endpoint, used
    /// by [`crate::index::MessageIndex::rebuild`] and the watcher's
    /// directory-scan bootstrap.
    #[must_use]
    pub fn scan_directory(&self, hash: &str, dir_name: &str) -> Vec<String> {
        let dir = self.endpoint_dir(hash).join(dir_name);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_suffix(".json").map(str::to_owned)
            })
            .collect()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct FailedRecord {
    envelope: Envelope,
    reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_relay_types::{Budget, Envelope};
    use serde_json::json;

    fn store() -> (tempfile::TempDir, MaildirStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MaildirStore::new(dir.path());
        (dir, store)
    }

    fn test_envelope() -> Envelope {
        Envelope::mint(
            "relay.agent.backend".into(),
            "relay.agent.frontend".into(),
            None,
            json!({"hello": "world"}),
            Budget::default_for_now(),
        )
    }

    #[test]
    fn deliver_creates_file_in_new() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        let outcome = store.deliver("h1", &env).unwrap();
        assert!(outcome.ok);
        assert!(store.scan_directory("h1", "new").contains(&env.id.as_str()));
    }

    #[test]
    fn deliver_is_idempotent() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        store.deliver("h1", &env).unwrap();
        let second = store.deliver("h1", &env).unwrap();
        assert!(second.ok);
        assert_eq!(store.scan_directory("h1", "new").len(), 1);
    }

    #[test]
    fn claim_moves_new_to_cur() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        store.deliver("h1", &env).unwrap();

        let claimed = store.claim("h1", &env.id.as_str()).unwrap();
        assert!(claimed.is_some());
        assert!(store.scan_directory("h1", "new").is_empty());
        assert!(store.scan_directory("h1", "cur").contains(&env.id.as_str()));
    }

    #[test]
    fn claim_returns_none_when_already_claimed() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        store.deliver("h1", &env).unwrap();
        store.claim("h1", &env.id.as_str()).unwrap();

        let second_claim = store.claim("h1", &env.id.as_str()).unwrap();
        assert!(second_claim.is_none());
    }

    #[test]
    fn complete_removes_cur_file() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        store.deliver("h1", &env).unwrap();
        store.claim("h1", &env.id.as_str()).unwrap();
        store.complete("h1", &env.id.as_str()).unwrap();
        assert!(store.scan_directory("h1", "cur").is_empty());
    }

    #[test]
    fn complete_is_safe_if_absent() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        store.complete("h1", "nonexistent").unwrap();
    }

    #[test]
    fn fail_moves_cur_to_failed_with_sidecar() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        store.deliver("h1", &env).unwrap();
        store.claim("h1", &env.id.as_str()).unwrap();
        store.fail("h1", &env.id.as_str(), "handler threw").unwrap();

        assert!(store.scan_directory("h1", "failed").contains(&env.id.as_str()));
        let meta_path = store
            .root()
            .join("h1")
            .join("failed")
            .join(format!("{}.meta", env.id.as_str()));
        assert_eq!(fs::read_to_string(meta_path).unwrap(), "handler threw");
    }

    #[test]
    fn fail_is_safe_if_absent() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        store.fail("h1", "nonexistent", "reason").unwrap();
    }

    #[test]
    fn fail_direct_writes_straight_to_failed() {
        let (_dir, store) = store();
        let env = test_envelope();
        store.fail_direct("h1", &env, "budget exceeded").unwrap();
        assert!(store.scan_directory("h1", "new").is_empty());
        assert!(store.scan_directory("h1", "failed").contains(&env.id.as_str()));
    }

    #[test]
    fn deliver_fails_without_ensure_maildir() {
        let (_dir, store) = store();
        let env = test_envelope();
        let result = store.deliver("missing-endpoint", &env);
        assert!(result.is_err());
    }

    #[test]
    fn ensure_maildir_is_idempotent() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        store.ensure_maildir("h1").unwrap();
        assert!(store.root().join("h1").join("new").is_dir());
    }

    #[test]
    fn envelope_occupies_at_most_one_directory() {
        let (_dir, store) = store();
        store.ensure_maildir("h1").unwrap();
        let env = test_envelope();
        store.deliver("h1", &env).unwrap();

        let dirs = ["new", "cur", "failed"];
        let present: Vec<_> = dirs
            .iter()
            .filter(|d| store.scan_directory("h1", d).contains(&env.id.as_str()))
            .collect();
        assert_eq!(present.len(), 1);

        store.claim("h1", &env.id.as_str()).unwrap();
        let present: Vec<_> = dirs
            .iter()
            .filter(|d| store.scan_directory("h1", d).contains(&env.id.as_str()))
            .collect();
        assert_eq!(present.len(), 1);
    }
}
