//! Persistent agent catalogue: manifests, health classification, and the
//! denial list used to keep discovery from re-surfacing refused paths.

use chrono::{DateTime, Utc};
use dork_core::{errors::MeshError, AgentId, DenialId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// The external agent runtime a manifest describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Runtime {
    /// Claude Code.
    ClaudeCode,
    /// Cursor.
    Cursor,
    /// Codex.
    Codex,
    /// Any other recognized runtime.
    Other,
}

impl Runtime {
    /// Lowercase, kebab-case wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Cursor => "cursor",
            Self::Codex => "codex",
            Self::Other => "other",
        }
    }

    fn from_str_lossy(s: &str) -> Self {
        match s {
            "claude-code" => Self::ClaudeCode,
            "cursor" => Self::Cursor,
            "codex" => Self::Codex,
            _ => Self::Other,
        }
    }
}

/// When an agent responds to mentions in shared channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Always participates.
    Always,
    /// Only participates when explicitly mentioned.
    OnMention,
}

impl Behavior {
    fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OnMention => "on_mention",
        }
    }

    fn from_str_lossy(s: &str) -> Self {
        if s == "always" {
            Self::Always
        } else {
            Self::OnMention
        }
    }
}

/// Per-agent budget defaults applied to envelopes it mints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentBudget {
    /// Maximum hops any message originating from this agent may travel.
    pub max_hops_per_message: u32,
    /// Rate limit on adapter/handler calls per rolling hour.
    pub max_calls_per_hour: u32,
}

impl Default for AgentBudget {
    fn default() -> Self {
        Self {
            max_hops_per_message: 16,
            max_calls_per_hour: 240,
        }
    }
}

/// Derived (never persisted) presence classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Seen within the last 5 minutes.
    Active,
    /// Seen within the last 30 minutes.
    Inactive,
    /// Not seen recently, or never.
    Stale,
    /// Explicitly marked unreachable via [`AgentRegistry::mark_unreachable`].
    Unreachable,
}

/// Compute [`HealthStatus`] from a `lastSeenAt` timestamp and the
/// unreachable flag, relative to `now`.
#[must_use]
pub fn health_status(last_seen_at: Option<&str>, unreachable: bool, now: DateTime<Utc>) -> HealthStatus {
    if unreachable {
        return HealthStatus::Unreachable;
    }
    let Some(last_seen_at) = last_seen_at else {
        return HealthStatus::Stale;
    };
    let Ok(last_seen) = DateTime::parse_from_rfc3339(last_seen_at) else {
        return HealthStatus::Stale;
    };
    let elapsed = now.signed_duration_since(last_seen.with_timezone(&Utc));
    if elapsed <= chrono::Duration::minutes(5) {
        HealthStatus::Active
    } else if elapsed <= chrono::Duration::minutes(30) {
        HealthStatus::Inactive
    } else {
        HealthStatus::Stale
    }
}

/// A registered agent's full manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentManifest {
    /// Stable identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// The runtime driving this agent.
    pub runtime: Runtime,
    /// Declared capabilities (free-form tags).
    pub capabilities: Vec<String>,
    /// Unique filesystem path this agent's project lives at.
    pub project_path: String,
    /// Optional namespace grouping for multi-tenant topologies.
    pub namespace: Option<String>,
    /// Participation behavior.
    pub behavior: Behavior,
    /// Per-agent delivery budget defaults.
    pub budget: AgentBudget,
    /// Root directory this agent was discovered under, if any.
    pub scan_root: Option<String>,
    /// ISO-8601 registration timestamp.
    pub registered_at: String,
    /// Who or what registered this agent (`"discovery"`, a user id, etc).
    pub registered_by: String,
    /// Last observed presence timestamp.
    pub last_seen_at: Option<String>,
    /// The event associated with the last presence update.
    pub last_seen_event: Option<String>,
    /// Whether [`AgentRegistry::mark_unreachable`] has been called.
    pub unreachable: bool,
}

/// Mutable-field patch for [`AgentRegistry::update`].
#[derive(Clone, Debug, Default)]
pub struct AgentPatch {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New capability list.
    pub capabilities: Option<Vec<String>>,
    /// New participation behavior.
    pub behavior: Option<Behavior>,
    /// New budget.
    pub budget: Option<AgentBudget>,
    /// New namespace.
    pub namespace: Option<String>,
    /// New scan root.
    pub scan_root: Option<String>,
}

/// Filter for [`AgentRegistry::list`].
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    /// Restrict to one runtime.
    pub runtime: Option<Runtime>,
    /// Restrict to manifests declaring this capability.
    pub capability: Option<String>,
    /// Restrict to one namespace.
    pub namespace: Option<String>,
}

/// A denial record excluding a path from future discovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DenialRecord {
    /// Stable identifier.
    pub id: DenialId,
    /// The denied filesystem path.
    pub file_path: String,
    /// Why it was denied.
    pub reason: Option<String>,
    /// ISO-8601 denial timestamp.
    pub denied_at: String,
    /// Who denied it.
    pub denied_by: String,
}

/// Create the `agents` and `agent_denials` tables if absent.
///
/// # Errors
/// Propagates the underlying `rusqlite` error.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            runtime TEXT NOT NULL,
            capabilities TEXT NOT NULL,
            project_path TEXT NOT NULL UNIQUE,
            namespace TEXT,
            behavior TEXT NOT NULL,
            max_hops_per_message INTEGER NOT NULL,
            max_calls_per_hour INTEGER NOT NULL,
            scan_root TEXT,
            registered_at TEXT NOT NULL,
            registered_by TEXT NOT NULL,
            last_seen_at TEXT,
            last_seen_event TEXT,
            unreachable INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_agents_namespace ON agents(namespace);
        CREATE TABLE IF NOT EXISTS agent_denials (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL UNIQUE,
            reason TEXT,
            denied_at TEXT NOT NULL,
            denied_by TEXT NOT NULL
        );",
    )
}

/// Input to [`AgentRegistry::upsert`].
#[derive(Clone, Debug)]
pub struct NewAgent {
    /// Stable identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// The runtime driving this agent.
    pub runtime: Runtime,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Unique filesystem path.
    pub project_path: String,
    /// Optional namespace.
    pub namespace: Option<String>,
    /// Participation behavior.
    pub behavior: Behavior,
    /// Per-agent budget.
    pub budget: AgentBudget,
    /// Discovery root, if discovered rather than hand-registered.
    pub scan_root: Option<String>,
    /// Who registered this agent.
    pub registered_by: String,
}

/// SQLite-backed agent catalogue.
pub struct AgentRegistry<'a> {
    conn: &'a Connection,
}

impl<'a> AgentRegistry<'a> {
    /// Wrap a connection that already has the `agents`/`agent_denials`
    /// tables (see [`ensure_schema`]).
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace by id. A registration at an existing
    /// `project_path` under a *different* id deletes the prior row first
    /// (stale-capture semantics): the old id becomes unreachable.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn upsert(&self, agent: NewAgent) -> Result<AgentManifest, MeshError> {
        if let Some(existing) = self
            .conn
            .query_row(
                "SELECT id FROM agents WHERE project_path = ?1",
                params![agent.project_path],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(MeshError::Store)?
        {
            if existing != agent.id.as_str() {
                self.conn
                    .execute("DELETE FROM agents WHERE id = ?1", params![existing])
                    .map_err(MeshError::Store)?;
            }
        }

        let now = dork_core::time::now_iso();
        let capabilities = serde_json::to_string(&agent.capabilities).unwrap_or_else(|_| "[]".to_owned());

        self.conn
            .execute(
                "INSERT INTO agents
                    (id, name, description, runtime, capabilities, project_path, namespace, behavior,
                     max_hops_per_message, max_calls_per_hour, scan_root, registered_at, registered_by,
                     last_seen_at, last_seen_event, unreachable)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, 0)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    runtime = excluded.runtime,
                    capabilities = excluded.capabilities,
                    project_path = excluded.project_path,
                    namespace = excluded.namespace,
                    behavior = excluded.behavior,
                    max_hops_per_message = excluded.max_hops_per_message,
                    max_calls_per_hour = excluded.max_calls_per_hour,
                    scan_root = excluded.scan_root",
                params![
                    agent.id.as_str(),
                    agent.name,
                    agent.description,
                    agent.runtime.as_str(),
                    capabilities,
                    agent.project_path,
                    agent.namespace,
                    agent.behavior.as_str(),
                    agent.budget.max_hops_per_message,
                    agent.budget.max_calls_per_hour,
                    agent.scan_root,
                    now,
                    agent.registered_by,
                ],
            )
            .map_err(MeshError::Store)?;

        self.get(&agent.id.as_str())?
            .ok_or_else(|| MeshError::Store(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Fetch by id.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn get(&self, id: &str) -> Result<Option<AgentManifest>, MeshError> {
        self.conn
            .query_row(
                "SELECT id, name, description, runtime, capabilities, project_path, namespace, behavior,
                        max_hops_per_message, max_calls_per_hour, scan_root, registered_at, registered_by,
                        last_seen_at, last_seen_event, unreachable
                 FROM agents WHERE id = ?1",
                params![id],
                row_to_manifest,
            )
            .optional()
            .map_err(MeshError::Store)
    }

    /// Fetch by unique project path.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn get_by_path(&self, path: &str) -> Result<Option<AgentManifest>, MeshError> {
        self.conn
            .query_row(
                "SELECT id, name, description, runtime, capabilities, project_path, namespace, behavior,
                        max_hops_per_message, max_calls_per_hour, scan_root, registered_at, registered_by,
                        last_seen_at, last_seen_event, unreachable
                 FROM agents WHERE project_path = ?1",
                params![path],
                row_to_manifest,
            )
            .optional()
            .map_err(MeshError::Store)
    }

    /// List every manifest matching `filter`.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<AgentManifest>, MeshError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, description, runtime, capabilities, project_path, namespace, behavior,
                        max_hops_per_message, max_calls_per_hour, scan_root, registered_at, registered_by,
                        last_seen_at, last_seen_event, unreachable
                 FROM agents ORDER BY registered_at ASC",
            )
            .map_err(MeshError::Store)?;
        let rows = stmt
            .query_map([], row_to_manifest)
            .map_err(MeshError::Store)?;
        let mut out = Vec::new();
        for row in rows {
            let manifest = row.map_err(MeshError::Store)?;
            if let Some(runtime) = filter.runtime {
                if manifest.runtime != runtime {
                    continue;
                }
            }
            if let Some(capability) = &filter.capability {
                if !manifest.capabilities.iter().any(|c| c == capability) {
                    continue;
                }
            }
            if let Some(namespace) = &filter.namespace {
                if manifest.namespace.as_deref() != Some(namespace.as_str()) {
                    continue;
                }
            }
            out.push(manifest);
        }
        Ok(out)
    }

    /// Apply a partial update to the mutable fields of an existing
    /// manifest.
    ///
    /// # Errors
    /// Returns [`MeshError::NotFound`] if no such agent exists, or
    /// [`MeshError::Store`] on SQLite failure.
    pub fn update(&self, id: &str, patch: AgentPatch) -> Result<AgentManifest, MeshError> {
        let current = self
            .get(id)?
            .ok_or_else(|| MeshError::NotFound { id: id.to_owned() })?;

        let name = patch.name.unwrap_or(current.name);
        let description = patch.description.or(current.description);
        let capabilities = patch.capabilities.unwrap_or(current.capabilities);
        let behavior = patch.behavior.unwrap_or(current.behavior);
        let budget = patch.budget.unwrap_or(current.budget);
        let namespace = patch.namespace.or(current.namespace);
        let scan_root = patch.scan_root.or(current.scan_root);

        self.conn
            .execute(
                "UPDATE agents SET name = ?1, description = ?2, capabilities = ?3, behavior = ?4,
                    max_hops_per_message = ?5, max_calls_per_hour = ?6, namespace = ?7, scan_root = ?8
                 WHERE id = ?9",
                params![
                    name,
                    description,
                    serde_json::to_string(&capabilities).unwrap_or_else(|_| "[]".to_owned()),
                    behavior.as_str(),
                    budget.max_hops_per_message,
                    budget.max_calls_per_hour,
                    namespace,
                    scan_root,
                    id,
                ],
            )
            .map_err(MeshError::Store)?;

        self.get(id)?.ok_or_else(|| MeshError::NotFound { id: id.to_owned() })
    }

    /// Record a presence update.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn update_health(&self, id: &str, last_seen_at: &str, event: &str) -> Result<(), MeshError> {
        self.conn
            .execute(
                "UPDATE agents SET last_seen_at = ?1, last_seen_event = ?2, unreachable = 0 WHERE id = ?3",
                params![last_seen_at, event, id],
            )
            .map_err(MeshError::Store)?;
        Ok(())
    }

    /// Explicitly mark an agent unreachable, overriding time-based health
    /// classification until the next `update_health` call.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn mark_unreachable(&self, id: &str) -> Result<(), MeshError> {
        self.conn
            .execute("UPDATE agents SET unreachable = 1 WHERE id = ?1", params![id])
            .map_err(MeshError::Store)?;
        Ok(())
    }

    /// Every manifest whose `lastSeenAt` predates `iso` (or is absent),
    /// supporting garbage collection of long-unreachable agents.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn list_unreachable_before(&self, iso: &str) -> Result<Vec<AgentManifest>, MeshError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, description, runtime, capabilities, project_path, namespace, behavior,
                        max_hops_per_message, max_calls_per_hour, scan_root, registered_at, registered_by,
                        last_seen_at, last_seen_event, unreachable
                 FROM agents WHERE last_seen_at IS NULL OR last_seen_at < ?1",
            )
            .map_err(MeshError::Store)?;
        let rows = stmt.query_map(params![iso], row_to_manifest).map_err(MeshError::Store)?;
        rows.collect::<rusqlite::Result<_>>().map_err(MeshError::Store)
    }

    /// Remove an agent's manifest entirely.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn remove(&self, id: &str) -> Result<bool, MeshError> {
        let changed = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?1", params![id])
            .map_err(MeshError::Store)?;
        Ok(changed > 0)
    }

    /// Insert a denial record for `path`.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn deny(&self, path: &str, reason: Option<&str>, denied_by: &str) -> Result<DenialRecord, MeshError> {
        let id = DenialId::new();
        let denied_at = dork_core::time::now_iso();
        self.conn
            .execute(
                "INSERT INTO agent_denials (id, file_path, reason, denied_at, denied_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(file_path) DO UPDATE SET reason = excluded.reason, denied_at = excluded.denied_at, denied_by = excluded.denied_by",
                params![id.as_str(), path, reason, denied_at, denied_by],
            )
            .map_err(MeshError::Store)?;
        Ok(DenialRecord {
            id,
            file_path: path.to_owned(),
            reason: reason.map(str::to_owned),
            denied_at,
            denied_by: denied_by.to_owned(),
        })
    }

    /// Every denied path.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn denied_paths(&self) -> Result<std::collections::HashSet<String>, MeshError> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_path FROM agent_denials")
            .map_err(MeshError::Store)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(MeshError::Store)?;
        rows.collect::<rusqlite::Result<_>>().map_err(MeshError::Store)
    }

    /// Every denial record, newest first.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn list_denied(&self) -> Result<Vec<DenialRecord>, MeshError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, file_path, reason, denied_at, denied_by FROM agent_denials ORDER BY denied_at DESC")
            .map_err(MeshError::Store)?;
        let rows = stmt.query_map([], row_to_denial).map_err(MeshError::Store)?;
        rows.collect::<rusqlite::Result<_>>().map_err(MeshError::Store)
    }

    /// Remove a denial record by path, re-admitting it to future discovery.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn remove_denial(&self, path: &str) -> Result<bool, MeshError> {
        let changed = self
            .conn
            .execute("DELETE FROM agent_denials WHERE file_path = ?1", params![path])
            .map_err(MeshError::Store)?;
        Ok(changed > 0)
    }
}

fn row_to_denial(row: &rusqlite::Row<'_>) -> rusqlite::Result<DenialRecord> {
    let id: String = row.get(0)?;
    Ok(DenialRecord {
        id: id.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "bad denial id".into())
        })?,
        file_path: row.get(1)?,
        reason: row.get(2)?,
        denied_at: row.get(3)?,
        denied_by: row.get(4)?,
    })
}

fn row_to_manifest(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentManifest> {
    let id: String = row.get(0)?;
    let runtime: String = row.get(3)?;
    let capabilities: String = row.get(4)?;
    let behavior: String = row.get(7)?;
    let unreachable: i64 = row.get(15)?;

    Ok(AgentManifest {
        id: id.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "bad agent id".into())
        })?,
        name: row.get(1)?,
        description: row.get(2)?,
        runtime: Runtime::from_str_lossy(&runtime),
        capabilities: serde_json::from_str(&capabilities).unwrap_or_default(),
        project_path: row.get(5)?,
        namespace: row.get(6)?,
        behavior: Behavior::from_str_lossy(&behavior),
        budget: AgentBudget {
            max_hops_per_message: row.get(8)?,
            max_calls_per_hour: row.get(9)?,
        },
        scan_root: row.get(10)?,
        registered_at: row.get(11)?,
        registered_by: row.get(12)?,
        last_seen_at: row.get(13)?,
        last_seen_event: row.get(14)?,
        unreachable: unreachable != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn sample(path: &str) -> NewAgent {
        NewAgent {
            id: AgentId::new(),
            name: "backend".into(),
            description: None,
            runtime: Runtime::ClaudeCode,
            capabilities: vec!["code".into()],
            project_path: path.to_owned(),
            namespace: None,
            behavior: Behavior::Always,
            budget: AgentBudget::default(),
            scan_root: None,
            registered_by: "discovery".into(),
        }
    }

    #[test]
    fn upsert_and_get() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        let manifest = registry.upsert(sample("/projects/backend")).unwrap();
        let got = registry.get(&manifest.id.as_str()).unwrap().unwrap();
        assert_eq!(got.project_path, "/projects/backend");
    }

    #[test]
    fn reregistration_at_same_path_replaces_prior_id() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        let first = registry.upsert(sample("/projects/backend")).unwrap();

        let mut second = sample("/projects/backend");
        second.id = AgentId::new();
        let second_manifest = registry.upsert(second).unwrap();

        assert!(registry.get(&first.id.as_str()).unwrap().is_none());
        assert!(registry.get(&second_manifest.id.as_str()).unwrap().is_some());
    }

    #[test]
    fn update_mutates_only_allowed_fields() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        let manifest = registry.upsert(sample("/projects/backend")).unwrap();

        let updated = registry
            .update(
                &manifest.id.as_str(),
                AgentPatch {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.project_path, "/projects/backend");
    }

    #[test]
    fn list_filters_by_capability() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        registry.upsert(sample("/projects/a")).unwrap();
        let mut other = sample("/projects/b");
        other.capabilities = vec!["docs".into()];
        registry.upsert(other).unwrap();

        let filtered = registry
            .list(&ListFilter {
                capability: Some("code".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn health_status_classifies_by_recency() {
        let now = Utc::now();
        let active = now - chrono::Duration::minutes(1);
        let inactive = now - chrono::Duration::minutes(15);
        let stale = now - chrono::Duration::hours(2);

        assert_eq!(health_status(Some(&active.to_rfc3339()), false, now), HealthStatus::Active);
        assert_eq!(health_status(Some(&inactive.to_rfc3339()), false, now), HealthStatus::Inactive);
        assert_eq!(health_status(Some(&stale.to_rfc3339()), false, now), HealthStatus::Stale);
        assert_eq!(health_status(None, false, now), HealthStatus::Stale);
        assert_eq!(health_status(Some(&active.to_rfc3339()), true, now), HealthStatus::Unreachable);
    }

    #[test]
    fn deny_and_list_denied_paths() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        registry.deny("/projects/blocked", Some("noisy"), "user1").unwrap();
        let denied = registry.denied_paths().unwrap();
        assert!(denied.contains("/projects/blocked"));
    }

    #[test]
    fn mark_unreachable_overrides_health() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        let manifest = registry.upsert(sample("/projects/backend")).unwrap();
        registry
            .update_health(&manifest.id.as_str(), &dork_core::time::now_iso(), "heartbeat")
            .unwrap();
        registry.mark_unreachable(&manifest.id.as_str()).unwrap();

        let got = registry.get(&manifest.id.as_str()).unwrap().unwrap();
        assert!(got.unreachable);
    }

    #[test]
    fn list_denied_and_remove_denial() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        registry.deny("/projects/blocked", Some("noisy"), "user1").unwrap();
        let denied = registry.list_denied().unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].file_path, "/projects/blocked");

        assert!(registry.remove_denial("/projects/blocked").unwrap());
        assert!(registry.list_denied().unwrap().is_empty());
        assert!(!registry.remove_denial("/projects/blocked").unwrap());
    }

    #[test]
    fn remove_deletes_manifest() {
        let conn = test_conn();
        let registry = AgentRegistry::new(&conn);
        let manifest = registry.upsert(sample("/projects/backend")).unwrap();
        assert!(registry.remove(&manifest.id.as_str()).unwrap());
        assert!(registry.get(&manifest.id.as_str()).unwrap().is_none());
    }
}
