//! The Mesh: a persistent agent catalogue plus filesystem discovery, behind
//! the operations: `registerAgent`, `listAgents`, `discover`, `denyPath`.

pub mod discovery;
pub mod registry;

pub use discovery::{discover, Candidate, DEFAULT_MAX_DEPTH};
pub use registry::{
    ensure_schema, health_status, AgentBudget, AgentManifest, AgentPatch, AgentRegistry, Behavior,
    DenialRecord, HealthStatus, ListFilter, NewAgent, Runtime,
};

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use dork_core::errors::MeshError;
use dork_core::AgentId;
use dork_db::ConnectionPool;
use futures::Stream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Aggregate counts returned by [`MeshService::get_status`].
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshStatus {
    /// Total registered agents.
    pub total_agents: usize,
    /// Agents seen within the last 5 minutes.
    pub active_count: usize,
    /// Agents seen within the last 30 minutes.
    pub inactive_count: usize,
    /// Agents not seen recently, or never.
    pub stale_count: usize,
    /// Agents explicitly marked unreachable.
    pub unreachable_count: usize,
    /// Agent counts grouped by runtime.
    pub by_runtime: HashMap<String, usize>,
    /// Health status grouped by project path.
    pub by_project: HashMap<String, HealthStatus>,
}

/// Detailed view of a single agent returned by [`MeshService::inspect`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInspection {
    /// The agent's manifest.
    pub manifest: AgentManifest,
    /// Derived health classification.
    pub health: HealthStatus,
    /// Relay subject this agent conventionally listens on.
    pub relay_subject: String,
}

/// Namespace-scoped view returned by [`MeshService::get_topology`].
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Distinct namespaces visible in this view.
    pub namespaces: Vec<String>,
    /// Agents visible in this view.
    pub agents: Vec<AgentManifest>,
    /// Access rules scoping this view; empty until a concrete access-policy
    /// schema is plugged in.
    pub access_rules: Vec<String>,
}

/// Ties the agent registry and discovery walker together behind one handle,
/// sharing the daemon's connection pool.
pub struct MeshService {
    db_pool: ConnectionPool,
}

impl MeshService {
    /// Build a service over `db_pool`, creating the registry schema if
    /// absent.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] if the schema cannot be created.
    pub fn new(db_pool: ConnectionPool) -> Result<Self, MeshError> {
        let conn = db_pool.get().map_err(|e| MeshError::Pool(std::io::Error::other(e.to_string())))?;
        ensure_schema(&conn).map_err(MeshError::Store)?;
        Ok(Self { db_pool })
    }

    fn conn(&self) -> Result<dork_db::PooledConnection, MeshError> {
        self.db_pool
            .get()
            .map_err(|e| MeshError::Pool(std::io::Error::other(e.to_string())))
    }

    /// Register or update an agent manifest.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    #[instrument(skip(self, agent))]
    pub fn register_agent(&self, agent: NewAgent) -> Result<AgentManifest, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).upsert(agent)
    }

    /// List manifests matching `filter`.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn list_agents(&self, filter: &ListFilter) -> Result<Vec<AgentManifest>, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).list(filter)
    }

    /// Fetch a single manifest by id.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn get_agent(&self, id: &AgentId) -> Result<Option<AgentManifest>, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).get(&id.as_str())
    }

    /// Apply a partial update to an existing manifest.
    ///
    /// # Errors
    /// Returns [`MeshError::NotFound`] or [`MeshError::Store`].
    pub fn update_agent(&self, id: &AgentId, patch: AgentPatch) -> Result<AgentManifest, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).update(&id.as_str(), patch)
    }

    /// Record a presence heartbeat.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn record_heartbeat(&self, id: &AgentId, event: &str) -> Result<(), MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).update_health(&id.as_str(), &dork_core::time::now_iso(), event)
    }

    /// Mark an agent unreachable.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn mark_unreachable(&self, id: &AgentId) -> Result<(), MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).mark_unreachable(&id.as_str())
    }

    /// Deny a path from future discovery.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn deny_path(&self, path: &str, reason: Option<&str>, denied_by: &str) -> Result<DenialRecord, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).deny(path, reason, denied_by)
    }

    /// Remove an agent.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn remove_agent(&self, id: &AgentId) -> Result<bool, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).remove(&id.as_str())
    }

    /// Read marker files at `path`, merge with `overrides`, and upsert the
    /// result into the registry.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn register_by_path(
        &self,
        path: &str,
        overrides: AgentPatch,
        approver: Option<&str>,
    ) -> Result<AgentManifest, MeshError> {
        let dir = PathBuf::from(path);
        let hints = discovery::markers_in(&dir);
        let detected_runtime = discovery::detect_runtime(&hints);
        let suggested_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());

        let agent = NewAgent {
            id: AgentId::new(),
            name: overrides.name.unwrap_or(suggested_name),
            description: overrides.description,
            runtime: detected_runtime,
            capabilities: overrides.capabilities.unwrap_or_default(),
            project_path: path.to_owned(),
            namespace: overrides.namespace,
            behavior: overrides.behavior.unwrap_or(Behavior::Always),
            budget: overrides.budget.unwrap_or_default(),
            scan_root: overrides.scan_root,
            registered_by: approver.unwrap_or("discovery").to_owned(),
        };
        let conn = self.conn()?;
        AgentRegistry::new(&conn).upsert(agent)
    }

    /// Every denial record, newest first.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn list_denied(&self) -> Result<Vec<DenialRecord>, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).list_denied()
    }

    /// Remove a denial record by path.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn remove_denial(&self, path: &str) -> Result<bool, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).remove_denial(path)
    }

    /// Aggregate health counts across every registered agent.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn get_status(&self) -> Result<MeshStatus, MeshError> {
        let agents = self.list_agents(&ListFilter::default())?;
        let now = Utc::now();
        let mut status = MeshStatus {
            total_agents: agents.len(),
            ..MeshStatus::default()
        };
        for agent in &agents {
            let health = health_status(agent.last_seen_at.as_deref(), agent.unreachable, now);
            match health {
                HealthStatus::Active => status.active_count += 1,
                HealthStatus::Inactive => status.inactive_count += 1,
                HealthStatus::Stale => status.stale_count += 1,
                HealthStatus::Unreachable => status.unreachable_count += 1,
            }
            *status.by_runtime.entry(agent.runtime.as_str().to_owned()).or_insert(0) += 1;
            status.by_project.insert(agent.project_path.clone(), health);
        }
        Ok(status)
    }

    /// Manifest, derived health, and conventional relay subject for one
    /// agent.
    ///
    /// # Errors
    /// Returns [`MeshError::NotFound`] if no such agent exists, or
    /// [`MeshError::Store`] on SQLite failure.
    pub fn inspect(&self, id: &AgentId) -> Result<AgentInspection, MeshError> {
        let manifest = self
            .get_agent(id)?
            .ok_or_else(|| MeshError::NotFound { id: id.as_str().to_owned() })?;
        let health = health_status(manifest.last_seen_at.as_deref(), manifest.unreachable, Utc::now());
        let namespace = manifest.namespace.clone().unwrap_or_else(|| "default".to_owned());
        let relay_subject = format!("relay.agent.{namespace}.{}", manifest.id.as_str());
        Ok(AgentInspection { manifest, health, relay_subject })
    }

    /// Namespace-scoped topology view. `namespace == "*"` returns every
    /// agent across every namespace (the admin view).
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn get_topology(&self, namespace: &str) -> Result<Topology, MeshError> {
        let filter = if namespace == "*" {
            ListFilter::default()
        } else {
            ListFilter { namespace: Some(namespace.to_owned()), ..ListFilter::default() }
        };
        let agents = self.list_agents(&filter)?;
        let mut namespaces: Vec<String> = agents.iter().filter_map(|a| a.namespace.clone()).collect();
        namespaces.sort();
        namespaces.dedup();
        Ok(Topology { namespaces, agents, access_rules: Vec::new() })
    }

    /// Walk `roots` for agent-bearing projects, excluding any path already
    /// denied.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] if the denial list cannot be read.
    pub fn discover(
        &self,
        roots: Vec<PathBuf>,
        max_depth: u32,
        token: CancellationToken,
    ) -> Result<impl Stream<Item = Candidate>, MeshError> {
        let denied: HashSet<String> = {
            let conn = self.conn()?;
            AgentRegistry::new(&conn).denied_paths()?
        };
        Ok(discover(roots, max_depth, denied, token))
    }

    /// Every manifest unreachable since before `iso`, for garbage
    /// collection.
    ///
    /// # Errors
    /// Returns [`MeshError::Store`] on SQLite failure.
    pub fn list_unreachable_before(&self, iso: &str) -> Result<Vec<AgentManifest>, MeshError> {
        let conn = self.conn()?;
        AgentRegistry::new(&conn).list_unreachable_before(iso)
    }
}
