//! `/api/mesh` — agent registry CRUD, filesystem discovery, and the
//! deny-list that keeps discovery from re-surfacing rejected paths.

use std::path::PathBuf;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dork_core::{AgentId, DorkError};
use dork_mesh::{AgentBudget, AgentManifest, AgentPatch, Behavior, Candidate, DenialRecord, ListFilter, NewAgent, Runtime};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{bad_request, ApiError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/mesh/discover", post(discover))
        .route("/api/mesh/agents", post(create_agent).get(list_agents))
        .route("/api/mesh/agents/{id}", get(get_agent).patch(patch_agent).delete(delete_agent))
        .route("/api/mesh/deny", post(deny_path))
        .route("/api/mesh/denied", get(list_denied))
        .route("/api/mesh/denied/{path}", axum::routing::delete(remove_denial))
}

fn parse_agent_id(raw: &str) -> Result<AgentId, ApiError> {
    AgentId::from_str(raw).map_err(|_| bad_request(format!("invalid agent id {raw:?}")))
}

fn parse_runtime(raw: &str) -> Result<Runtime, ApiError> {
    serde_json::from_value(Value::String(raw.to_owned())).map_err(|_| bad_request(format!("unknown runtime {raw:?}")))
}

fn parse_behavior(raw: &str) -> Result<Behavior, ApiError> {
    serde_json::from_value(Value::String(raw.to_owned())).map_err(|_| bad_request(format!("unknown behavior {raw:?}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoverRequest {
    roots: Vec<String>,
    max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
struct DiscoverResponse {
    candidates: Vec<Candidate>,
}

async fn discover(
    State(state): State<AppState>,
    Json(body): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    if body.roots.is_empty() {
        return Err(bad_request("roots is required"));
    }
    let roots: Vec<PathBuf> = body.roots.into_iter().map(PathBuf::from).collect();
    let max_depth = body.max_depth.unwrap_or(dork_mesh::DEFAULT_MAX_DEPTH);
    let token = state.shutdown.token().child_token();
    let stream = state.mesh.discover(roots, max_depth, token)?;
    tokio::pin!(stream);
    let candidates = stream.collect::<Vec<_>>().await;
    Ok(Json(DiscoverResponse { candidates }))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BudgetBody {
    max_hops_per_message: u32,
    max_calls_per_hour: u32,
}

impl From<BudgetBody> for AgentBudget {
    fn from(b: BudgetBody) -> Self {
        Self { max_hops_per_message: b.max_hops_per_message, max_calls_per_hour: b.max_calls_per_hour }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AgentOverrides {
    name: Option<String>,
    runtime: Option<String>,
    description: Option<String>,
    capabilities: Option<Vec<String>>,
    namespace: Option<String>,
    behavior: Option<String>,
    budget: Option<BudgetBody>,
    scan_root: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAgentRequest {
    path: String,
    #[serde(default)]
    overrides: AgentOverrides,
    approver: Option<String>,
}

async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<AgentManifest>), ApiError> {
    let (Some(name), Some(runtime_raw)) = (body.overrides.name.clone(), body.overrides.runtime.clone()) else {
        return Err(bad_request("overrides.name and overrides.runtime are required"));
    };
    let runtime = parse_runtime(&runtime_raw)?;
    let behavior = match &body.overrides.behavior {
        Some(raw) => parse_behavior(raw)?,
        None => Behavior::Always,
    };

    if state.mesh.list_denied()?.iter().any(|d| d.file_path == body.path) {
        return Err(DorkError::conflict(format!("{} has been denied from registration", body.path)).into());
    }

    let agent = NewAgent {
        id: AgentId::new(),
        name,
        description: body.overrides.description,
        runtime,
        capabilities: body.overrides.capabilities.unwrap_or_default(),
        project_path: body.path,
        namespace: body.overrides.namespace,
        behavior,
        budget: body.overrides.budget.map(AgentBudget::from).unwrap_or_default(),
        scan_root: body.overrides.scan_root,
        registered_by: body.approver.unwrap_or_else(|| "api".to_owned()),
    };
    let manifest = state.mesh.register_agent(agent)?;
    Ok((StatusCode::CREATED, Json(manifest)))
}

#[derive(Debug, Deserialize, Default)]
struct ListAgentsQuery {
    runtime: Option<String>,
    capability: Option<String>,
    namespace: Option<String>,
}

async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<Json<Vec<AgentManifest>>, ApiError> {
    let runtime = query.runtime.as_deref().map(parse_runtime).transpose()?;
    let filter = ListFilter { runtime, capability: query.capability, namespace: query.namespace };
    Ok(Json(state.mesh.list_agents(&filter)?))
}

async fn get_agent(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<AgentManifest>, ApiError> {
    let id = parse_agent_id(&id)?;
    let manifest = state.mesh.get_agent(&id)?.ok_or_else(|| DorkError::not_found("agent", id.as_str()))?;
    Ok(Json(manifest))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PatchAgentRequest {
    name: Option<String>,
    description: Option<String>,
    capabilities: Option<Vec<String>>,
    behavior: Option<String>,
    budget: Option<BudgetBody>,
    namespace: Option<String>,
    scan_root: Option<String>,
}

async fn patch_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchAgentRequest>,
) -> Result<Json<AgentManifest>, ApiError> {
    let id = parse_agent_id(&id)?;
    let behavior = body.behavior.as_deref().map(parse_behavior).transpose()?;
    let patch = AgentPatch {
        name: body.name,
        description: body.description,
        capabilities: body.capabilities,
        behavior,
        budget: body.budget.map(AgentBudget::from),
        namespace: body.namespace,
        scan_root: body.scan_root,
    };
    Ok(Json(state.mesh.update_agent(&id, patch)?))
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_agent_id(&id)?;
    if !state.mesh.remove_agent(&id)? {
        return Err(DorkError::not_found("agent", id.as_str()).into());
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DenyRequest {
    path: String,
    reason: Option<String>,
    denier: Option<String>,
}

async fn deny_path(
    State(state): State<AppState>,
    Json(body): Json<DenyRequest>,
) -> Result<(StatusCode, Json<DenialRecord>), ApiError> {
    if body.path.is_empty() {
        return Err(bad_request("path is required"));
    }

    let active_agent = state
        .mesh
        .list_agents(&ListFilter::default())?
        .into_iter()
        .find(|a| a.project_path == body.path && !a.unreachable);
    if active_agent.is_some() {
        return Err(DorkError::conflict(format!("{} has a registered agent; remove it before denying", body.path)).into());
    }

    let denier = body.denier.unwrap_or_else(|| "api".to_owned());
    let record = state.mesh.deny_path(&body.path, body.reason.as_deref(), &denier)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_denied(State(state): State<AppState>) -> Result<Json<Vec<DenialRecord>>, ApiError> {
    Ok(Json(state.mesh.list_denied()?))
}

async fn remove_denial(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.mesh.remove_denial(&path)? {
        return Err(DorkError::not_found("denial", path).into());
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        router().with_state(state)
    }

    #[tokio::test]
    async fn create_agent_requires_name_and_runtime() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder()
            .method("POST")
            .uri("/api/mesh/agents")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"path":"/projects/a","overrides":{}}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["error"]["message"]
            .as_str()
            .unwrap()
            .contains("overrides.name and overrides.runtime are required"));
    }

    #[tokio::test]
    async fn create_then_get_agent_round_trips() {
        let (_dir, state) = test_state();
        let app = app(state);

        let req = Request::builder()
            .method("POST")
            .uri("/api/mesh/agents")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"path":"/projects/a","overrides":{"name":"backend","runtime":"claude-code"}}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = to_bytes(resp.into_body(), 10_000).await.unwrap();
        let manifest: AgentManifest = serde_json::from_slice(&body).unwrap();
        assert_eq!(manifest.name, "backend");

        let req = Request::builder().uri(format!("/api/mesh/agents/{}", manifest.id)).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_unknown_agent_returns_404() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder().uri(format!("/api/mesh/agents/{}", dork_core::AgentId::new())).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_runtime_query_is_bad_request() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder().uri("/api/mesh/agents?runtime=not-a-runtime").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deny_then_list_then_remove() {
        let (_dir, state) = test_state();
        let app = app(state);

        let req = Request::builder()
            .method("POST")
            .uri("/api/mesh/deny")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"path":"/projects/blocked","reason":"noisy"}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = Request::builder().uri("/api/mesh/denied").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let body = to_bytes(resp.into_body(), 10_000).await.unwrap();
        let denied: Vec<DenialRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(denied.len(), 1);

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/mesh/denied/%2Fprojects%2Fblocked")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn discover_requires_nonempty_roots() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder()
            .method("POST")
            .uri("/api/mesh/discover")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"roots":[]}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
