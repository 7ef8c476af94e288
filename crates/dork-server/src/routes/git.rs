//! `/api/git/status` — a read-only repository status check used by the UI
//! to badge project directories, implemented with `gix` rather than
//! shelling out to the `git` binary.

use axum::extract::{Query, State};
use axum::{Json, Router};
use dork_core::validate_boundary;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/git/status", axum::routing::get(get_status))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    dir: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitStatus {
    branch: Option<String>,
    detached: bool,
    dirty: bool,
    ahead: Option<usize>,
    behind: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum StatusResponse {
    Status(GitStatus),
    NotRepo { error: &'static str },
}

async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let dir = validate_boundary(&query.dir, &state.boundary_root)?;

    let Ok(repo) = gix::open(dir) else {
        return Ok(Json(StatusResponse::NotRepo { error: "not_git_repo" }));
    };

    let head = repo.head().map_err(|e| ApiError(dork_core::DorkError::validation(e.to_string())))?;
    let (branch, detached) = match head.referent_name() {
        Some(name) => (Some(name.shorten().to_string()), false),
        None => (None, true),
    };

    let dirty = repo
        .is_dirty()
        .map_err(|e| ApiError(dork_core::DorkError::validation(e.to_string())))?;

    Ok(Json(StatusResponse::Status(GitStatus { branch, detached, dirty, ahead: None, behind: None })))
}
