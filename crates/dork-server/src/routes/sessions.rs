//! `/api/sessions` — creation, listing, message dispatch (SSE), and the
//! approve/deny/submit-answers gates a dispatched turn may park on.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dork_core::{SessionError, SessionId};
use dork_session::{PermissionMode, SessionSummary};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{bad_request, ApiError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/messages", post(send_message))
        .route("/api/sessions/{id}/approve", post(approve_tool))
        .route("/api/sessions/{id}/deny", post(deny_tool))
        .route("/api/sessions/{id}/submit-answers", post(submit_answers))
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::from_str(raw).map_err(|_| bad_request(format!("invalid session id {raw:?}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    permission_mode: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(axum::http::StatusCode, Json<SessionSummary>), ApiError> {
    let mode = body
        .permission_mode
        .as_deref()
        .map(PermissionMode::from_str_lossy)
        .unwrap_or_default();
    let id = state.sessions.create_session(mode);
    let summary = state.sessions.get_session(&id)?;
    Ok((axum::http::StatusCode::CREATED, Json(summary)))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.sessions.list_sessions())
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SessionSummary>, ApiError> {
    let id = parse_session_id(&id)?;
    Ok(Json(state.sessions.get_session(&id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    content: String,
    cwd: Option<String>,
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_session_id(&id)?;
    let cancellation = state.shutdown.token().child_token();
    let stream = state.sessions.send_message(id, body.content, body.cwd, cancellation);
    let sse_stream = futures::StreamExt::map(stream, |event| {
        Ok(Event::default().json_data(&event).unwrap_or_else(|_| Event::default().data("{}")))
    });
    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveRequest {
    tool_call_id: String,
    approved: bool,
    edited_input: Option<Value>,
    denial_reason: Option<String>,
}

async fn approve_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .approve_tool(&id, &body.tool_call_id, body.approved, body.edited_input, body.denial_reason)
        .map_err(|e: SessionError| ApiError::from(e))?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DenyRequest {
    tool_call_id: String,
    reason: Option<String>,
}

async fn deny_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DenyRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .approve_tool(&id, &body.tool_call_id, false, None, body.reason)
        .map_err(|e: SessionError| ApiError::from(e))?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswersRequest {
    tool_call_id: String,
    answers: BTreeMap<String, String>,
}

async fn submit_answers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SubmitAnswersRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .submit_answers(&id, &body.tool_call_id, body.answers)
        .map_err(|e: SessionError| ApiError::from(e))?;
    Ok(Json(OkResponse { ok: true }))
}

impl IntoResponse for OkResponse {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}
