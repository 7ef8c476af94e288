//! `/api/relay` — publish, inbox reads, and endpoint registration, paralleling
//! [`dork_relay::RelayCore`]'s in-process `publish`/`readInbox`/
//! `registerEndpoint`/`listEndpoints` contract.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use dork_core::DorkError;
use dork_relay::PublishOptions;
use dork_relay_store::{IndexedMessage, MessageStatus};
use dork_relay_types::{Budget, EndpointInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{bad_request, ApiError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/relay/publish", axum::routing::post(publish))
        .route("/api/relay/inbox", get(read_inbox))
        .route("/api/relay/endpoints", get(list_endpoints).post(register_endpoint))
        .route("/api/relay/endpoints/{subject}", axum::routing::delete(unregister_endpoint))
}

fn parse_status(raw: &str) -> Result<MessageStatus, ApiError> {
    serde_json::from_value(Value::String(raw.to_owned())).map_err(|_| bad_request(format!("unknown message status {raw:?}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest {
    subject: String,
    from: String,
    payload: Value,
    reply_to: Option<String>,
    budget: Option<Budget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: String,
    delivered_to: u32,
}

async fn publish(
    State(state): State<AppState>,
    Json(body): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    if body.subject.is_empty() || body.from.is_empty() {
        return Err(bad_request("subject and from are required"));
    }
    let result = state
        .relay
        .publish(
            &body.subject,
            body.payload,
            PublishOptions { from: body.from, reply_to: body.reply_to, budget: body.budget, ..Default::default() },
        )
        .await?;
    Ok(Json(PublishResponse { message_id: result.message_id, delivered_to: result.delivered_to }))
}

#[derive(Debug, Deserialize, Default)]
struct InboxQuery {
    subject: Option<String>,
    limit: Option<usize>,
    status: Option<String>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboxResponse {
    messages: Vec<IndexedMessage>,
    next_cursor: Option<String>,
}

async fn read_inbox(State(state): State<AppState>, Query(query): Query<InboxQuery>) -> Result<Json<InboxResponse>, ApiError> {
    let Some(subject) = query.subject.filter(|s| !s.is_empty()) else {
        return Err(bad_request("subject is required"));
    };
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let page = state.relay.read_inbox(&subject, query.limit.unwrap_or(50), status, query.cursor)?;
    Ok(Json(InboxResponse { messages: page.messages, next_cursor: page.next_cursor }))
}

#[derive(Debug, Deserialize)]
struct RegisterEndpointRequest {
    subject: String,
}

async fn register_endpoint(
    State(state): State<AppState>,
    Json(body): Json<RegisterEndpointRequest>,
) -> Result<(StatusCode, Json<EndpointInfo>), ApiError> {
    if body.subject.is_empty() {
        return Err(bad_request("subject is required"));
    }
    let info = state.relay.register_endpoint(&body.subject)?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointInfo>> {
    Json(state.relay.list_endpoints())
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn unregister_endpoint(State(state): State<AppState>, Path(subject): Path<String>) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.relay.unregister_endpoint(&subject) {
        return Err(DorkError::not_found("endpoint", subject).into());
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        router().with_state(state)
    }

    #[tokio::test]
    async fn register_then_list_endpoint() {
        let (_dir, state) = test_state();
        let app = app(state);

        let req = Request::builder()
            .method("POST")
            .uri("/api/relay/endpoints")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"subject":"relay.agent.backend"}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = Request::builder().uri("/api/relay/endpoints").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = to_bytes(resp.into_body(), 10_000).await.unwrap();
        let endpoints: Vec<EndpointInfo> = serde_json::from_slice(&body).unwrap();
        assert_eq!(endpoints.len(), 1);
    }

    #[tokio::test]
    async fn publish_then_read_inbox() {
        let (_dir, state) = test_state();
        let app = app(state);

        let req = Request::builder()
            .method("POST")
            .uri("/api/relay/endpoints")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"subject":"relay.agent.backend"}"#))
            .unwrap();
        app.clone().oneshot(req).await.unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/api/relay/publish")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"subject":"relay.agent.backend","from":"relay.agent.frontend","payload":{}}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder().uri("/api/relay/inbox?subject=relay.agent.backend").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = to_bytes(resp.into_body(), 10_000).await.unwrap();
        let inbox: InboxResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(inbox.messages.len(), 1);
    }

    #[tokio::test]
    async fn publish_requires_subject_and_from() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder()
            .method("POST")
            .uri("/api/relay/publish")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"subject":"","from":"","payload":{}}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unregister_unknown_endpoint_is_404() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder().method("DELETE").uri("/api/relay/endpoints/relay.agent.nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
