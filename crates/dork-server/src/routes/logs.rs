//! `/api/logs` — tails the shared `SQLite` log sink written by
//! [`dork_core::logging::SqliteTransport`].

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use dork_core::logging::{LogEntry, LogLevel, LogQueryOptions, LogStore};
use dork_core::RelayError;
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/logs", get(get_logs))
}

#[derive(Debug, Deserialize, Default)]
struct LogsQuery {
    limit: Option<usize>,
    level: Option<String>,
    component: Option<String>,
    session_id: Option<String>,
    trace_id: Option<String>,
}

async fn get_logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let opts = LogQueryOptions {
        session_id: query.session_id,
        trace_id: query.trace_id,
        min_level: query.level.as_deref().map(|l| LogLevel::from_str_lossy(l).as_num()),
        components: query.component.map(|c| vec![c]),
        order: Some("desc".to_owned()),
        limit: Some(query.limit.unwrap_or(100)),
        ..Default::default()
    };

    let conn = state
        .db_pool
        .get()
        .map_err(|e| RelayError::Filesystem(std::io::Error::other(e.to_string())))?;
    let store = LogStore::new(&conn);
    Ok(Json(store.query(&opts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        router().with_state(state)
    }

    #[tokio::test]
    async fn logs_endpoint_returns_empty_before_any_transport_writes() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder().uri("/api/logs?limit=10").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_level_defaults_to_info_rather_than_erroring() {
        let (_dir, state) = test_state();
        let app = app(state);
        let req = Request::builder().uri("/api/logs?level=not-a-level").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
