//! Maps the daemon's typed error hierarchy onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use dork_core::errors::rpc::to_rpc_error_body;
use dork_core::DorkError;

/// Wraps a [`DorkError`] so handlers can return it directly via `?`.
pub struct ApiError(pub DorkError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = to_rpc_error_body(&self.0);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<DorkError>,
{
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

/// Shorthand for a plain 400 with a message, used by handlers validating
/// request bodies before touching a domain service.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(DorkError::validation(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use dork_core::errors::MeshError;

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let err = ApiError(DorkError::Mesh(MeshError::NotFound { id: "a1".into() }));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn validation_failure_maps_to_400() {
        let err = bad_request("roots is required");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
