//! Wire-format error types for the HTTP edge.
//!
//! Typed error codes eliminate string-based error detection on the client
//! side. Every code maps to exactly one HTTP status in the server crate.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::DorkError;

/// Centralized HTTP-edge error codes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcErrorCode {
    /// Request body or query failed validation.
    #[serde(rename = "VALIDATION_FAILED")]
    ValidationFailed,
    /// Subject string does not parse.
    #[serde(rename = "INVALID_SUBJECT")]
    InvalidSubject,
    /// `hopCount` would exceed `maxHops`.
    #[serde(rename = "BUDGET_EXCEEDED_HOPS")]
    BudgetExceededHops,
    /// Envelope `ttl` already elapsed.
    #[serde(rename = "BUDGET_EXCEEDED_TTL")]
    BudgetExceededTtl,
    /// `callBudgetRemaining` reached zero.
    #[serde(rename = "BUDGET_EXCEEDED_CALLS")]
    BudgetExceededCalls,
    /// Policy layer refused the publish.
    #[serde(rename = "ACCESS_DENIED")]
    AccessDenied,
    /// No endpoint registered for the subject.
    #[serde(rename = "ENDPOINT_NOT_FOUND")]
    EndpointNotFound,
    /// Path contains a NUL byte.
    #[serde(rename = "NULL_BYTE")]
    NullByte,
    /// Path escapes the configured boundary root.
    #[serde(rename = "OUTSIDE_BOUNDARY")]
    OutsideBoundary,
    /// Entity lookup found nothing.
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    /// Write would conflict with an existing record.
    #[serde(rename = "DOMAIN_CONFLICT")]
    DomainConflict,
    /// Adapter delivery failed.
    #[serde(rename = "ADAPTER_FAILED")]
    AdapterFailed,
    /// External agent runtime raised an error mid-stream.
    #[serde(rename = "RUNTIME_ERROR")]
    RuntimeError,
    /// A run was interrupted by a server restart or cancellation.
    #[serde(rename = "INTERRUPTED")]
    Interrupted,
    /// Catch-all for anything not otherwise classified.
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_else(|_| "\"INTERNAL_ERROR\"".to_owned());
        write!(f, "{}", s.trim_matches('"'))
    }
}

impl RpcErrorCode {
    /// The HTTP status this code maps to at the server edge.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailed | Self::InvalidSubject => 400,
            Self::AccessDenied | Self::NullByte | Self::OutsideBoundary => 403,
            Self::NotFound | Self::EndpointNotFound => 404,
            Self::DomainConflict => 422,
            Self::BudgetExceededHops
            | Self::BudgetExceededTtl
            | Self::BudgetExceededCalls
            | Self::AdapterFailed
            | Self::RuntimeError
            | Self::Interrupted
            | Self::InternalError => 500,
        }
    }

    /// Classify a [`DorkError`]'s machine-readable code into a wire code.
    #[must_use]
    pub fn from_dork_code(code: &str) -> Self {
        match code {
            "VALIDATION_FAILED" => Self::ValidationFailed,
            "INVALID_SUBJECT" => Self::InvalidSubject,
            "BUDGET_EXCEEDED_HOPS" => Self::BudgetExceededHops,
            "BUDGET_EXCEEDED_TTL" => Self::BudgetExceededTtl,
            "BUDGET_EXCEEDED_CALLS" => Self::BudgetExceededCalls,
            "ACCESS_DENIED" => Self::AccessDenied,
            "ENDPOINT_NOT_FOUND" => Self::EndpointNotFound,
            "NULL_BYTE" => Self::NullByte,
            "OUTSIDE_BOUNDARY" => Self::OutsideBoundary,
            "NOT_FOUND" | "SESSION_NOT_FOUND" => Self::NotFound,
            "DOMAIN_CONFLICT" => Self::DomainConflict,
            "ADAPTER_FAILED" => Self::AdapterFailed,
            "RUNTIME_ERROR" => Self::RuntimeError,
            "INTERRUPTED" => Self::Interrupted,
            _ => Self::InternalError,
        }
    }
}

/// Error payload returned in every non-2xx JSON response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Error detail.
    pub error: RpcErrorDetail,
}

/// Error detail inside an [`RpcErrorBody`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorDetail {
    /// Machine-readable code.
    pub code: RpcErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Convert a [`DorkError`] into the wire-format body plus its HTTP status.
#[must_use]
pub fn to_rpc_error_body(error: &DorkError) -> (u16, RpcErrorBody) {
    let code = RpcErrorCode::from_dork_code(error.code());
    let status = code.http_status();
    (
        status,
        RpcErrorBody {
            success: false,
            error: RpcErrorDetail {
                code,
                message: error.to_string(),
            },
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::{BudgetKind, RelayError};
    use super::*;

    #[test]
    fn rpc_error_code_serde() {
        assert_eq!(
            serde_json::to_string(&RpcErrorCode::BudgetExceededHops).unwrap(),
            "\"BUDGET_EXCEEDED_HOPS\""
        );
    }

    #[test]
    fn rpc_error_code_display() {
        assert_eq!(RpcErrorCode::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(RpcErrorCode::ValidationFailed.http_status(), 400);
        assert_eq!(RpcErrorCode::AccessDenied.http_status(), 403);
        assert_eq!(RpcErrorCode::NotFound.http_status(), 404);
        assert_eq!(RpcErrorCode::DomainConflict.http_status(), 422);
        assert_eq!(RpcErrorCode::AdapterFailed.http_status(), 500);
    }

    #[test]
    fn to_rpc_error_body_from_relay_error() {
        let err: DorkError = RelayError::BudgetExceeded {
            kind: BudgetKind::Hops,
            message_id: "01ABC".into(),
        }
        .into();
        let (status, body) = to_rpc_error_body(&err);
        assert_eq!(status, 500);
        assert_eq!(body.error.code, RpcErrorCode::BudgetExceededHops);
        assert!(!body.success);
    }

    #[test]
    fn unknown_code_maps_to_internal_error() {
        assert_eq!(
            RpcErrorCode::from_dork_code("SOMETHING_NEW"),
            RpcErrorCode::InternalError
        );
    }

    #[test]
    fn body_serializes_with_screaming_snake_code() {
        let body = RpcErrorBody {
            success: false,
            error: RpcErrorDetail {
                code: RpcErrorCode::OutsideBoundary,
                message: "nope".into(),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["code"], "OUTSIDE_BOUNDARY");
    }
}
