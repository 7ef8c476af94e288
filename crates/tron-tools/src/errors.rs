//! Tool error types.
//!
//! Unified error enum for all tool execution failures. Each variant maps to
//! a specific user-facing error message format.

use std::io;

use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Operation timed out.
    #[error("timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Resource not found.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was not found.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (catch-all).
    #[error("{message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = ToolError::Validation {
            message: "missing required parameter".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation error: missing required parameter"
        );
    }

    #[test]
    fn timeout_display_includes_ms() {
        let err = ToolError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "timeout after 5000ms");
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let tool_err = ToolError::from(io_err);
        assert!(matches!(tool_err, ToolError::Io(_)));
        assert!(tool_err.to_string().contains("gone"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let tool_err = ToolError::from(json_err);
        assert!(matches!(tool_err, ToolError::Json(_)));
    }
}
