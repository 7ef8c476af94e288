//! Error hierarchy for the dork daemon.
//!
//! Provides a structured error type system built on [`thiserror`]:
//!
//! - [`DorkError`]: top-level enum covering every domain
//! - [`RelayError`]: publish-pipeline failures (bad subject, exhausted budget, access denial)
//! - [`BoundaryError`]: path-safety failures
//! - [`PulseError`]: schedule/run persistence and execution failures
//! - [`MeshError`]: agent registry/discovery failures
//! - [`SessionError`]: session lifecycle and streaming failures
//! - [`ErrorCollector`]: accumulates errors from fire-and-forget teardown
//!
//! The wire-format error types in [`rpc`] provide the HTTP edge's machine
//! readable error codes.

pub mod rpc;

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// DorkError — top-level error enum
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the dork daemon.
#[derive(Debug, Error)]
pub enum DorkError {
    /// Relay publish-pipeline error.
    #[error("{0}")]
    Relay(#[from] RelayError),

    /// Path boundary violation.
    #[error("{0}")]
    Boundary(#[from] BoundaryError),

    /// Pulse scheduler/store error.
    #[error("{0}")]
    Pulse(#[from] PulseError),

    /// Mesh registry/discovery error.
    #[error("{0}")]
    Mesh(#[from] MeshError),

    /// Session manager error.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Settings store error.
    #[error("{0}")]
    Settings(#[from] SettingsError),

    /// Generic not-found error, keyed by entity kind and id.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"schedule"`, `"agent"`, `"session"`.
        entity: String,
        /// The id that was looked up.
        id: String,
    },

    /// Input failed schema/shape validation.
    #[error("validation failed: {message}")]
    ValidationFailed {
        /// Human-readable description of what failed.
        message: String,
    },

    /// A write would conflict with an existing record (e.g. duplicate denial).
    #[error("domain conflict: {message}")]
    DomainConflict {
        /// Human-readable description of the conflict.
        message: String,
    },
}

impl DorkError {
    /// Convenience constructor for [`DorkError::NotFound`].
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for [`DorkError::ValidationFailed`].
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`DorkError::DomainConflict`].
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::DomainConflict {
            message: message.into(),
        }
    }

    /// Machine-readable error code, stable across releases.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Relay(e) => e.code(),
            Self::Boundary(e) => e.code(),
            Self::Pulse(e) => e.code(),
            Self::Mesh(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Settings(e) => e.code(),
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::DomainConflict { .. } => "DOMAIN_CONFLICT",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelayError
// ─────────────────────────────────────────────────────────────────────────────

/// Which budget dimension was exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetKind {
    /// `hopCount` would exceed `maxHops`.
    Hops,
    /// The envelope's `ttl` has already elapsed.
    Ttl,
    /// `callBudgetRemaining` has reached zero.
    Calls,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hops => write!(f, "hops"),
            Self::Ttl => write!(f, "ttl"),
            Self::Calls => write!(f, "calls"),
        }
    }
}

/// Relay publish-pipeline error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The subject does not parse as a valid dotted-token address.
    #[error("invalid subject {subject:?}: {reason}")]
    InvalidSubject {
        /// The offending subject string.
        subject: String,
        /// Why it was rejected.
        reason: String,
    },

    /// One of the envelope's budgets was exhausted before delivery.
    #[error("budget exceeded ({kind}) for message {message_id}")]
    BudgetExceeded {
        /// Which budget dimension failed.
        kind: BudgetKind,
        /// The envelope id that was dead-lettered.
        message_id: String,
    },

    /// A policy layer refused to route this publish.
    #[error("access denied: {reason}")]
    AccessDenied {
        /// Human-readable denial reason.
        reason: String,
    },

    /// No registered endpoint matches the requested subject.
    #[error("no endpoint registered for subject {subject:?}")]
    EndpointNotFound {
        /// The subject that had no matching endpoint.
        subject: String,
    },

    /// An adapter's `deliver` call failed or timed out.
    #[error("adapter {adapter_id} failed to deliver: {message}")]
    AdapterFailed {
        /// The adapter instance id.
        adapter_id: String,
        /// Failure description.
        message: String,
    },

    /// Underlying filesystem operation on the maildir failed.
    #[error("maildir operation failed: {0}")]
    Filesystem(#[source] std::io::Error),

    /// Underlying SQLite index operation failed.
    #[error("relay index error: {0}")]
    Index(#[source] rusqlite::Error),
}

impl RelayError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSubject { .. } => "INVALID_SUBJECT",
            Self::BudgetExceeded {
                kind: BudgetKind::Hops,
                ..
            } => "BUDGET_EXCEEDED_HOPS",
            Self::BudgetExceeded {
                kind: BudgetKind::Ttl,
                ..
            } => "BUDGET_EXCEEDED_TTL",
            Self::BudgetExceeded {
                kind: BudgetKind::Calls,
                ..
            } => "BUDGET_EXCEEDED_CALLS",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::EndpointNotFound { .. } => "ENDPOINT_NOT_FOUND",
            Self::AdapterFailed { .. } => "ADAPTER_FAILED",
            Self::Filesystem(_) | Self::Index(_) => "RELAY_STORE_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BoundaryError
// ─────────────────────────────────────────────────────────────────────────────

/// Path-safety violation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryKind {
    /// The path contains a NUL byte.
    NullByte,
    /// Canonicalisation escapes the configured boundary root.
    OutsideBoundary,
}

/// Path-boundary validation failure.
#[derive(Debug, Error)]
#[error("boundary violation ({kind:?}) for path {path:?}")]
pub struct BoundaryError {
    /// The offending path, as supplied by the caller.
    pub path: String,
    /// Which check failed.
    pub kind: BoundaryKind,
}

impl BoundaryError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.kind {
            BoundaryKind::NullByte => "NULL_BYTE",
            BoundaryKind::OutsideBoundary => "OUTSIDE_BOUNDARY",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PulseError
// ─────────────────────────────────────────────────────────────────────────────

/// Pulse scheduler/store error.
#[derive(Debug, Error)]
pub enum PulseError {
    /// The schedule's cron expression failed to parse.
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Parser failure reason.
        reason: String,
    },

    /// A run or schedule lookup found nothing.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// `"schedule"` or `"run"`.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// A run was still `running` when the process restarted.
    #[error("run {run_id} interrupted by server restart")]
    Interrupted {
        /// The run id that was reclassified.
        run_id: String,
    },

    /// Underlying SQLite store operation failed.
    #[error("pulse store error: {0}")]
    Store(#[source] rusqlite::Error),
}

impl PulseError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCron { .. } => "VALIDATION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Interrupted { .. } => "INTERRUPTED",
            Self::Store(_) => "PULSE_STORE_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MeshError
// ─────────────────────────────────────────────────────────────────────────────

/// Mesh registry/discovery error.
#[derive(Debug, Error)]
pub enum MeshError {
    /// No agent manifest matches the given id or path.
    #[error("agent not found: {id}")]
    NotFound {
        /// The id or path that was looked up.
        id: String,
    },

    /// Registration would conflict with an existing, non-stale entry.
    #[error("agent registration conflict: {message}")]
    Conflict {
        /// Human-readable description.
        message: String,
    },

    /// Registration input failed validation.
    #[error("invalid agent manifest: {message}")]
    ValidationFailed {
        /// Human-readable description.
        message: String,
    },

    /// Underlying SQLite store operation failed.
    #[error("mesh store error: {0}")]
    Store(#[source] rusqlite::Error),

    /// Connection pool acquisition failed.
    #[error("mesh pool error: {0}")]
    Pool(#[source] std::io::Error),
}

impl MeshError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "DOMAIN_CONFLICT",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::Store(_) | Self::Pool(_) => "MESH_STORE_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionError
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifecycle operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOperation {
    /// Creating a new session.
    Create,
    /// Dispatching a message into the session.
    SendMessage,
    /// Resolving a pending tool-call approval.
    ApproveTool,
    /// Resolving a pending question.
    SubmitAnswers,
}

impl std::fmt::Display for SessionOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::SendMessage => write!(f, "send_message"),
            Self::ApproveTool => write!(f, "approve_tool"),
            Self::SubmitAnswers => write!(f, "submit_answers"),
        }
    }
}

/// Session manager error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No in-memory session matches the given id.
    #[error("session not found: {session_id}")]
    NotFound {
        /// The session id that was looked up.
        session_id: String,
    },

    /// `approveTool`/`submitAnswers` referenced a tool call with no pending gate.
    #[error("no pending {operation} for tool call {tool_call_id}")]
    NoPendingGate {
        /// Which operation found nothing pending.
        operation: SessionOperation,
        /// The tool call id that had no matching gate.
        tool_call_id: String,
    },

    /// The external agent runtime raised an error mid-stream.
    #[error("runtime error in session {session_id}: {message}")]
    Runtime {
        /// The session id that was streaming.
        session_id: String,
        /// Runtime-reported message.
        message: String,
    },
}

impl SessionError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "SESSION_NOT_FOUND",
            Self::NoPendingGate { .. } => "NOT_FOUND",
            Self::Runtime { .. } => "RUNTIME_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SettingsError
// ─────────────────────────────────────────────────────────────────────────────

/// Settings store error.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// `get`/`set`/`reset` referenced a key absent from the compiled schema.
    #[error("unknown setting key {key:?}")]
    UnknownKey {
        /// The offending key.
        key: String,
    },

    /// The supplied value does not match the key's declared type.
    #[error("invalid value for {key:?}: {reason}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The on-disk config file failed to parse as JSON.
    #[error("malformed config at {path:?}: {source}")]
    Malformed {
        /// Path to the config file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Underlying filesystem operation failed.
    #[error("settings filesystem error: {0}")]
    Filesystem(#[source] std::io::Error),
}

impl SettingsError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownKey { .. } => "VALIDATION_FAILED",
            Self::InvalidValue { .. } => "VALIDATION_FAILED",
            Self::Malformed { .. } | Self::Filesystem(_) => "SETTINGS_STORE_ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ErrorCollector
// ─────────────────────────────────────────────────────────────────────────────

/// Collects errors from fire-and-forget operations without losing them.
///
/// Used during concurrent teardown (closing every watcher, stopping every
/// adapter) where one failure must not prevent the others from running.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<String>,
}

impl ErrorCollector {
    /// Create a new empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure, tagged with the component that raised it.
    pub fn collect(&mut self, component: impl Into<String>, error: impl std::fmt::Display) {
        self.errors.push(format!("{}: {error}", component.into()));
    }

    /// Whether any errors have been collected.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of collected errors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// View collected errors.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_codes() {
        let hops = RelayError::BudgetExceeded {
            kind: BudgetKind::Hops,
            message_id: "01ABC".into(),
        };
        assert_eq!(hops.code(), "BUDGET_EXCEEDED_HOPS");

        let ttl = RelayError::BudgetExceeded {
            kind: BudgetKind::Ttl,
            message_id: "01ABC".into(),
        };
        assert_eq!(ttl.code(), "BUDGET_EXCEEDED_TTL");

        let calls = RelayError::BudgetExceeded {
            kind: BudgetKind::Calls,
            message_id: "01ABC".into(),
        };
        assert_eq!(calls.code(), "BUDGET_EXCEEDED_CALLS");
    }

    #[test]
    fn boundary_error_codes() {
        let null_byte = BoundaryError {
            path: "/a\0b".into(),
            kind: BoundaryKind::NullByte,
        };
        assert_eq!(null_byte.code(), "NULL_BYTE");

        let outside = BoundaryError {
            path: "/etc/passwd".into(),
            kind: BoundaryKind::OutsideBoundary,
        };
        assert_eq!(outside.code(), "OUTSIDE_BOUNDARY");
    }

    #[test]
    fn dork_error_wraps_domain_errors() {
        let err: DorkError = RelayError::InvalidSubject {
            subject: "bad subject".into(),
            reason: "contains space".into(),
        }
        .into();
        assert_eq!(err.code(), "INVALID_SUBJECT");
        assert!(err.to_string().contains("bad subject"));
    }

    #[test]
    fn not_found_constructor() {
        let err = DorkError::not_found("schedule", "01XYZ");
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("01XYZ"));
    }

    #[test]
    fn error_collector_accumulates() {
        let mut collector = ErrorCollector::new();
        assert!(!collector.has_errors());
        collector.collect("watcher:a", "closed twice");
        collector.collect("watcher:b", "io error");
        assert_eq!(collector.count(), 2);
        assert!(collector.errors()[0].starts_with("watcher:a"));
    }

    #[test]
    fn session_error_no_pending_gate() {
        let err = SessionError::NoPendingGate {
            operation: SessionOperation::ApproveTool,
            tool_call_id: "call-1".into(),
        };
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("approve_tool"));
    }

    #[test]
    fn pulse_interrupted_message() {
        let err = PulseError::Interrupted {
            run_id: "01RUN".into(),
        };
        assert_eq!(err.code(), "INTERRUPTED");
        assert!(err.to_string().contains("01RUN"));
    }
}
