//! Types shared between the `SQLite` transport [`super::transport`] and the
//! read-side [`super::store`].

use serde::{Deserialize, Serialize};

/// Log severity, numerically ordered so `min_level` filters compare cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Developer-facing detail, off by default in production.
    Debug,
    /// Normal operational messages.
    Info,
    /// Recoverable but noteworthy condition.
    Warn,
    /// An operation failed.
    Error,
    /// The process cannot continue safely.
    Fatal,
}

impl LogLevel {
    /// Numeric value used for `level_num` comparisons and `min_level` filters.
    #[must_use]
    pub fn as_num(self) -> i32 {
        match self {
            Self::Trace => 10,
            Self::Debug => 20,
            Self::Info => 30,
            Self::Warn => 40,
            Self::Error => 50,
            Self::Fatal => 60,
        }
    }

    /// Parse a level name, defaulting to [`LogLevel::Info`] on anything
    /// unrecognised rather than failing a query.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            "fatal" => Self::Fatal,
            _ => Self::Info,
        }
    }

    /// Map from a `tracing::Level`.
    #[must_use]
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }

    /// Lowercase name, as stored in the `level` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

/// A single persisted log record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// Row id.
    pub id: i64,
    /// ISO-8601 timestamp with millisecond precision.
    pub timestamp: String,
    /// Severity.
    pub level: LogLevel,
    /// Numeric severity, redundant with `level` but indexed for range queries.
    pub level_num: i32,
    /// Emitting component, e.g. `"relay"`, `"pulse"`, `"mesh"`.
    pub component: String,
    /// Rendered message.
    pub message: String,
    /// Session this event was emitted within, if any.
    pub session_id: Option<String>,
    /// Subject this event concerns, if any.
    pub subject: Option<String>,
    /// Schedule this event concerns, if any.
    pub schedule_id: Option<String>,
    /// Trace this event belongs to, if any.
    pub trace_id: Option<String>,
    /// Parent trace, for building a trace tree.
    pub parent_trace_id: Option<String>,
    /// Nesting depth within the trace tree.
    pub depth: Option<i64>,
    /// Arbitrary structured fields attached to the event.
    pub data: Option<serde_json::Value>,
    /// Error message, if this event carried one.
    pub error_message: Option<String>,
}

/// Filters for [`super::store::LogStore::query`].
#[derive(Clone, Debug, Default)]
pub struct LogQueryOptions {
    /// Restrict to one session.
    pub session_id: Option<String>,
    /// Restrict to one subject.
    pub subject: Option<String>,
    /// Restrict to one schedule.
    pub schedule_id: Option<String>,
    /// Minimum severity (inclusive), as returned by [`LogLevel::as_num`].
    pub min_level: Option<i32>,
    /// Restrict to one trace.
    pub trace_id: Option<String>,
    /// Restrict to a set of emitting components.
    pub components: Option<Vec<String>>,
    /// `"asc"` or `"desc"`; defaults to `"asc"`.
    pub order: Option<String>,
    /// Maximum rows to return.
    pub limit: Option<usize>,
    /// Rows to skip before collecting `limit`.
    pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn as_num_matches_expected_scale() {
        assert_eq!(LogLevel::Info.as_num(), 30);
        assert_eq!(LogLevel::Error.as_num(), 50);
    }

    #[test]
    fn from_str_lossy_unknown_defaults_to_info() {
        assert_eq!(LogLevel::from_str_lossy("bogus"), LogLevel::Info);
    }

    #[test]
    fn from_str_lossy_known() {
        assert_eq!(LogLevel::from_str_lossy("WARN"), LogLevel::Warn);
    }
}
