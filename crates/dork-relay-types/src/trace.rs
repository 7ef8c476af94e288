//! Trace span records — one per observed unit of work in the publish
//! pipeline, keyed by `traceId` and `messageId`.

use dork_core::{SpanId, TraceId};
use serde::{Deserialize, Serialize};

/// What kind of work a [`Span`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A `publish()` call.
    Publish,
    /// A maildir delivery to an endpoint.
    Deliver,
    /// An outbound adapter delivery.
    AdapterDeliver,
    /// An envelope was dead-lettered (budget exhaustion or access denial).
    DeadLetter,
}

impl SpanKind {
    /// Lowercase `snake_case` name, as stored and queried.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Deliver => "deliver",
            Self::AdapterDeliver => "adapter_deliver",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Parse from the stored name, defaulting to [`SpanKind::Publish`] if
    /// unrecognised rather than failing a query.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "deliver" => Self::Deliver,
            "adapter_deliver" => Self::AdapterDeliver,
            "dead_letter" => Self::DeadLetter,
            _ => Self::Publish,
        }
    }
}

/// One record of observed work within a trace tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Span {
    /// The trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's own id.
    pub span_id: SpanId,
    /// The span that caused this one, if any.
    pub parent_span_id: Option<SpanId>,
    /// The envelope this span concerns.
    pub message_id: String,
    /// The subject involved.
    pub subject: String,
    /// Hop count at the time this span was recorded.
    pub hop_count: u32,
    /// What kind of work this span records.
    pub kind: SpanKind,
    /// ISO-8601 start timestamp.
    pub started_at: String,
    /// Duration in milliseconds.
    pub duration_ms: i64,
    /// Error message, if this span recorded a failure.
    pub error_message: Option<String>,
}

impl Span {
    /// Build a new span at the current instant.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trace_id: TraceId,
        parent_span_id: Option<SpanId>,
        message_id: impl Into<String>,
        subject: impl Into<String>,
        hop_count: u32,
        kind: SpanKind,
        duration_ms: i64,
        error_message: Option<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id: SpanId::new(),
            parent_span_id,
            message_id: message_id.into(),
            subject: subject.into(),
            hop_count,
            kind,
            started_at: dork_core::time::now_iso(),
            duration_ms,
            error_message,
        }
    }
}
