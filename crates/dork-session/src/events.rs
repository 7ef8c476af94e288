//! Wire-level stream events emitted while a session is dispatching a turn.
//!
//! These are deliberately flatter than the backend's internal event shapes —
//! callers over HTTP/SSE only need enough structure to render a transcript
//! and to react to gating events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::question::QuestionSpec;

/// One increment of a streamed agent turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta {
        /// The text fragment.
        text: String,
    },
    /// A tool call has begun.
    ToolCallStart {
        /// Backend-assigned identifier correlating start/delta/end.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
    },
    /// Incremental tool-call input.
    ToolCallDelta {
        /// Identifier matching a prior `ToolCallStart`.
        tool_call_id: String,
        /// Raw input fragment, usually a partial JSON string.
        input: String,
    },
    /// A tool call has finished or was denied.
    ToolCallEnd {
        /// Identifier matching a prior `ToolCallStart`.
        tool_call_id: String,
        /// Terminal status of the call.
        status: ToolCallStatus,
    },
    /// The backend is blocked on `AskUserQuestion` answers.
    Question {
        /// The tool call carrying the question payload.
        tool_call_id: String,
        /// Parsed questions the caller must answer to unblock the turn.
        questions: Vec<QuestionSpec>,
    },
    /// A non-fatal or fatal error occurred during dispatch.
    Error {
        /// Human-readable message.
        message: String,
        /// Machine-readable error code, when available.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// The turn has finished; no further events will be emitted.
    Done {
        /// The session the turn belonged to.
        session_id: String,
    },
}

/// Terminal status of a dispatched tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Ran to completion.
    Completed,
    /// Denied by the user during approval gating.
    Denied,
    /// Failed during execution.
    Failed,
}

/// Raw input accumulated from a sequence of `ToolCallDelta` fragments,
/// parsed once the matching `ToolCallEnd` arrives.
#[must_use]
pub fn parse_tool_input(accumulated: &str) -> Value {
    serde_json::from_str(accumulated).unwrap_or_else(|_| Value::String(accumulated.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_round_trips() {
        let event = StreamEvent::TextDelta { text: "hi".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"text_delta","text":"hi"}"#);
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn error_omits_missing_code() {
        let event = StreamEvent::Error {
            message: "boom".into(),
            code: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"boom"}"#);
    }

    #[test]
    fn parse_tool_input_falls_back_to_string() {
        assert_eq!(parse_tool_input("not json"), Value::String("not json".into()));
        assert_eq!(parse_tool_input(r#"{"a":1}"#), serde_json::json!({"a": 1}));
    }
}
