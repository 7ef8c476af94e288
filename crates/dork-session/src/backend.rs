//! The seam to the external agent runtime.
//!
//! The agent runtime itself is deliberately kept out of
//! scope: this crate dispatches turns, tracks gating state, and reconstructs
//! transcripts, but never decides what the agent says. [`AgentBackend`] is
//! the trait a concrete runtime integration implements; the session manager
//! only depends on this trait, never on a specific runtime.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Outcome of a tool-call gate, delivered back to the backend through the
/// `gate` channel embedded in [`BackendEvent::ToolCallStart`].
#[derive(Clone, Debug, PartialEq)]
pub enum ToolGateOutcome {
    /// The call is approved and may proceed with `input` (possibly edited by
    /// the user before approval).
    Approved {
        /// Final input to execute the call with.
        input: Value,
    },
    /// The call is denied and must not execute.
    Denied {
        /// Optional reason surfaced back to the agent as a tool result.
        reason: Option<String>,
    },
    /// Answers to an `AskUserQuestion` call, keyed by question index.
    Answered {
        /// Map from question index (as a string) to encoded answer.
        answers: std::collections::BTreeMap<String, String>,
    },
}

/// One event produced by a backend while dispatching a turn.
///
/// A tool call that requires gating carries a `oneshot::Sender` the
/// [`crate::manager::SessionManager`] uses to deliver the [`ToolGateOutcome`]
/// once the user has responded; the backend awaits its receiver before
/// continuing, so blocking is owned entirely by the backend implementation
/// and the session manager never needs to pause or resume the stream itself.
#[derive(Debug)]
pub enum BackendEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// A tool call has begun and is auto-approved; no gate is attached.
    ToolCallAuto {
        /// Backend-assigned identifier.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Full input, already known (auto-approved calls stream it whole).
        input: Value,
    },
    /// A tool call requires approval or an answer before it may proceed.
    ToolCallGated {
        /// Backend-assigned identifier.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Full input as proposed by the agent.
        input: Value,
        /// Channel the gate outcome is delivered on.
        gate: oneshot::Sender<ToolGateOutcome>,
    },
    /// A previously started tool call has produced a result.
    ToolCallResult {
        /// Matching tool call identifier.
        tool_call_id: String,
        /// Whether the call succeeded.
        success: bool,
        /// Result payload or error message.
        output: Value,
    },
    /// The backend hit an error. Fatal errors end the stream; non-fatal ones
    /// do not.
    Error {
        /// Human-readable message.
        message: String,
        /// Whether the turn cannot continue after this.
        fatal: bool,
    },
    /// The turn has finished.
    Done,
}

/// A running agent turn, as handed back by [`AgentBackend::dispatch`].
pub type BackendStream = std::pin::Pin<Box<dyn futures::Stream<Item = BackendEvent> + Send>>;

/// Parameters for starting or resuming a turn.
#[derive(Clone, Debug)]
pub struct DispatchRequest {
    /// Session this turn belongs to.
    pub session_id: String,
    /// User message text.
    pub message: String,
    /// Working directory the backend should operate in.
    pub cwd: std::path::PathBuf,
    /// Runtime-assigned id of a prior turn to resume, if any.
    pub resume_sdk_session_id: Option<String>,
}

/// Integration point to an external agent coding runtime.
///
/// Implementations own everything about how a turn is actually executed —
/// model calls, tool execution, context assembly — none of which this crate
/// concerns itself with.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Begin dispatching a turn, returning a stream of backend events.
    /// `cancellation` lets the caller abort an in-flight turn cooperatively.
    async fn dispatch(
        &self,
        request: DispatchRequest,
        cancellation: CancellationToken,
    ) -> Result<BackendStream, dork_core::SessionError>;
}
