//! In-memory session state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dork_core::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::backend::ToolGateOutcome;
use crate::question::QuestionSpec;
use crate::state::PermissionMode;

/// A tool call awaiting an approve/deny decision.
pub struct PendingApproval {
    /// Tool call identifier.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Proposed input.
    pub input: serde_json::Value,
    /// Channel the decision is delivered on.
    pub gate: oneshot::Sender<ToolGateOutcome>,
}

/// A tool call awaiting `AskUserQuestion` answers.
pub struct PendingQuestion {
    /// Tool call identifier.
    pub tool_call_id: String,
    /// Questions the caller must answer.
    pub questions: Vec<QuestionSpec>,
    /// Channel the answers are delivered on.
    pub gate: oneshot::Sender<ToolGateOutcome>,
}

/// Summary of a session's public state, safe to serialize over the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Current permission mode.
    pub permission_mode: PermissionMode,
    /// Working directory, once a first message has established one.
    pub cwd: Option<String>,
    /// Last time a message was sent or a gate was resolved.
    pub last_touched_at: DateTime<Utc>,
    /// Number of tool calls currently awaiting approval.
    pub pending_approval_count: usize,
    /// Number of tool calls currently awaiting answers.
    pub pending_question_count: usize,
    /// Backend-assigned id of the most recent turn, if resumable.
    pub sdk_session_id: Option<String>,
}

/// A session's full state, held by the [`crate::manager::SessionManager`].
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Current permission mode.
    pub permission_mode: PermissionMode,
    /// Working directory, set on the first `send_message` call.
    pub cwd: Option<String>,
    /// Last time a message was sent or a gate was resolved.
    pub last_touched_at: DateTime<Utc>,
    /// Tool calls awaiting approval, keyed by tool call id.
    pub pending_approvals: BTreeMap<String, PendingApproval>,
    /// Tool calls awaiting answers, keyed by tool call id.
    pub pending_questions: BTreeMap<String, PendingQuestion>,
    /// Backend-assigned id of the most recent turn, for resumption.
    pub sdk_session_id: Option<String>,
}

impl Session {
    /// Create a fresh, idle session.
    #[must_use]
    pub fn new(id: SessionId, permission_mode: PermissionMode) -> Self {
        Self {
            id,
            permission_mode,
            cwd: None,
            last_touched_at: Utc::now(),
            pending_approvals: BTreeMap::new(),
            pending_questions: BTreeMap::new(),
            sdk_session_id: None,
        }
    }

    /// Snapshot the public-facing summary.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            permission_mode: self.permission_mode,
            cwd: self.cwd.clone(),
            last_touched_at: self.last_touched_at,
            pending_approval_count: self.pending_approvals.len(),
            pending_question_count: self.pending_questions.len(),
            sdk_session_id: self.sdk_session_id.clone(),
        }
    }

    /// Whether the session has been idle for longer than `max_idle`.
    #[must_use]
    pub fn is_idle_past(&self, max_idle: chrono::Duration) -> bool {
        Utc::now().signed_duration_since(self.last_touched_at) > max_idle
    }

    pub(crate) fn touch(&mut self) {
        self.last_touched_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_idle_with_no_pending_gates() {
        let session = Session::new(SessionId::new(), PermissionMode::Default);
        let summary = session.summary();
        assert_eq!(summary.pending_approval_count, 0);
        assert_eq!(summary.pending_question_count, 0);
        assert!(summary.cwd.is_none());
    }

    #[test]
    fn is_idle_past_detects_stale_sessions() {
        let mut session = Session::new(SessionId::new(), PermissionMode::Default);
        session.last_touched_at = Utc::now() - chrono::Duration::minutes(31);
        assert!(session.is_idle_past(chrono::Duration::minutes(30)));
    }
}
