//! Session lifecycle: creation, streaming dispatch, and tool-call gating.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dork_core::{validate_boundary, SessionError, SessionId, SessionOperation};
use futures::Stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::backend::{AgentBackend, BackendEvent, DispatchRequest, ToolGateOutcome};
use crate::events::{StreamEvent, ToolCallStatus};
use crate::question::parse_questions;
use crate::session::{PendingApproval, PendingQuestion, Session, SessionSummary};
use crate::state::{classify_gate, GateKind, PermissionMode};

/// Default idle timeout after which [`SessionManager::reap_idle_sessions`]
/// drops a session.
pub const DEFAULT_MAX_IDLE_MINUTES: i64 = 30;

/// Owns every live session and mediates dispatch, gating, and reconstruction.
pub struct SessionManager {
    sessions: DashMap<SessionId, Mutex<Session>>,
    backend: Arc<dyn AgentBackend>,
    boundary_root: PathBuf,
    max_idle: chrono::Duration,
}

impl SessionManager {
    /// Construct a manager bound to `backend`, restricting every session's
    /// `cwd` to land within `boundary_root`.
    #[must_use]
    pub fn new(backend: Arc<dyn AgentBackend>, boundary_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions: DashMap::new(),
            backend,
            boundary_root: boundary_root.into(),
            max_idle: chrono::Duration::minutes(DEFAULT_MAX_IDLE_MINUTES),
        }
    }

    /// Create a new, idle session and return its id.
    #[instrument(skip(self))]
    pub fn create_session(&self, permission_mode: PermissionMode) -> SessionId {
        let id = SessionId::new();
        self.ensure_session(id.clone(), permission_mode, None);
        id
    }

    /// Idempotently create a session under a caller-chosen id, e.g. one
    /// keyed to an unattended run. A no-op if the session already exists.
    #[instrument(skip(self))]
    pub fn ensure_session(&self, id: SessionId, permission_mode: PermissionMode, cwd: Option<String>) {
        self.sessions.entry(id.clone()).or_insert_with(|| {
            let mut session = Session::new(id, permission_mode);
            session.cwd = cwd;
            Mutex::new(session)
        });
    }

    /// Fetch a summary of a live session.
    #[instrument(skip(self))]
    pub fn get_session(&self, session_id: &SessionId) -> Result<SessionSummary, SessionError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.lock().summary())
            .ok_or_else(|| SessionError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    /// List every live session's summary.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| entry.value().lock().summary())
            .collect()
    }

    /// Drop sessions idle past the configured timeout, returning their ids.
    #[instrument(skip(self))]
    pub fn reap_idle_sessions(&self) -> Vec<SessionId> {
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().lock().is_idle_past(self.max_idle))
            .map(|entry| entry.key().clone())
            .collect();
        for id in &stale {
            self.sessions.remove(id);
        }
        stale
    }

    /// Dispatch a message to the backend and stream wire events back,
    /// parking gated tool calls in the session until resolved via
    /// [`SessionManager::approve_tool`] or [`SessionManager::submit_answers`].
    #[instrument(skip(self, message, cancellation))]
    pub fn send_message(
        self: &Arc<Self>,
        session_id: SessionId,
        message: String,
        cwd_override: Option<String>,
        cancellation: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> {
        let this = Arc::clone(self);
        async_stream::stream! {
            this.ensure_session(session_id.clone(), PermissionMode::default(), None);

            let cwd = match this.resolve_cwd(&session_id, cwd_override.as_deref()) {
                Ok(cwd) => cwd,
                Err(_err) => {
                    yield StreamEvent::Error {
                        message: "Directory boundary violation".into(),
                        code: Some("outside_boundary".into()),
                    };
                    yield StreamEvent::Done { session_id: session_id.to_string() };
                    return;
                }
            };

            let (permission_mode, resume_sdk_session_id) = {
                let entry = this.sessions.get(&session_id).expect("just inserted");
                let mut session = entry.lock();
                session.cwd = Some(cwd.to_string_lossy().into_owned());
                session.touch();
                (session.permission_mode, session.sdk_session_id.clone())
            };

            let request = DispatchRequest {
                session_id: session_id.to_string(),
                message,
                cwd,
                resume_sdk_session_id,
            };

            let mut backend_stream = match this.backend.dispatch(request, cancellation.clone()).await {
                Ok(stream) => stream,
                Err(err) => {
                    yield StreamEvent::Error { message: err.to_string(), code: Some(err.code().to_owned()) };
                    yield StreamEvent::Done { session_id: session_id.to_string() };
                    return;
                }
            };

            loop {
                if cancellation.is_cancelled() {
                    return;
                }
                let Some(event) = futures::StreamExt::next(&mut backend_stream).await else {
                    break;
                };
                match event {
                    BackendEvent::TextDelta(text) => yield StreamEvent::TextDelta { text },
                    BackendEvent::ToolCallAuto { tool_call_id, tool_name, input } => {
                        yield StreamEvent::ToolCallStart {
                            tool_call_id: tool_call_id.clone(),
                            tool_name,
                        };
                        yield StreamEvent::ToolCallDelta {
                            tool_call_id,
                            input: input.to_string(),
                        };
                    }
                    BackendEvent::ToolCallGated { tool_call_id, tool_name, input, gate } => {
                        let kind = classify_gate(permission_mode, &tool_name);
                        match kind {
                            GateKind::PendingAnswer => {
                                let questions = parse_questions(&input);
                                this.park_question(&session_id, PendingQuestion {
                                    tool_call_id: tool_call_id.clone(),
                                    questions: questions.clone(),
                                    gate,
                                });
                                yield StreamEvent::Question { tool_call_id, questions };
                            }
                            GateKind::PendingApproval => {
                                this.park_approval(&session_id, PendingApproval {
                                    tool_call_id: tool_call_id.clone(),
                                    tool_name: tool_name.clone(),
                                    input: input.clone(),
                                    gate,
                                });
                                yield StreamEvent::ToolCallStart { tool_call_id: tool_call_id.clone(), tool_name };
                                yield StreamEvent::ToolCallDelta { tool_call_id, input: input.to_string() };
                            }
                            GateKind::Auto => {
                                let _ = gate.send(ToolGateOutcome::Approved { input: input.clone() });
                                yield StreamEvent::ToolCallStart { tool_call_id: tool_call_id.clone(), tool_name };
                                yield StreamEvent::ToolCallDelta { tool_call_id, input: input.to_string() };
                            }
                        }
                    }
                    BackendEvent::ToolCallResult { tool_call_id, success, .. } => {
                        yield StreamEvent::ToolCallEnd {
                            tool_call_id,
                            status: if success { ToolCallStatus::Completed } else { ToolCallStatus::Failed },
                        };
                    }
                    BackendEvent::Error { message, fatal } => {
                        yield StreamEvent::Error { message, code: None };
                        if fatal {
                            break;
                        }
                    }
                    BackendEvent::Done => break,
                }
            }

            if let Some(entry) = this.sessions.get(&session_id) {
                entry.lock().touch();
            }
            yield StreamEvent::Done { session_id: session_id.to_string() };
        }
    }

    /// Resolve and approve or deny a pending tool call.
    #[instrument(skip(self, edited_input))]
    pub fn approve_tool(
        &self,
        session_id: &SessionId,
        tool_call_id: &str,
        approved: bool,
        edited_input: Option<serde_json::Value>,
        denial_reason: Option<String>,
    ) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound { session_id: session_id.to_string() })?;
        let mut session = entry.lock();
        let pending = session.pending_approvals.remove(tool_call_id).ok_or_else(|| {
            SessionError::NoPendingGate {
                operation: SessionOperation::ApproveTool,
                tool_call_id: tool_call_id.to_owned(),
            }
        })?;
        session.touch();
        drop(session);

        let outcome = if approved {
            ToolGateOutcome::Approved { input: edited_input.unwrap_or(pending.input) }
        } else {
            ToolGateOutcome::Denied { reason: denial_reason }
        };
        let _ = pending.gate.send(outcome);
        Ok(())
    }

    /// Resolve a pending `AskUserQuestion` call with answers keyed by
    /// question index (`"0"`, `"1"`, ...).
    #[instrument(skip(self, answers))]
    pub fn submit_answers(
        &self,
        session_id: &SessionId,
        tool_call_id: &str,
        answers: BTreeMap<String, String>,
    ) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound { session_id: session_id.to_string() })?;
        let mut session = entry.lock();
        let pending = session.pending_questions.remove(tool_call_id).ok_or_else(|| {
            SessionError::NoPendingGate {
                operation: SessionOperation::SubmitAnswers,
                tool_call_id: tool_call_id.to_owned(),
            }
        })?;
        session.touch();
        drop(session);

        let _ = pending.gate.send(ToolGateOutcome::Answered { answers });
        Ok(())
    }

    fn resolve_cwd(
        &self,
        session_id: &SessionId,
        cwd_override: Option<&str>,
    ) -> Result<PathBuf, dork_core::BoundaryError> {
        let existing = self
            .sessions
            .get(session_id)
            .and_then(|entry| entry.lock().cwd.clone());

        let candidate = cwd_override.or(existing.as_deref()).unwrap_or(".");
        validate_boundary(candidate, &self.boundary_root)
    }

    fn park_approval(&self, session_id: &SessionId, pending: PendingApproval) {
        if let Some(entry) = self.sessions.get(session_id) {
            entry.lock().pending_approvals.insert(pending.tool_call_id.clone(), pending);
        }
    }

    fn park_question(&self, session_id: &SessionId, pending: PendingQuestion) {
        if let Some(entry) = self.sessions.get(session_id) {
            entry.lock().pending_questions.insert(pending.tool_call_id.clone(), pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendStream;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl AgentBackend for EchoBackend {
        async fn dispatch(
            &self,
            request: DispatchRequest,
            _cancellation: CancellationToken,
        ) -> Result<BackendStream, SessionError> {
            let text = request.message;
            let stream = async_stream::stream! {
                yield BackendEvent::TextDelta(format!("echo: {text}"));
                yield BackendEvent::Done;
            };
            Ok(Box::pin(stream))
        }
    }

    fn manager() -> Arc<SessionManager> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(SessionManager::new(Arc::new(EchoBackend), dir.into_path()))
    }

    #[tokio::test]
    async fn send_message_streams_text_and_done() {
        use futures::StreamExt;
        let manager = manager();
        let session_id = manager.create_session(PermissionMode::Default);
        let stream = manager.send_message(
            session_id.clone(),
            "hi".into(),
            None,
            CancellationToken::new(),
        );
        tokio::pin!(stream);
        let events: Vec<StreamEvent> = stream.collect().await;
        assert!(matches!(&events[0], StreamEvent::TextDelta { text } if text == "echo: hi"));
        assert!(matches!(events.last().unwrap(), StreamEvent::Done { .. }));
    }

    #[test]
    fn get_session_not_found_yields_session_error() {
        let manager = manager();
        let err = manager.get_session(&SessionId::new()).unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn approve_tool_without_pending_gate_errors() {
        let manager = manager();
        let session_id = manager.create_session(PermissionMode::Default);
        let err = manager
            .approve_tool(&session_id, "missing", true, None, None)
            .unwrap_err();
        assert!(matches!(err, SessionError::NoPendingGate { .. }));
    }

    #[test]
    fn reap_idle_sessions_drops_stale_entries() {
        let manager = manager();
        let session_id = manager.create_session(PermissionMode::Default);
        if let Some(entry) = manager.sessions.get(&session_id) {
            entry.lock().last_touched_at = chrono::Utc::now() - chrono::Duration::hours(1);
        }
        let reaped = manager.reap_idle_sessions();
        assert_eq!(reaped, vec![session_id]);
        assert!(manager.list_sessions().is_empty());
    }
}
