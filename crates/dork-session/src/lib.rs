//! Session manager: in-memory conversation state, streaming agent dispatch,
//! tool-call approval/question gating, and transcript reconstruction.

mod backend;
mod events;
mod manager;
mod question;
mod session;
mod state;
mod transcript;

pub use backend::{AgentBackend, BackendEvent, BackendStream, DispatchRequest, ToolGateOutcome};
pub use events::{parse_tool_input, StreamEvent, ToolCallStatus};
pub use manager::{SessionManager, DEFAULT_MAX_IDLE_MINUTES};
pub use question::{encode_answer, parse_questions, QuestionOption, QuestionSpec};
pub use session::{PendingApproval, PendingQuestion, Session, SessionSummary};
pub use state::{classify_gate, GateKind, PermissionMode};
pub use transcript::{extract_metadata, parse_transcript, MessageType, TranscriptMessage, TranscriptMetadata, TranscriptToolCall};

pub use dork_core::{SessionError, SessionOperation};
