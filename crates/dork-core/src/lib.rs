//! Foundation types shared by every dork crate: branded IDs, the kinded
//! error hierarchy, timestamp helpers, and structured logging.

pub mod boundary;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod time;

pub use boundary::validate_boundary;
pub use errors::{
    BoundaryError, BoundaryKind, BudgetKind, DorkError, ErrorCollector, MeshError, PulseError,
    RelayError, SessionError, SessionOperation, SettingsError,
};
pub use ids::{AgentId, DenialId, EnvelopeId, RunId, ScheduleId, SessionId, SpanId, TraceId};
