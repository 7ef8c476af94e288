//! Wire types for the Relay: subjects, envelopes, budgets, endpoints, and
//! trace spans. No I/O lives here — persistence is `dork-relay-store`,
//! orchestration is `dork-relay`.

pub mod endpoint;
pub mod envelope;
pub mod subject;
pub mod trace;

pub use endpoint::EndpointInfo;
pub use envelope::{Budget, Envelope};
pub use subject::{endpoint_hash, matches, validate_pattern, validate_subject};
pub use trace::{Span, SpanKind};
