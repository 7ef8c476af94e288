//! Branded ID newtypes for type safety.
//!
//! Every entity in the dork daemon has a distinct ID type implemented as a
//! newtype wrapper around [`ulid::Ulid`]. This prevents accidentally passing
//! a schedule ID where a run ID is expected, and keeps every ID
//! lexicographically sortable by creation time — callers can order a page of
//! envelopes or runs by `id` alone without a separate `createdAt` column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Create a new, time-ordered ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Parse from an existing 26-character ULID string.
            pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
                Ulid::from_string(s).map(Self)
            }

            /// Return the canonical 26-character representation.
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Ulid> for $name {
            fn from(u: Ulid) -> Self {
                Self(u)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a Relay envelope.
    EnvelopeId
}

branded_id! {
    /// Unique identifier for a trace span.
    SpanId
}

branded_id! {
    /// Unique identifier for a Pulse schedule.
    ScheduleId
}

branded_id! {
    /// Unique identifier for a single run of a schedule.
    RunId
}

branded_id! {
    /// Unique identifier for a registered agent manifest.
    AgentId
}

branded_id! {
    /// Unique identifier for a conversation session.
    SessionId
}

branded_id! {
    /// Unique identifier for a path denial record.
    DenialId
}

/// A trace ID ties together every span emitted while handling one publish.
///
/// Distinct type from [`SpanId`] even though both wrap a ULID: a trace
/// outlives the individual spans nested inside it, and the two must never be
/// interchanged at a call site.
branded_id! {
    /// Unique identifier for a trace (a tree of spans).
    TraceId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = EnvelopeId::new();
        let b = EnvelopeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_lexicographically_sortable_by_creation_order() {
        let a = RunId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = RunId::new();
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn round_trips_through_string() {
        let id = ScheduleId::new();
        let s = id.to_string();
        let back = ScheduleId::parse(&s).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn from_str_trait() {
        let id = AgentId::new();
        let parsed: AgentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_ulid() {
        assert!(SessionId::parse("not-a-ulid").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let id = DenialId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: DenialId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn default_creates_new() {
        let a = TraceId::default();
        let b = TraceId::default();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let id = SpanId::new();
        let mut set = HashSet::new();
        set.insert(id);
        set.insert(id);
        assert_eq!(set.len(), 1);
    }
}
