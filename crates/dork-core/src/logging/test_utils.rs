//! Test-only helpers for asserting on emitted log output.

use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Lines captured by [`capture_logs`], in emission order.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<String>>>);

impl CapturedLogs {
    /// Snapshot every captured line so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Whether any captured line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

struct CapturingLayer(CapturedLogs);

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S> Layer<S> for CapturingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0.0.lock().unwrap().push(visitor.0);
    }
}

/// Install a process-local subscriber that only captures log lines into
/// memory, and run `f` under it. Intended for one test process at a time —
/// like the rest of this crate's `init_subscriber`, later calls are no-ops
/// if a global subscriber is already installed, so prefer running logging
/// assertions in a dedicated `#[test]` process or via `tracing::subscriber::with_default`.
pub fn capture_logs<F: FnOnce()>(f: F) -> CapturedLogs {
    let captured = CapturedLogs::default();
    let layer = CapturingLayer(captured.clone());
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    captured
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_emitted_events() {
        let logs = capture_logs(|| {
            tracing::info!("hello from test");
        });
        assert!(logs.contains("hello from test"));
    }

    #[test]
    fn empty_when_nothing_logged() {
        let logs = capture_logs(|| {});
        assert!(logs.lines().is_empty());
    }
}
