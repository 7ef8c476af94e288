//! Structured logging with `tracing` and optional `SQLite` transport.
//!
//! - [`LogLevel`] / [`LogEntry`] / [`LogQueryOptions`] — shared wire types.
//! - [`LogStore`] — read-side queries backing the `/api/logs` route.
//! - [`SqliteTransport`] — a `tracing_subscriber::Layer` persisting events.
//! - [`init_subscriber`] / [`init_subscriber_with_sqlite`] — process-wide setup.
//!
//! Every component emits `tracing` spans/events carrying structured fields
//! (`subject`, `session_id`, `schedule_id`, ...) rather than ad-hoc formatted
//! strings.

pub mod store;
pub mod test_utils;
pub mod transport;
pub mod types;

pub use store::LogStore;
pub use test_utils::{CapturedLogs, capture_logs};
pub use transport::{SqliteTransport, TransportConfig, TransportHandle, ensure_schema};
pub use types::{LogEntry, LogLevel, LogQueryOptions};

/// Initialize the global tracing subscriber with stderr output only.
///
/// Call once at startup. Subsequent calls are no-ops. Respects `DORK_LOG` /
/// `RUST_LOG` if set, otherwise falls back to `level`.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("DORK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with stderr output AND `SQLite`
/// persistence via [`SqliteTransport`].
///
/// Returns a [`TransportHandle`] for manual flushing and a final flush at
/// shutdown.
pub fn init_subscriber_with_sqlite(level: &str, conn: rusqlite::Connection) -> TransportHandle {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = ensure_schema(&conn);

    let filter = EnvFilter::try_from_env("DORK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let transport = SqliteTransport::new(conn, TransportConfig::default());
    let handle = transport.handle();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(transport)
        .try_init();

    handle
}

/// Spawn a periodic flush task for the log transport.
///
/// Abort the returned handle at shutdown after a final
/// [`TransportHandle::flush`].
pub fn spawn_flush_task(handle: TransportHandle) -> tokio::task::JoinHandle<()> {
    let interval_ms = TransportConfig::default().flush_interval_ms;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            handle.flush();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _level = LogLevel::Info;
        let _opts = LogQueryOptions::default();
    }
}
