//! `SQLite`-backed `tracing` transport.
//!
//! Implemented as a [`tracing_subscriber::Layer`] that batches log writes:
//! warn/error/fatal events flush the batch immediately, everything else
//! accumulates until [`spawn_flush_task`](super::spawn_flush_task) ticks or
//! the buffer crosses `batch_size`.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::types::LogLevel;
use crate::time::now_iso;

/// Tuning knobs for [`SqliteTransport`].
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    /// How often [`spawn_flush_task`](super::spawn_flush_task) ticks.
    pub flush_interval_ms: u64,
    /// Buffer size that triggers an immediate flush on the next event.
    pub batch_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1_000,
            batch_size: 100,
        }
    }
}

/// One buffered row awaiting insertion.
struct PendingLog {
    timestamp: String,
    level: LogLevel,
    component: String,
    message: String,
    session_id: Option<String>,
    subject: Option<String>,
    schedule_id: Option<String>,
    trace_id: Option<String>,
    parent_trace_id: Option<String>,
    depth: Option<i64>,
    data: Option<serde_json::Value>,
    error_message: Option<String>,
}

/// A clonable handle used to force a flush or stop the background flush task.
#[derive(Clone)]
pub struct TransportHandle {
    buffer: Arc<Mutex<Vec<PendingLog>>>,
    conn: Arc<Mutex<Connection>>,
}

impl TransportHandle {
    /// Drain the buffer and write every pending row to `SQLite`.
    pub fn flush(&self) {
        let rows = std::mem::take(&mut *self.buffer.lock());
        if rows.is_empty() {
            return;
        }
        let conn = self.conn.lock();
        for row in rows {
            let data_str = row.data.map(|v| v.to_string());
            let _ = conn.execute(
                "INSERT INTO logs (
                    timestamp, level, level_num, component, message,
                    session_id, subject, schedule_id, trace_id,
                    parent_trace_id, depth, data, error_message
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    row.timestamp,
                    row.level.as_str(),
                    row.level.as_num(),
                    row.component,
                    row.message,
                    row.session_id,
                    row.subject,
                    row.schedule_id,
                    row.trace_id,
                    row.parent_trace_id,
                    row.depth,
                    data_str,
                    row.error_message,
                ],
            );
        }
    }
}

/// Ensure the `logs` table exists on the given connection.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            level TEXT NOT NULL,
            level_num INTEGER NOT NULL,
            component TEXT NOT NULL DEFAULT '',
            message TEXT NOT NULL DEFAULT '',
            session_id TEXT,
            subject TEXT,
            schedule_id TEXT,
            trace_id TEXT,
            parent_trace_id TEXT,
            depth INTEGER,
            data TEXT,
            error_message TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_logs_session ON logs(session_id);
        CREATE INDEX IF NOT EXISTS idx_logs_trace ON logs(trace_id);
        CREATE INDEX IF NOT EXISTS idx_logs_level_num ON logs(level_num);",
    )
}

/// The `tracing_subscriber::Layer` that feeds the `logs` table.
pub struct SqliteTransport {
    buffer: Arc<Mutex<Vec<PendingLog>>>,
    conn: Arc<Mutex<Connection>>,
    config: TransportConfig,
}

impl SqliteTransport {
    /// Wrap a connection that already has the `logs` table (see
    /// [`ensure_schema`]).
    #[must_use]
    pub fn new(conn: Connection, config: TransportConfig) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            conn: Arc::new(Mutex::new(conn)),
            config,
        }
    }

    /// Obtain a handle for manual flushing and periodic-flush spawning.
    #[must_use]
    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            buffer: Arc::clone(&self.buffer),
            conn: Arc::clone(&self.conn),
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    session_id: Option<String>,
    subject: Option<String>,
    schedule_id: Option<String>,
    trace_id: Option<String>,
    parent_trace_id: Option<String>,
    depth: Option<i64>,
    error_message: Option<String>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_owned(),
            "session_id" => self.session_id = Some(value.to_owned()),
            "subject" => self.subject = Some(value.to_owned()),
            "schedule_id" => self.schedule_id = Some(value.to_owned()),
            "trace_id" => self.trace_id = Some(value.to_owned()),
            "parent_trace_id" => self.parent_trace_id = Some(value.to_owned()),
            "error" | "error_message" => self.error_message = Some(value.to_owned()),
            name => {
                let _ = self
                    .extra
                    .insert(name.to_owned(), serde_json::Value::String(value.to_owned()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "depth" {
            self.depth = Some(value);
        } else {
            let _ = self
                .extra
                .insert(field.name().to_owned(), serde_json::Value::from(value));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_i64(field, i64::try_from(value).unwrap_or(i64::MAX));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        let _ = self
            .extra
            .insert(field.name().to_owned(), serde_json::Value::from(value));
    }
}

impl<S> Layer<S> for SqliteTransport
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from_tracing(metadata.level());

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let data = if visitor.extra.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(visitor.extra))
        };

        let row = PendingLog {
            timestamp: now_iso(),
            level,
            component: metadata.target().to_owned(),
            message: visitor.message,
            session_id: visitor.session_id,
            subject: visitor.subject,
            schedule_id: visitor.schedule_id,
            trace_id: visitor.trace_id,
            parent_trace_id: visitor.parent_trace_id,
            depth: visitor.depth,
            data,
            error_message: visitor.error_message,
        };

        let should_flush_now = level >= LogLevel::Warn;
        {
            let mut buffer = self.buffer.lock();
            buffer.push(row);
            if buffer.len() < self.config.batch_size && !should_flush_now {
                return;
            }
        }

        self.handle().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn handle_flush_is_noop_on_empty_buffer() {
        let transport = SqliteTransport::new(test_conn(), TransportConfig::default());
        transport.handle().flush();
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = test_conn();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
    }

    #[test]
    fn flush_inserts_buffered_rows() {
        let transport = SqliteTransport::new(test_conn(), TransportConfig::default());
        transport.buffer.lock().push(PendingLog {
            timestamp: now_iso(),
            level: LogLevel::Info,
            component: "relay".into(),
            message: "hello".into(),
            session_id: None,
            subject: Some("relay.agent.a".into()),
            schedule_id: None,
            trace_id: None,
            parent_trace_id: None,
            depth: None,
            data: None,
            error_message: None,
        });
        transport.handle().flush();

        let conn = transport.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
