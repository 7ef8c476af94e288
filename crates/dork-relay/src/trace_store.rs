//! Append-only trace span persistence, for post-hoc observability off the
//! hot delivery path.

use dork_core::{SpanId, TraceId};
use dork_relay_types::{Span, SpanKind};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// Aggregate counters returned by [`TraceStore::get_metrics`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct TraceMetrics {
    /// Span count per kind.
    pub counts: std::collections::BTreeMap<String, i64>,
    /// p50/p95/p99 duration in milliseconds, computed over every span.
    pub latency_percentiles: LatencyPercentiles,
    /// Number of `dead_letter` spans recorded.
    pub budget_rejections: i64,
}

/// Latency percentile summary.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct LatencyPercentiles {
    /// 50th percentile, milliseconds.
    pub p50: i64,
    /// 95th percentile, milliseconds.
    pub p95: i64,
    /// 99th percentile, milliseconds.
    pub p99: i64,
}

/// Create the `relay_spans` table if absent.
///
/// # Errors
/// Propagates the underlying `rusqlite` error.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS relay_spans (
            span_id TEXT PRIMARY KEY,
            trace_id TEXT NOT NULL,
            parent_span_id TEXT,
            message_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            hop_count INTEGER NOT NULL,
            kind TEXT NOT NULL,
            started_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            error_message TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_relay_spans_trace ON relay_spans(trace_id);
        CREATE INDEX IF NOT EXISTS idx_relay_spans_message ON relay_spans(message_id);",
    )
}

/// Append-only span store.
pub struct TraceStore<'a> {
    conn: &'a Connection,
}

impl<'a> TraceStore<'a> {
    /// Wrap a connection that already has the `relay_spans` table.
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append one span record.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn record(&self, span: &Span) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO relay_spans
                (span_id, trace_id, parent_span_id, message_id, subject, hop_count, kind, started_at, duration_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                span.span_id.as_str(),
                span.trace_id.as_str(),
                span.parent_span_id.map(|id| id.as_str()),
                span.message_id,
                span.subject,
                span.hop_count,
                span.kind.as_str(),
                span.started_at,
                span.duration_ms,
                span.error_message,
            ],
        )?;
        Ok(())
    }

    /// Every span recorded under `trace_id`, ordered by start time.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_trace(&self, trace_id: TraceId) -> rusqlite::Result<Vec<Span>> {
        let mut stmt = self.conn.prepare(
            "SELECT span_id, trace_id, parent_span_id, message_id, subject, hop_count, kind, started_at, duration_ms, error_message
             FROM relay_spans WHERE trace_id = ?1 ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map(params![trace_id.as_str()], row_to_span)?;
        rows.collect()
    }

    /// The most recent span recorded for a given message, if any.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_span_by_message_id(&self, message_id: &str) -> rusqlite::Result<Option<Span>> {
        self.conn
            .query_row(
                "SELECT span_id, trace_id, parent_span_id, message_id, subject, hop_count, kind, started_at, duration_ms, error_message
                 FROM relay_spans WHERE message_id = ?1 ORDER BY started_at DESC LIMIT 1",
                params![message_id],
                row_to_span,
            )
            .optional()
    }

    /// Aggregate span counts, latency percentiles, and budget rejection
    /// counts.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_metrics(&self) -> rusqlite::Result<TraceMetrics> {
        let mut counts = std::collections::BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT kind, COUNT(*) FROM relay_spans GROUP BY kind")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (kind, count) = row?;
                let _ = counts.insert(kind, count);
            }
        }

        let budget_rejections = counts.get(SpanKind::DeadLetter.as_str()).copied().unwrap_or(0);

        let mut durations: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT duration_ms FROM relay_spans ORDER BY duration_ms ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        durations.sort_unstable();

        let percentile = |p: f64| -> i64 {
            if durations.is_empty() {
                return 0;
            }
            let idx = ((durations.len() as f64 - 1.0) * p).round() as usize;
            durations[idx.min(durations.len() - 1)]
        };

        Ok(TraceMetrics {
            counts,
            latency_percentiles: LatencyPercentiles {
                p50: percentile(0.50),
                p95: percentile(0.95),
                p99: percentile(0.99),
            },
            budget_rejections,
        })
    }
}

fn row_to_span(row: &rusqlite::Row<'_>) -> rusqlite::Result<Span> {
    let trace_id: String = row.get(1)?;
    let parent_span_id: Option<String> = row.get(2)?;
    let span_id: String = row.get(0)?;
    let kind: String = row.get(6)?;

    Ok(Span {
        trace_id: trace_id.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, "bad trace_id".into())
        })?,
        span_id: span_id.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "bad span_id".into())
        })?,
        parent_span_id: parent_span_id
            .map(|s| {
                s.parse::<SpanId>().map_err(|_| {
                    rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, "bad parent_span_id".into())
                })
            })
            .transpose()?,
        message_id: row.get(3)?,
        subject: row.get(4)?,
        hop_count: row.get(5)?,
        kind: SpanKind::from_str_lossy(&kind),
        started_at: row.get(7)?,
        duration_ms: row.get(8)?,
        error_message: row.get(9)?,
    })
}
