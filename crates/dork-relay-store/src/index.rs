//! Secondary SQLite index over envelopes.
//!
//! The filesystem maildir remains the source of truth; this index exists
//! purely so the relay can answer "what's in this endpoint's inbox" and
//! "what happened to message X" in O(log n) instead of scanning directories.
//! `status` is a semantic vocabulary (`pending`/`delivered`/`failed`) kept
//! deliberately distinct from the filesystem's directory names
//! (`new`/`cur`/`failed`). The two vocabularies only meet inside [`rebuild`].

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::maildir::MaildirStore;

/// Semantic delivery status, distinct from the maildir directory name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Sitting in `new/`, not yet claimed.
    Pending,
    /// Successfully delivered and removed from `cur/`.
    Delivered,
    /// Dead-lettered into `failed/`.
    Failed,
}

impl MessageStatus {
    /// The stored column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Parse the column value, defaulting to [`MessageStatus::Pending`] if
    /// unrecognised.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "delivered" => Self::Delivered,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One indexed row, mirroring an on-disk envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexedMessage {
    /// The envelope id.
    pub id: String,
    /// The target subject.
    pub subject: String,
    /// The endpoint hash this message was routed to.
    pub endpoint_hash: String,
    /// Current semantic status.
    pub status: MessageStatus,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// ISO-8601 expiry timestamp, if the envelope carries a TTL.
    pub expires_at: Option<String>,
}

/// Filters for [`MessageIndex::query_messages`].
#[derive(Clone, Debug, Default)]
pub struct MessageQuery {
    /// Restrict to one subject.
    pub subject: Option<String>,
    /// Restrict to one status.
    pub status: Option<MessageStatus>,
    /// Maximum rows to return.
    pub limit: usize,
    /// Keyset cursor: only return rows with `id < cursor`.
    pub cursor: Option<String>,
}

/// A page of [`MessageIndex::query_messages`] results.
#[derive(Clone, Debug, Default)]
pub struct MessagePage {
    /// The matching rows, ordered by id descending.
    pub messages: Vec<IndexedMessage>,
    /// Cursor for the next page, if more rows remain.
    pub next_cursor: Option<String>,
}

/// Aggregate counters returned by [`MessageIndex::get_metrics`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexMetrics {
    /// Total indexed messages.
    pub total_messages: i64,
    /// Count per status.
    pub by_status: std::collections::BTreeMap<String, i64>,
    /// Subject, count pairs sorted by volume descending.
    pub by_subject: Vec<(String, i64)>,
}

/// Secondary index over relay envelopes, backed by a shared SQLite
/// connection pool table.
pub struct MessageIndex<'a> {
    conn: &'a Connection,
}

impl<'a> MessageIndex<'a> {
    /// Wrap a connection that already has the `relay_messages` table (see
    /// [`ensure_schema`]).
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Upsert a row; re-inserting the same id overwrites status/timestamps.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn insert_message(&self, row: &IndexedMessage) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO relay_messages (id, subject, endpoint_hash, status, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                subject = excluded.subject,
                endpoint_hash = excluded.endpoint_hash,
                status = excluded.status,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![
                row.id,
                row.subject,
                row.endpoint_hash,
                row.status.as_str(),
                row.created_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }

    /// Update a row's status. Returns `true` iff a row changed.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn update_status(&self, id: &str, status: MessageStatus) -> rusqlite::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE relay_messages SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    /// Fetch a single message by id.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_message(&self, id: &str) -> rusqlite::Result<Option<IndexedMessage>> {
        self.conn
            .query_row(
                "SELECT id, subject, endpoint_hash, status, created_at, expires_at
                 FROM relay_messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .optional()
    }

    /// Fetch every message addressed to `subject`.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_by_subject(&self, subject: &str) -> rusqlite::Result<Vec<IndexedMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject, endpoint_hash, status, created_at, expires_at
             FROM relay_messages WHERE subject = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![subject], row_to_message)?;
        rows.collect()
    }

    /// Fetch every message routed through `endpoint_hash`.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_by_endpoint(&self, endpoint_hash: &str) -> rusqlite::Result<Vec<IndexedMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject, endpoint_hash, status, created_at, expires_at
             FROM relay_messages WHERE endpoint_hash = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![endpoint_hash], row_to_message)?;
        rows.collect()
    }

    /// Keyset-paginated query ordered by id descending.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn query_messages(&self, query: &MessageQuery) -> rusqlite::Result<MessagePage> {
        let mut sql = String::from(
            "SELECT id, subject, endpoint_hash, status, created_at, expires_at FROM relay_messages WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref subject) = query.subject {
            sql.push_str(" AND subject = ?");
            params.push(Box::new(subject.clone()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_owned()));
        }
        if let Some(ref cursor) = query.cursor {
            sql.push_str(" AND id < ?");
            params.push(Box::new(cursor.clone()));
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");
        let fetch_limit = query.limit + 1;
        params.push(Box::new(fetch_limit as i64));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows: Vec<IndexedMessage> = stmt
            .query_map(param_refs.as_slice(), row_to_message)?
            .collect::<rusqlite::Result<_>>()?;

        let next_cursor = if rows.len() > query.limit {
            rows.truncate(query.limit);
            rows.last().map(|m| m.id.clone())
        } else {
            None
        };

        Ok(MessagePage {
            messages: rows,
            next_cursor,
        })
    }

    /// Count messages in `status = pending` for one endpoint.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn count_new_by_endpoint(&self, endpoint_hash: &str) -> rusqlite::Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM relay_messages WHERE endpoint_hash = ?1 AND status = 'pending'",
            params![endpoint_hash],
            |row| row.get(0),
        )
    }

    /// Remove rows whose `expires_at` is non-null and in the past relative
    /// to `now_iso`. Returns the number of deleted rows.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn delete_expired(&self, now_iso: &str) -> rusqlite::Result<usize> {
        self.conn.execute(
            "DELETE FROM relay_messages WHERE expires_at IS NOT NULL AND expires_at < ?1",
            params![now_iso],
        )
    }

    /// Truncate the table and repopulate it by scanning every registered
    /// maildir: `new → pending`, `cur → delivered`, `failed → failed`.
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn rebuild(
        &self,
        maildir: &MaildirStore,
        endpoints: &[(String, String)],
    ) -> rusqlite::Result<()> {
        self.conn.execute("DELETE FROM relay_messages", [])?;

        for (subject, hash) in endpoints {
            for (dir, status) in [
                ("new", MessageStatus::Pending),
                ("cur", MessageStatus::Delivered),
                ("failed", MessageStatus::Failed),
            ] {
                for id in maildir.scan_directory(hash, dir) {
                    self.insert_message(&IndexedMessage {
                        id,
                        subject: subject.clone(),
                        endpoint_hash: hash.clone(),
                        status,
                        created_at: dork_core::time::now_iso(),
                        expires_at: None,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Aggregate counts: total, by status, and by subject (sorted by volume
    /// descending).
    ///
    /// # Errors
    /// Propagates the underlying `rusqlite` error.
    pub fn get_metrics(&self) -> rusqlite::Result<IndexMetrics> {
        let total_messages: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relay_messages", [], |row| row.get(0))?;

        let mut by_status = std::collections::BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT status, COUNT(*) FROM relay_messages GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                let _ = by_status.insert(status, count);
            }
        }

        let mut by_subject = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT subject, COUNT(*) as cnt FROM relay_messages GROUP BY subject ORDER BY cnt DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                by_subject.push(row?);
            }
        }

        Ok(IndexMetrics {
            total_messages,
            by_status,
            by_subject,
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedMessage> {
    let status_str: String = row.get(3)?;
    Ok(IndexedMessage {
        id: row.get(0)?,
        subject: row.get(1)?,
        endpoint_hash: row.get(2)?,
        status: MessageStatus::from_str_lossy(&status_str),
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

/// Create the `relay_messages` table if absent.
///
/// # Errors
/// Propagates the underlying `rusqlite` error.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS relay_messages (
            id TEXT PRIMARY KEY,
            subject TEXT NOT NULL,
            endpoint_hash TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_relay_messages_subject ON relay_messages(subject);
        CREATE INDEX IF NOT EXISTS idx_relay_messages_endpoint ON relay_messages(endpoint_hash);
        CREATE INDEX IF NOT EXISTS idx_relay_messages_status ON relay_messages(status);
        CREATE INDEX IF NOT EXISTS idx_relay_messages_expires ON relay_messages(expires_at);",
    )
}
