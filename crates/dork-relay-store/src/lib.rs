//! Durable envelope persistence for the Relay: a maildir as the write-path
//! source of truth, and a SQLite secondary index for queries the filesystem
//! can't answer cheaply.

pub mod index;
pub mod maildir;

pub use index::{ensure_schema, IndexMetrics, IndexedMessage, MessageIndex, MessageQuery, MessagePage, MessageStatus};
pub use maildir::{DeliverOutcome, MaildirStore};
