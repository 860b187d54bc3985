//! ledgerindex-storage — storage sessions for LedgerIndex.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)

pub mod memory;
mod pending;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemorySession;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSession;
