//! SQLite storage session.
//!
//! Persists current state, history rows, lookup ids and filter rules to a
//! single SQLite file. Writes are staged in memory and applied inside one
//! `sqlx` transaction at commit.
//!
//! # Usage
//! ```rust,no_run
//! use ledgerindex_storage::sqlite::SqliteSession;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let session = SqliteSession::open("./ledgers.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let session = SqliteSession::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::session::{
    FilterRule, FilterRules, HistoryRow, HistoryTable, LookupKind, StateRow, StateTable,
    StorageSession,
};

use crate::pending::PendingBatch;

/// Max bound parameters per `IN (...)` query.
const IN_CHUNK: usize = 500;

fn storage_err(e: impl std::fmt::Display) -> IngestError {
    IngestError::Storage(e.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// SQLite-backed storage session.
pub struct SqliteSession {
    pool: SqlitePool,
    pending: Mutex<PendingBatch>,
}

impl SqliteSession {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./ledgers.db"`) or a full
    /// SQLite URL (`"sqlite:./ledgers.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IngestError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let session = Self {
            pool,
            pending: Mutex::new(PendingBatch::default()),
        };
        session.init_schema().await?;
        Ok(session)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Single connection: every connection of `sqlite::memory:` is its own
    /// database.
    pub async fn in_memory() -> Result<Self, IngestError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let session = Self {
            pool,
            pending: Mutex::new(PendingBatch::default()),
        };
        session.init_schema().await?;
        Ok(session)
    }

    fn pending(&self) -> MutexGuard<'_, PendingBatch> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn init_schema(&self) -> Result<(), IngestError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        let statements = [
            "CREATE TABLE IF NOT EXISTS state_entries (
                tbl   TEXT NOT NULL,
                key   TEXT NOT NULL,
                body  TEXT NOT NULL,
                PRIMARY KEY (tbl, key)
            );",
            "CREATE TABLE IF NOT EXISTS history_rows (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                tbl             TEXT    NOT NULL,
                ledger_sequence INTEGER NOT NULL,
                body            TEXT    NOT NULL,
                created_at      INTEGER NOT NULL
            );",
            "CREATE INDEX IF NOT EXISTS idx_history_tbl ON history_rows (tbl, created_at);",
            "CREATE TABLE IF NOT EXISTS history_lookups (
                kind  TEXT    NOT NULL,
                key   TEXT    NOT NULL,
                id    INTEGER NOT NULL,
                PRIMARY KEY (kind, key)
            );",
            "CREATE TABLE IF NOT EXISTS filter_rules (
                kind  TEXT PRIMARY KEY,
                body  TEXT NOT NULL
            );",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    // ─── Operator / inspection helpers ───────────────────────────────────────

    /// Store the ingestion filter rules.
    pub async fn set_filter_rules(&self, rules: &FilterRules) -> Result<(), IngestError> {
        for (kind, rule) in [("asset", &rules.asset), ("account", &rules.account)] {
            let body = serde_json::to_string(rule).map_err(storage_err)?;
            sqlx::query("INSERT OR REPLACE INTO filter_rules (kind, body) VALUES (?, ?)")
                .bind(kind)
                .bind(body)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Committed rows of a history table, in insertion order.
    pub async fn history(&self, table: HistoryTable) -> Result<Vec<HistoryRow>, IngestError> {
        let rows = sqlx::query(
            "SELECT ledger_sequence, body FROM history_rows WHERE tbl = ? ORDER BY id",
        )
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter()
            .map(|r| {
                let body: String = r.get("body");
                Ok(HistoryRow {
                    ledger_sequence: r.get::<i64, _>("ledger_sequence") as u32,
                    body: serde_json::from_str(&body).map_err(storage_err)?,
                })
            })
            .collect()
    }

    pub async fn history_count(&self, table: HistoryTable) -> Result<u64, IngestError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM history_rows WHERE tbl = ?")
            .bind(table.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    pub async fn state_count(&self, table: StateTable) -> Result<u64, IngestError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM state_entries WHERE tbl = ?")
            .bind(table.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn committed_state(
        &self,
        table: StateTable,
        keys: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, IngestError> {
        let mut out = HashMap::new();
        for chunk in keys.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT key, body FROM state_entries WHERE tbl = ? AND key IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(table.as_str());
            for key in chunk {
                query = query.bind(key);
            }
            for row in query.fetch_all(&self.pool).await.map_err(storage_err)? {
                let body: String = row.get("body");
                out.insert(
                    row.get::<String, _>("key"),
                    serde_json::from_str(&body).map_err(storage_err)?,
                );
            }
        }
        Ok(out)
    }

    async fn committed_ids(
        &self,
        kind: LookupKind,
        keys: &[String],
    ) -> Result<HashMap<String, i64>, IngestError> {
        let mut out = HashMap::new();
        for chunk in keys.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT key, id FROM history_lookups WHERE kind = ? AND key IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(kind.as_str());
            for key in chunk {
                query = query.bind(key);
            }
            for row in query.fetch_all(&self.pool).await.map_err(storage_err)? {
                out.insert(row.get::<String, _>("key"), row.get::<i64, _>("id"));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageSession for SqliteSession {
    async fn upsert_state(&self, table: StateTable, rows: Vec<StateRow>) -> Result<(), IngestError> {
        let mut pending = self.pending();
        for row in rows {
            pending.upsert(table, row.key, row.body);
        }
        Ok(())
    }

    async fn remove_state(&self, table: StateTable, keys: Vec<String>) -> Result<(), IngestError> {
        let mut pending = self.pending();
        for key in keys {
            pending.remove(table, key);
        }
        Ok(())
    }

    async fn load_state(
        &self,
        table: StateTable,
        keys: Vec<String>,
    ) -> Result<HashMap<String, serde_json::Value>, IngestError> {
        let mut out = HashMap::new();
        let mut missing = Vec::new();
        {
            let pending = self.pending();
            for key in keys {
                match pending.state_of(table, &key) {
                    Some(Some(body)) => {
                        out.insert(key, body.clone());
                    }
                    Some(None) => {}
                    None => missing.push(key),
                }
            }
        }
        if !missing.is_empty() {
            out.extend(self.committed_state(table, &missing).await?);
        }
        Ok(out)
    }

    async fn insert_history(&self, table: HistoryTable, rows: Vec<HistoryRow>) -> Result<(), IngestError> {
        self.pending().push_history(table, rows);
        Ok(())
    }

    async fn resolve_ids(
        &self,
        kind: LookupKind,
        keys: Vec<String>,
    ) -> Result<HashMap<String, i64>, IngestError> {
        let committed = self.committed_ids(kind, &keys).await?;
        let max_row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS max_id FROM history_lookups WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let committed_max: i64 = max_row.get("max_id");

        let mut pending = self.pending();
        let mut next = committed_max.max(pending.max_lookup_id(kind)) + 1;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let existing = committed
                .get(&key)
                .copied()
                .or_else(|| pending.lookup(kind, &key));
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = next;
                    next += 1;
                    pending.assign(kind, key.clone(), id);
                    id
                }
            };
            out.insert(key, id);
        }
        Ok(out)
    }

    async fn commit(&self) -> Result<(), IngestError> {
        let batch = self.pending().take();
        if batch.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let (states, history) = (batch.state.len(), batch.history.len());

        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for ((table, key), value) in batch.state {
            match value {
                Some(body) => {
                    let body = serde_json::to_string(&body).map_err(storage_err)?;
                    sqlx::query("INSERT OR REPLACE INTO state_entries (tbl, key, body) VALUES (?, ?, ?)")
                        .bind(table.as_str())
                        .bind(key)
                        .bind(body)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_err)?;
                }
                None => {
                    sqlx::query("DELETE FROM state_entries WHERE tbl = ? AND key = ?")
                        .bind(table.as_str())
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_err)?;
                }
            }
        }
        for (table, row) in batch.history {
            let body = serde_json::to_string(&row.body).map_err(storage_err)?;
            sqlx::query(
                "INSERT INTO history_rows (tbl, ledger_sequence, body, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(table.as_str())
            .bind(row.ledger_sequence as i64)
            .bind(body)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }
        for (kind, ids) in batch.lookups {
            for (key, id) in ids {
                sqlx::query("INSERT OR IGNORE INTO history_lookups (kind, key, id) VALUES (?, ?, ?)")
                    .bind(kind.as_str())
                    .bind(key)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_err)?;
            }
        }
        tx.commit().await.map_err(storage_err)?;

        debug!(states, history, "sqlite session committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), IngestError> {
        self.pending().take();
        Ok(())
    }

    async fn delete_filtered_transactions_older_than(&self, age: Duration) -> Result<u64, IngestError> {
        let cutoff = chrono::Utc::now().timestamp() - age.as_secs() as i64;
        let result = sqlx::query("DELETE FROM history_rows WHERE tbl = ? AND created_at < ?")
            .bind(HistoryTable::TransactionsFilteredTmp.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn filter_rules(&self) -> Result<FilterRules, IngestError> {
        let rows = sqlx::query("SELECT kind, body FROM filter_rules")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        let mut rules = FilterRules::default();
        for row in rows {
            let body: String = row.get("body");
            let rule: FilterRule = serde_json::from_str(&body).map_err(storage_err)?;
            match row.get::<String, _>("kind").as_str() {
                "asset" => rules.asset = rule,
                "account" => rules.account = rule,
                _ => {}
            }
        }
        Ok(rules)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn commit_persists_state_and_history() {
        let session = SqliteSession::in_memory().await.unwrap();
        session
            .upsert_state(
                StateTable::Offers,
                vec![StateRow {
                    key: "42".into(),
                    body: json!({"amount": 100}),
                }],
            )
            .await
            .unwrap();
        session
            .insert_history(
                HistoryTable::Ledgers,
                vec![HistoryRow {
                    ledger_sequence: 7,
                    body: json!({"sequence": 7}),
                }],
            )
            .await
            .unwrap();
        assert_eq!(session.history_count(HistoryTable::Ledgers).await.unwrap(), 0);

        session.commit().await.unwrap();
        assert_eq!(session.history_count(HistoryTable::Ledgers).await.unwrap(), 1);
        assert_eq!(session.state_count(StateTable::Offers).await.unwrap(), 1);

        let loaded = session
            .load_state(StateTable::Offers, vec!["42".into(), "43".into()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["42"], json!({"amount": 100}));
    }

    #[tokio::test]
    async fn rollback_leaves_database_untouched() {
        let session = SqliteSession::in_memory().await.unwrap();
        session
            .insert_history(
                HistoryTable::Effects,
                vec![HistoryRow {
                    ledger_sequence: 1,
                    body: json!({}),
                }],
            )
            .await
            .unwrap();
        session.rollback().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(session.history_count(HistoryTable::Effects).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ids_survive_commit() {
        let session = SqliteSession::in_memory().await.unwrap();
        let first = session
            .resolve_ids(LookupKind::Asset, vec!["native".into()])
            .await
            .unwrap();
        session.commit().await.unwrap();
        let second = session
            .resolve_ids(LookupKind::Asset, vec!["native".into(), "USD:GI".into()])
            .await
            .unwrap();
        assert_eq!(first["native"], second["native"]);
        assert_eq!(second["USD:GI"], first["native"] + 1);
    }

    #[tokio::test]
    async fn filter_rules_roundtrip() {
        let session = SqliteSession::in_memory().await.unwrap();
        assert_eq!(session.filter_rules().await.unwrap(), FilterRules::default());

        let rules = FilterRules {
            asset: FilterRule {
                enabled: true,
                whitelist: vec!["USD:GI".into()],
                last_modified: 10,
            },
            account: FilterRule::default(),
        };
        session.set_filter_rules(&rules).await.unwrap();
        assert_eq!(session.filter_rules().await.unwrap(), rules);
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_rows() {
        let session = SqliteSession::in_memory().await.unwrap();
        session
            .insert_history(
                HistoryTable::TransactionsFilteredTmp,
                vec![HistoryRow {
                    ledger_sequence: 3,
                    body: json!({}),
                }],
            )
            .await
            .unwrap();
        session.commit().await.unwrap();

        let deleted = session
            .delete_filtered_transactions_older_than(Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(
            session.history_count(HistoryTable::TransactionsFilteredTmp).await.unwrap(),
            1
        );
    }
}
