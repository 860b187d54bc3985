//! In-memory storage session.
//!
//! Keeps committed state, history rows and lookup ids in RAM. Useful for
//! testing and short-lived ingestion runs that don't need persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::session::{
    FilterRules, HistoryRow, HistoryTable, LookupKind, StateRow, StateTable, StorageSession,
};

use crate::pending::PendingBatch;

#[derive(Debug, Clone)]
struct StoredRow {
    row: HistoryRow,
    created_at: i64,
}

#[derive(Default)]
struct Inner {
    pending: PendingBatch,
    state: HashMap<StateTable, BTreeMap<String, serde_json::Value>>,
    history: HashMap<HistoryTable, Vec<StoredRow>>,
    lookups: HashMap<LookupKind, HashMap<String, i64>>,
    filter_rules: FilterRules,
    fail_next_commit: bool,
    fail_sweeps: bool,
}

/// In-memory storage session.
///
/// All data is lost when the session is dropped.
#[derive(Default)]
pub struct InMemorySession {
    inner: Mutex<Inner>,
    commits: AtomicU32,
    rollbacks: AtomicU32,
    sweeps: AtomicU32,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the stored ingestion filter rules.
    pub fn set_filter_rules(&self, rules: FilterRules) {
        self.lock().filter_rules = rules;
    }

    /// Make the next `commit` fail (the pending batch is discarded).
    pub fn fail_next_commit(&self) {
        self.lock().fail_next_commit = true;
    }

    /// Make every filtered-tmp sweep fail.
    pub fn fail_sweeps(&self, fail: bool) {
        self.lock().fail_sweeps = fail;
    }

    /// Committed rows of a history table, in insertion order.
    pub fn history(&self, table: HistoryTable) -> Vec<HistoryRow> {
        self.lock()
            .history
            .get(&table)
            .map(|rows| rows.iter().map(|r| r.row.clone()).collect())
            .unwrap_or_default()
    }

    pub fn history_count(&self, table: HistoryTable) -> usize {
        self.lock().history.get(&table).map_or(0, Vec::len)
    }

    /// A committed current-state row.
    pub fn state(&self, table: StateTable, key: &str) -> Option<serde_json::Value> {
        self.lock()
            .state
            .get(&table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    pub fn state_count(&self, table: StateTable) -> usize {
        self.lock().state.get(&table).map_or(0, BTreeMap::len)
    }

    /// A committed lookup id.
    pub fn lookup_id(&self, kind: LookupKind, key: &str) -> Option<i64> {
        self.lock().lookups.get(&kind).and_then(|m| m.get(key)).copied()
    }

    /// `true` if nothing is staged.
    pub fn pending_is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Successful commits so far.
    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Filtered-tmp sweeps attempted so far (failed ones included).
    pub fn sweeps(&self) -> u32 {
        self.sweeps.load(Ordering::SeqCst)
    }

    /// Shift the insertion time of every filtered-tmp row back by `by`.
    pub fn age_filtered_transactions(&self, by: Duration) {
        let secs = by.as_secs() as i64;
        if let Some(rows) = self.lock().history.get_mut(&HistoryTable::TransactionsFilteredTmp) {
            for row in rows.iter_mut() {
                row.created_at -= secs;
            }
        }
    }
}

#[async_trait]
impl StorageSession for InMemorySession {
    async fn upsert_state(&self, table: StateTable, rows: Vec<StateRow>) -> Result<(), IngestError> {
        let mut inner = self.lock();
        for row in rows {
            inner.pending.upsert(table, row.key, row.body);
        }
        Ok(())
    }

    async fn remove_state(&self, table: StateTable, keys: Vec<String>) -> Result<(), IngestError> {
        let mut inner = self.lock();
        for key in keys {
            inner.pending.remove(table, key);
        }
        Ok(())
    }

    async fn load_state(
        &self,
        table: StateTable,
        keys: Vec<String>,
    ) -> Result<HashMap<String, serde_json::Value>, IngestError> {
        let inner = self.lock();
        let mut out = HashMap::new();
        for key in keys {
            let value = match inner.pending.state_of(table, &key) {
                Some(pending) => pending.cloned(),
                None => inner.state.get(&table).and_then(|rows| rows.get(&key)).cloned(),
            };
            if let Some(value) = value {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    async fn insert_history(&self, table: HistoryTable, rows: Vec<HistoryRow>) -> Result<(), IngestError> {
        self.lock().pending.push_history(table, rows);
        Ok(())
    }

    async fn resolve_ids(
        &self,
        kind: LookupKind,
        keys: Vec<String>,
    ) -> Result<HashMap<String, i64>, IngestError> {
        let mut inner = self.lock();
        let committed_max = inner
            .lookups
            .get(&kind)
            .and_then(|m| m.values().max().copied())
            .unwrap_or(0);
        let mut next = committed_max.max(inner.pending.max_lookup_id(kind)) + 1;

        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let existing = inner
                .lookups
                .get(&kind)
                .and_then(|m| m.get(&key))
                .copied()
                .or_else(|| inner.pending.lookup(kind, &key));
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = next;
                    next += 1;
                    inner.pending.assign(kind, key.clone(), id);
                    id
                }
            };
            out.insert(key, id);
        }
        Ok(out)
    }

    async fn commit(&self) -> Result<(), IngestError> {
        let mut inner = self.lock();
        let batch = inner.pending.take();
        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            return Err(IngestError::Storage("injected commit failure".into()));
        }

        let now = chrono::Utc::now().timestamp();
        let (states, history) = (batch.state.len(), batch.history.len());
        for ((table, key), value) in batch.state {
            let rows = inner.state.entry(table).or_default();
            match value {
                Some(body) => {
                    rows.insert(key, body);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        for (table, row) in batch.history {
            inner
                .history
                .entry(table)
                .or_default()
                .push(StoredRow { row, created_at: now });
        }
        for (kind, ids) in batch.lookups {
            inner.lookups.entry(kind).or_default().extend(ids);
        }
        drop(inner);

        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(states, history, "in-memory session committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), IngestError> {
        self.lock().pending.take();
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_filtered_transactions_older_than(&self, age: Duration) -> Result<u64, IngestError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if inner.fail_sweeps {
            return Err(IngestError::Storage("injected sweep failure".into()));
        }
        let cutoff = chrono::Utc::now().timestamp() - age.as_secs() as i64;
        let Some(rows) = inner.history.get_mut(&HistoryTable::TransactionsFilteredTmp) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| r.created_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    async fn filter_rules(&self) -> Result<FilterRules, IngestError> {
        Ok(self.lock().filter_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(seq: u32) -> HistoryRow {
        HistoryRow {
            ledger_sequence: seq,
            body: json!({ "sequence": seq }),
        }
    }

    #[tokio::test]
    async fn nothing_visible_before_commit() {
        let session = InMemorySession::new();
        session
            .upsert_state(
                StateTable::Accounts,
                vec![StateRow {
                    key: "GA".into(),
                    body: json!({"balance": 10}),
                }],
            )
            .await
            .unwrap();
        session.insert_history(HistoryTable::Ledgers, vec![row(5)]).await.unwrap();

        assert!(session.state(StateTable::Accounts, "GA").is_none());
        assert_eq!(session.history_count(HistoryTable::Ledgers), 0);

        session.commit().await.unwrap();
        assert_eq!(session.state(StateTable::Accounts, "GA"), Some(json!({"balance": 10})));
        assert_eq!(session.history(HistoryTable::Ledgers), vec![row(5)]);
        assert_eq!(session.commits(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_pending() {
        let session = InMemorySession::new();
        session.insert_history(HistoryTable::Trades, vec![row(1)]).await.unwrap();
        session.rollback().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(session.history_count(HistoryTable::Trades), 0);
        assert!(session.pending_is_empty());
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let session = InMemorySession::new();
        session.insert_history(HistoryTable::Ledgers, vec![row(1)]).await.unwrap();
        session.fail_next_commit();
        assert!(session.commit().await.is_err());
        assert_eq!(session.history_count(HistoryTable::Ledgers), 0);
        assert_eq!(session.commits(), 0);
        assert!(session.pending_is_empty());
    }

    #[tokio::test]
    async fn load_state_sees_pending_writes_and_removals() {
        let session = InMemorySession::new();
        session
            .upsert_state(
                StateTable::AssetStats,
                vec![StateRow {
                    key: "USD:GI".into(),
                    body: json!({"accounts": 1}),
                }],
            )
            .await
            .unwrap();
        session.commit().await.unwrap();
        session
            .remove_state(StateTable::AssetStats, vec!["USD:GI".into()])
            .await
            .unwrap();

        let loaded = session
            .load_state(StateTable::AssetStats, vec!["USD:GI".into()])
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn resolve_ids_is_stable_across_commits() {
        let session = InMemorySession::new();
        let first = session
            .resolve_ids(LookupKind::Account, vec!["GA".into(), "GB".into()])
            .await
            .unwrap();
        session.commit().await.unwrap();
        let second = session
            .resolve_ids(LookupKind::Account, vec!["GB".into(), "GC".into()])
            .await
            .unwrap();

        assert_eq!(first["GB"], second["GB"]);
        assert_eq!(second["GC"], 3);
        assert_eq!(session.lookup_id(LookupKind::Account, "GA"), Some(first["GA"]));
    }

    #[tokio::test]
    async fn sweep_deletes_only_old_filtered_rows() {
        let session = InMemorySession::new();
        session
            .insert_history(HistoryTable::TransactionsFilteredTmp, vec![row(1), row(2)])
            .await
            .unwrap();
        session.commit().await.unwrap();
        session.age_filtered_transactions(Duration::from_secs(600));
        session
            .insert_history(HistoryTable::TransactionsFilteredTmp, vec![row(3)])
            .await
            .unwrap();
        session.commit().await.unwrap();

        let deleted = session
            .delete_filtered_transactions_older_than(Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(session.history(HistoryTable::TransactionsFilteredTmp), vec![row(3)]);
        assert_eq!(session.sweeps(), 1);
    }
}
