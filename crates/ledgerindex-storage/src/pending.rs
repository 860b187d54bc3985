//! The pending batch staged by processors between two commits.

use std::collections::HashMap;

use ledgerindex_core::session::{HistoryRow, HistoryTable, LookupKind, StateTable};

/// Writes staged since the last commit.
///
/// State writes are last-write-wins per `(table, key)`; `None` marks a
/// removal. History rows keep their staging order.
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub state: HashMap<(StateTable, String), Option<serde_json::Value>>,
    pub history: Vec<(HistoryTable, HistoryRow)>,
    pub lookups: HashMap<LookupKind, HashMap<String, i64>>,
}

impl PendingBatch {
    pub fn upsert(&mut self, table: StateTable, key: String, body: serde_json::Value) {
        self.state.insert((table, key), Some(body));
    }

    pub fn remove(&mut self, table: StateTable, key: String) {
        self.state.insert((table, key), None);
    }

    /// `Some(None)` if the key has a pending removal, `None` if untouched.
    pub fn state_of(&self, table: StateTable, key: &str) -> Option<Option<&serde_json::Value>> {
        self.state
            .get(&(table, key.to_string()))
            .map(|v| v.as_ref())
    }

    pub fn push_history(&mut self, table: HistoryTable, rows: Vec<HistoryRow>) {
        self.history.extend(rows.into_iter().map(|r| (table, r)));
    }

    pub fn lookup(&self, kind: LookupKind, key: &str) -> Option<i64> {
        self.lookups.get(&kind).and_then(|m| m.get(key)).copied()
    }

    /// Highest id assigned in this batch for `kind`.
    pub fn max_lookup_id(&self, kind: LookupKind) -> i64 {
        self.lookups
            .get(&kind)
            .and_then(|m| m.values().max().copied())
            .unwrap_or(0)
    }

    pub fn assign(&mut self, kind: LookupKind, key: String, id: i64) {
        self.lookups.entry(kind).or_default().insert(key, id);
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty() && self.history.is_empty() && self.lookups.is_empty()
    }

    /// Take everything staged, leaving an empty batch behind.
    pub fn take(&mut self) -> PendingBatch {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_is_last_write_wins() {
        let mut batch = PendingBatch::default();
        batch.upsert(StateTable::Accounts, "GA".into(), json!({"balance": 1}));
        batch.remove(StateTable::Accounts, "GA".into());
        assert_eq!(batch.state_of(StateTable::Accounts, "GA"), Some(None));

        batch.upsert(StateTable::Accounts, "GA".into(), json!({"balance": 2}));
        assert_eq!(
            batch.state_of(StateTable::Accounts, "GA"),
            Some(Some(&json!({"balance": 2})))
        );
        assert_eq!(batch.state_of(StateTable::Offers, "GA"), None);
    }

    #[test]
    fn take_leaves_empty_batch() {
        let mut batch = PendingBatch::default();
        batch.assign(LookupKind::Account, "GA".into(), 4);
        assert_eq!(batch.max_lookup_id(LookupKind::Account), 4);
        let taken = batch.take();
        assert!(batch.is_empty());
        assert!(!taken.is_empty());
    }
}
