//! Test fixtures shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::session::{
    FilterRules, HistoryRow, HistoryTable, LookupKind, StateRow, StateTable, StorageSession,
};
use crate::types::{ClosedLedger, Hash, LedgerHeader, Transaction};

/// A session that only counts calls and hands out sequential ids.
#[derive(Default)]
pub struct RecordingSession {
    commits: AtomicU32,
    resolve_calls: AtomicU32,
    ids: Mutex<HashMap<(LookupKind, String), i64>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> u32 {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSession for RecordingSession {
    async fn upsert_state(&self, _t: StateTable, _r: Vec<StateRow>) -> Result<(), IngestError> {
        Ok(())
    }

    async fn remove_state(&self, _t: StateTable, _k: Vec<String>) -> Result<(), IngestError> {
        Ok(())
    }

    async fn load_state(
        &self,
        _t: StateTable,
        _k: Vec<String>,
    ) -> Result<HashMap<String, serde_json::Value>, IngestError> {
        Ok(HashMap::new())
    }

    async fn insert_history(&self, _t: HistoryTable, _r: Vec<HistoryRow>) -> Result<(), IngestError> {
        Ok(())
    }

    async fn resolve_ids(
        &self,
        kind: LookupKind,
        keys: Vec<String>,
    ) -> Result<HashMap<String, i64>, IngestError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let mut ids = self.ids.lock().unwrap();
        let mut out = HashMap::new();
        for key in keys {
            let next = ids.len() as i64 + 1;
            let id = *ids.entry((kind, key.clone())).or_insert(next);
            out.insert(key, id);
        }
        Ok(out)
    }

    async fn commit(&self) -> Result<(), IngestError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), IngestError> {
        Ok(())
    }

    async fn delete_filtered_transactions_older_than(&self, _a: Duration) -> Result<u64, IngestError> {
        Ok(0)
    }

    async fn filter_rules(&self) -> Result<FilterRules, IngestError> {
        Ok(FilterRules::default())
    }
}

pub fn tx(index: u32, successful: bool) -> Transaction {
    Transaction {
        index,
        hash: Hash::sha256(index.to_be_bytes()),
        source_account: format!("GSRC{index}"),
        fee_account: None,
        fee_charged: 100,
        max_fee: 100,
        successful,
        memo: None,
        operations: vec![],
        fee_changes: vec![],
        meta_changes: vec![],
    }
}

pub fn ledger(sequence: u32, transactions: Vec<Transaction>) -> ClosedLedger {
    ClosedLedger {
        header: LedgerHeader {
            sequence,
            protocol_version: 20,
            close_time: 1_700_000_000,
            hash: Hash::sha256(sequence.to_be_bytes()),
            previous_hash: Hash::sha256((sequence - 1).to_be_bytes()),
            bucket_list_hash: Hash::ZERO,
            total_coins: 0,
            fee_pool: 0,
            base_fee: 100,
            base_reserve: 5_000_000,
            max_tx_set_size: 1000,
        },
        transactions,
        upgrade_changes: vec![],
    }
}
