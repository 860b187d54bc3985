//! The `history_ledgers` row of every processed ledger.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, Hash, Transaction};

use crate::toid::toid;

#[derive(Debug, Clone, Serialize)]
pub struct LedgerRecord {
    pub id: i64,
    pub sequence: u32,
    pub ledger_hash: Hash,
    pub previous_ledger_hash: Hash,
    pub closed_at: i64,
    pub successful_transaction_count: u32,
    pub failed_transaction_count: u32,
    pub operation_count: u32,
    pub tx_set_operation_count: u32,
    pub total_coins: i64,
    pub fee_pool: i64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub max_tx_set_size: u32,
    pub protocol_version: u32,
    pub ingest_version: u32,
}

impl LedgerRecord {
    fn from_ledger(ledger: &ClosedLedger, ingest_version: u32) -> Self {
        let h = &ledger.header;
        Self {
            id: toid(h.sequence, 0, 0),
            sequence: h.sequence,
            ledger_hash: h.hash,
            previous_ledger_hash: h.previous_hash,
            closed_at: h.close_time,
            successful_transaction_count: ledger.successful_transaction_count() as u32,
            failed_transaction_count: ledger.failed_transaction_count() as u32,
            operation_count: ledger.operation_count() as u32,
            tx_set_operation_count: ledger
                .transactions
                .iter()
                .map(|t| t.operations.len() as u32)
                .sum(),
            total_coins: h.total_coins,
            fee_pool: h.fee_pool,
            base_fee: h.base_fee,
            base_reserve: h.base_reserve,
            max_tx_set_size: h.max_tx_set_size,
            protocol_version: h.protocol_version,
            ingest_version,
        }
    }
}

/// Buffers one ledger row per ledger and stages them on flush.
///
/// The runner calls [`process_ledger`](Self::process_ledger) directly before
/// streaming, so a ledger with no transactions still gets its row.
pub struct LedgersProcessor {
    ingest_version: u32,
    ledgers: BTreeMap<u32, LedgerRecord>,
}

impl LedgersProcessor {
    pub fn new(ingest_version: u32) -> Self {
        Self {
            ingest_version,
            ledgers: BTreeMap::new(),
        }
    }

    pub fn process_ledger(&mut self, ledger: &ClosedLedger) {
        let ingest_version = self.ingest_version;
        self.ledgers
            .entry(ledger.sequence())
            .or_insert_with(|| LedgerRecord::from_ledger(ledger, ingest_version));
    }

    /// Ledgers buffered and not flushed yet.
    pub fn pending_ledgers(&self) -> usize {
        self.ledgers.len()
    }
}

#[async_trait]
impl TransactionProcessor for LedgersProcessor {
    fn name(&self) -> &str {
        "ledgers_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        _tx: &Transaction,
    ) -> Result<(), IngestError> {
        self.process_ledger(ledger);
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        let rows = std::mem::take(&mut self.ledgers)
            .into_values()
            .map(|record| HistoryRow::from_record(record.sequence, &record))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(ledgers = rows.len(), "staging ledger rows");
        if rows.is_empty() {
            return Ok(());
        }
        session.insert_history(HistoryTable::Ledgers, rows).await
    }
}
