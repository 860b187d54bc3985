//! `history_transactions` and `history_operations` rows.

use async_trait::async_trait;
use serde::Serialize;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, Hash, Transaction};

use crate::toid::{operation_id, transaction_id};

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub transaction_hash: Hash,
    pub ledger_sequence: u32,
    pub application_order: u32,
    pub account: String,
    pub fee_account: Option<String>,
    pub fee_charged: i64,
    pub max_fee: i64,
    pub operation_count: u32,
    pub successful: bool,
    pub memo: Option<String>,
}

impl TransactionRecord {
    pub fn new(ledger: &ClosedLedger, tx: &Transaction) -> Self {
        Self {
            id: transaction_id(ledger.sequence(), tx.index),
            transaction_hash: tx.hash,
            ledger_sequence: ledger.sequence(),
            application_order: tx.index,
            account: tx.source_account.clone(),
            fee_account: tx.fee_account.clone(),
            fee_charged: tx.fee_charged,
            max_fee: tx.max_fee,
            operation_count: tx.operations.len() as u32,
            successful: tx.successful,
            memo: tx.memo.clone(),
        }
    }
}

/// Buffers one row per transaction.
#[derive(Default)]
pub struct TransactionsProcessor {
    rows: Vec<HistoryRow>,
}

impl TransactionsProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionProcessor for TransactionsProcessor {
    fn name(&self) -> &str {
        "transactions_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        let record = TransactionRecord::new(ledger, tx);
        self.rows.push(HistoryRow::from_record(ledger.sequence(), &record)?);
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        session
            .insert_history(HistoryTable::Transactions, std::mem::take(&mut self.rows))
            .await
    }
}

#[derive(Debug, Clone, Serialize)]
struct OperationRecord<'a> {
    id: i64,
    transaction_id: i64,
    application_order: u32,
    #[serde(rename = "type")]
    kind: &'static str,
    source_account: &'a str,
    transaction_successful: bool,
    details: serde_json::Value,
}

/// Buffers one row per operation, failed transactions included.
#[derive(Default)]
pub struct OperationsProcessor {
    rows: Vec<HistoryRow>,
}

impl OperationsProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionProcessor for OperationsProcessor {
    fn name(&self) -> &str {
        "operations_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        let seq = ledger.sequence();
        for (i, op) in tx.operations.iter().enumerate() {
            let record = OperationRecord {
                id: operation_id(seq, tx.index, i),
                transaction_id: transaction_id(seq, tx.index),
                application_order: i as u32 + 1,
                kind: op.body.type_name(),
                source_account: tx.operation_source(op),
                transaction_successful: tx.successful,
                details: serde_json::to_value(&op.body)
                    .map_err(|e| IngestError::Storage(e.to_string()))?,
            };
            self.rows.push(HistoryRow::from_record(seq, &record)?);
        }
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        session
            .insert_history(HistoryTable::Operations, std::mem::take(&mut self.rows))
            .await
    }
}
