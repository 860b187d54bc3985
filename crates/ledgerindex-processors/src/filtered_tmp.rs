//! Rows for transactions dropped by ingestion filtering.
//!
//! They go to a temporary table that the runner sweeps periodically.

use async_trait::async_trait;
use serde::Serialize;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, Hash, Transaction};

use crate::toid::transaction_id;

#[derive(Serialize)]
struct FilteredTransaction {
    id: i64,
    ledger_sequence: u32,
    application_order: u32,
    transaction_hash: Hash,
}

#[derive(Default)]
pub struct FilteredTransactionsProcessor {
    rows: Vec<HistoryRow>,
}

impl FilteredTransactionsProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionProcessor for FilteredTransactionsProcessor {
    fn name(&self) -> &str {
        "filtered_transactions_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        let record = FilteredTransaction {
            id: transaction_id(ledger.sequence(), tx.index),
            ledger_sequence: ledger.sequence(),
            application_order: tx.index,
            transaction_hash: tx.hash,
        };
        self.rows.push(HistoryRow::from_record(ledger.sequence(), &record)?);
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        session
            .insert_history(
                HistoryTable::TransactionsFilteredTmp,
                std::mem::take(&mut self.rows),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ledger, tx};
    use ledgerindex_storage::InMemorySession;

    #[tokio::test]
    async fn stores_sequence_order_and_hash() {
        let session = InMemorySession::new();
        let mut p = FilteredTransactionsProcessor::new();
        let t = tx(2, true);
        p.process_transaction(&ledger(102, vec![tx(1, true), t.clone()]), &t)
            .await
            .unwrap();
        p.flush(&session).await.unwrap();
        session.commit().await.unwrap();

        let rows = session.history(HistoryTable::TransactionsFilteredTmp);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ledger_sequence, 102);
        assert_eq!(rows[0].body["application_order"], 2);
        assert_eq!(rows[0].body["transaction_hash"], t.hash.to_string());
    }
}
