//! Which transactions and operations touched which liquidity pools.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::loader::Loader;
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, LedgerEntryKind, Operation, OperationBody, Transaction};

use crate::links::LinkBuffer;
use crate::toid::{operation_id, transaction_id};

/// Pools an operation touched: deposit/withdraw targets and pools crossed
/// by its trades.
fn operation_pools(op: &Operation) -> BTreeSet<String> {
    let mut pools: BTreeSet<String> = op
        .claims
        .iter()
        .filter_map(|c| c.liquidity_pool_id.clone())
        .collect();
    match &op.body {
        OperationBody::LiquidityPoolDeposit {
            liquidity_pool_id, ..
        }
        | OperationBody::LiquidityPoolWithdraw {
            liquidity_pool_id, ..
        } => {
            pools.insert(liquidity_pool_id.clone());
        }
        _ => {}
    }
    pools
}

pub struct LiquidityPoolsTransactionProcessor {
    links: LinkBuffer,
}

impl LiquidityPoolsTransactionProcessor {
    pub fn new(pools: Arc<Loader>) -> Self {
        Self {
            links: LinkBuffer::new(
                pools,
                HistoryTable::TransactionLiquidityPools,
                HistoryTable::OperationLiquidityPools,
                "history_liquidity_pool_id",
            ),
        }
    }
}

#[async_trait]
impl TransactionProcessor for LiquidityPoolsTransactionProcessor {
    fn name(&self) -> &str {
        "liquidity_pools_transaction_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        let seq = ledger.sequence();
        let mut in_tx: BTreeSet<String> = tx
            .meta_changes
            .iter()
            .filter(|c| c.kind == LedgerEntryKind::LiquidityPool)
            .filter_map(|c| c.key())
            .collect();

        for (i, op) in tx.operations.iter().enumerate() {
            for pool in operation_pools(op) {
                self.links
                    .operation(seq, operation_id(seq, tx.index, i), &pool)?;
                in_tx.insert(pool);
            }
        }
        for pool in &in_tx {
            self.links
                .transaction(seq, transaction_id(seq, tx.index), pool)?;
        }
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        self.links.flush(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ledger, tx};
    use ledgerindex_core::loader::LazyLoader;
    use ledgerindex_core::session::LookupKind;
    use ledgerindex_storage::InMemorySession;

    #[tokio::test]
    async fn deposit_links_pool_to_operation_and_transaction() {
        let session = InMemorySession::new();
        let loader = Loader::new(LookupKind::LiquidityPool);
        let mut p = LiquidityPoolsTransactionProcessor::new(loader.clone());

        let mut t = tx(2, true);
        t.operations.push(Operation {
            source_account: None,
            body: OperationBody::LiquidityPoolDeposit {
                liquidity_pool_id: "pool1".into(),
                max_amount_a: 10,
                max_amount_b: 10,
            },
            claims: vec![],
        });
        let l = ledger(12, vec![tx(1, true), t.clone()]);

        p.process_transaction(&l, &t).await.unwrap();
        loader.exec(&session).await.unwrap();
        p.flush(&session).await.unwrap();
        session.commit().await.unwrap();

        let tx_rows = session.history(HistoryTable::TransactionLiquidityPools);
        assert_eq!(tx_rows.len(), 1);
        assert_eq!(tx_rows[0].body["history_transaction_id"], transaction_id(12, 2));
        assert_eq!(session.history_count(HistoryTable::OperationLiquidityPools), 1);
    }

    #[tokio::test]
    async fn untouched_transaction_has_no_rows() {
        let session = InMemorySession::new();
        let loader = Loader::new(LookupKind::LiquidityPool);
        let mut p = LiquidityPoolsTransactionProcessor::new(loader.clone());
        let t = tx(1, true);
        p.process_transaction(&ledger(12, vec![t.clone()]), &t).await.unwrap();
        loader.exec(&session).await.unwrap();
        p.flush(&session).await.unwrap();
        assert!(session.pending_is_empty());
    }
}
