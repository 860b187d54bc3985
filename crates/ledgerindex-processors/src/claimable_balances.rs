//! Which transactions and operations touched which claimable balances.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::loader::Loader;
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, LedgerEntryKind, OperationBody, Transaction};

use crate::links::LinkBuffer;
use crate::toid::{operation_id, transaction_id};

pub struct ClaimableBalancesTransactionProcessor {
    links: LinkBuffer,
}

impl ClaimableBalancesTransactionProcessor {
    pub fn new(balances: Arc<Loader>) -> Self {
        Self {
            links: LinkBuffer::new(
                balances,
                HistoryTable::TransactionClaimableBalances,
                HistoryTable::OperationClaimableBalances,
                "history_claimable_balance_id",
            ),
        }
    }
}

#[async_trait]
impl TransactionProcessor for ClaimableBalancesTransactionProcessor {
    fn name(&self) -> &str {
        "claimable_balances_transaction_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        let seq = ledger.sequence();

        // Balances created by the transaction are only visible in its meta;
        // hand them to the create operations in order.
        let mut created = tx
            .meta_changes
            .iter()
            .filter(|c| c.kind == LedgerEntryKind::ClaimableBalance && c.pre.is_none())
            .filter_map(|c| c.key());

        let mut in_tx = BTreeSet::new();
        for c in &tx.meta_changes {
            if c.kind == LedgerEntryKind::ClaimableBalance {
                if let Some(key) = c.key() {
                    in_tx.insert(key);
                }
            }
        }

        for (i, op) in tx.operations.iter().enumerate() {
            let balance = match &op.body {
                OperationBody::ClaimClaimableBalance { balance_id }
                | OperationBody::ClawbackClaimableBalance { balance_id } => Some(balance_id.clone()),
                OperationBody::CreateClaimableBalance { .. } => created.next(),
                _ => None,
            };
            if let Some(balance) = balance {
                in_tx.insert(balance.clone());
                self.links
                    .operation(seq, operation_id(seq, tx.index, i), &balance)?;
            }
        }
        for balance in &in_tx {
            self.links
                .transaction(seq, transaction_id(seq, tx.index), balance)?;
        }
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        self.links.flush(session).await
    }
}
