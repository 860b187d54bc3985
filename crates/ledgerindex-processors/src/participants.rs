//! Transaction and operation participants: which accounts took part in what.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::loader::{Loader, LoaderFuture};
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, Transaction};

use crate::toid::{operation_id, transaction_id};

struct Participant {
    ledger_sequence: u32,
    table: HistoryTable,
    /// Transaction or operation id.
    history_id: i64,
    account: LoaderFuture,
}

#[derive(Serialize)]
struct ParticipantRecord {
    history_id: i64,
    history_account_id: i64,
}

pub struct ParticipantsProcessor {
    accounts: Arc<Loader>,
    pending: Vec<Participant>,
}

impl ParticipantsProcessor {
    pub fn new(accounts: Arc<Loader>) -> Self {
        Self {
            accounts,
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl TransactionProcessor for ParticipantsProcessor {
    fn name(&self) -> &str {
        "participants_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        let seq = ledger.sequence();
        let tx_id = transaction_id(seq, tx.index);
        for account in tx.participants() {
            self.pending.push(Participant {
                ledger_sequence: seq,
                table: HistoryTable::TransactionParticipants,
                history_id: tx_id,
                account: self.accounts.get_future(account)?,
            });
        }

        for (i, op) in tx.operations.iter().enumerate() {
            let mut accounts = vec![tx.operation_source(op)];
            accounts.extend(op.body.accounts());
            let mut seen = HashSet::new();
            accounts.retain(|a| seen.insert(*a));
            for account in accounts {
                self.pending.push(Participant {
                    ledger_sequence: seq,
                    table: HistoryTable::OperationParticipants,
                    history_id: operation_id(seq, tx.index, i),
                    account: self.accounts.get_future(account)?,
                });
            }
        }
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut tx_rows = Vec::new();
        let mut op_rows = Vec::new();
        for p in std::mem::take(&mut self.pending) {
            let record = ParticipantRecord {
                history_id: p.history_id,
                history_account_id: p.account.value()?,
            };
            let row = HistoryRow::from_record(p.ledger_sequence, &record)?;
            match p.table {
                HistoryTable::OperationParticipants => op_rows.push(row),
                _ => tx_rows.push(row),
            }
        }
        if !tx_rows.is_empty() {
            session
                .insert_history(HistoryTable::TransactionParticipants, tx_rows)
                .await?;
        }
        if !op_rows.is_empty() {
            session
                .insert_history(HistoryTable::OperationParticipants, op_rows)
                .await?;
        }
        Ok(())
    }
}
