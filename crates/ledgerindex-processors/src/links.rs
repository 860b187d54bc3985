//! Transaction/operation → object link rows, shared by the claimable balance
//! and liquidity pool processors.

use std::sync::Arc;

use serde_json::{Map, Value};

use ledgerindex_core::error::IngestError;
use ledgerindex_core::loader::{Loader, LoaderFuture};
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};

struct Link {
    ledger_sequence: u32,
    on_operation: bool,
    history_id: i64,
    target: LoaderFuture,
}

pub(crate) struct LinkBuffer {
    loader: Arc<Loader>,
    tx_table: HistoryTable,
    op_table: HistoryTable,
    id_field: &'static str,
    pending: Vec<Link>,
}

impl LinkBuffer {
    pub(crate) fn new(
        loader: Arc<Loader>,
        tx_table: HistoryTable,
        op_table: HistoryTable,
        id_field: &'static str,
    ) -> Self {
        Self {
            loader,
            tx_table,
            op_table,
            id_field,
            pending: Vec::new(),
        }
    }

    pub(crate) fn transaction(&mut self, seq: u32, tx_id: i64, key: &str) -> Result<(), IngestError> {
        self.push(seq, false, tx_id, key)
    }

    pub(crate) fn operation(&mut self, seq: u32, op_id: i64, key: &str) -> Result<(), IngestError> {
        self.push(seq, true, op_id, key)
    }

    fn push(&mut self, seq: u32, on_operation: bool, history_id: i64, key: &str) -> Result<(), IngestError> {
        self.pending.push(Link {
            ledger_sequence: seq,
            on_operation,
            history_id,
            target: self.loader.get_future(key)?,
        });
        Ok(())
    }

    pub(crate) async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        let mut tx_rows = Vec::new();
        let mut op_rows = Vec::new();
        for link in std::mem::take(&mut self.pending) {
            let owner = if link.on_operation {
                "history_operation_id"
            } else {
                "history_transaction_id"
            };
            let mut body = Map::new();
            body.insert(owner.to_string(), Value::from(link.history_id));
            body.insert(self.id_field.to_string(), Value::from(link.target.value()?));
            let row = HistoryRow {
                ledger_sequence: link.ledger_sequence,
                body: Value::Object(body),
            };
            if link.on_operation {
                op_rows.push(row);
            } else {
                tx_rows.push(row);
            }
        }
        if !tx_rows.is_empty() {
            session.insert_history(self.tx_table, tx_rows).await?;
        }
        if !op_rows.is_empty() {
            session.insert_history(self.op_table, op_rows).await?;
        }
        Ok(())
    }
}
