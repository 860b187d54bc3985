//! Pull-based readers for change and transaction streams, and the ledger
//! source that derives both directly from a [`ClosedLedger`].

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::types::{Change, ClosedLedger, Transaction};

/// A stream of changes, read one at a time. `Ok(None)` means exhausted.
#[async_trait]
pub trait ChangeReader: Send {
    async fn read(&mut self) -> Result<Option<Change>, IngestError>;

    /// Release any resources held by the reader.
    async fn close(&mut self) -> Result<(), IngestError> {
        Ok(())
    }
}

/// A stream of transactions, read one at a time. `Ok(None)` means exhausted.
#[async_trait]
pub trait TransactionReader: Send {
    async fn read(&mut self) -> Result<Option<Transaction>, IngestError>;
}

#[async_trait]
impl<R: ChangeReader + ?Sized> ChangeReader for Box<R> {
    async fn read(&mut self) -> Result<Option<Change>, IngestError> {
        (**self).read().await
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        (**self).close().await
    }
}

#[async_trait]
impl<R: TransactionReader + ?Sized> TransactionReader for Box<R> {
    async fn read(&mut self) -> Result<Option<Transaction>, IngestError> {
        (**self).read().await
    }
}

// ─── In-memory change reader ──────────────────────────────────────────────────

/// Reads from an in-memory list of changes.
#[derive(Debug, Default)]
pub struct VecChangeReader {
    changes: VecDeque<Change>,
}

impl VecChangeReader {
    pub fn new(changes: impl IntoIterator<Item = Change>) -> Self {
        Self {
            changes: changes.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.changes.len()
    }
}

#[async_trait]
impl ChangeReader for VecChangeReader {
    async fn read(&mut self) -> Result<Option<Change>, IngestError> {
        Ok(self.changes.pop_front())
    }
}

// ─── Ledger source ────────────────────────────────────────────────────────────

/// Changes of one ledger in application order: the fee changes of every
/// transaction, then the meta changes of every transaction, then the
/// protocol upgrade changes.
pub struct LedgerChangeReader {
    inner: VecChangeReader,
}

impl LedgerChangeReader {
    pub fn new(ledger: &ClosedLedger) -> Self {
        let fees = ledger
            .transactions
            .iter()
            .flat_map(|tx| tx.fee_changes.iter().cloned());
        let metas = ledger
            .transactions
            .iter()
            .flat_map(|tx| tx.meta_changes.iter().cloned());
        let upgrades = ledger.upgrade_changes.iter().cloned();
        Self {
            inner: VecChangeReader::new(fees.chain(metas).chain(upgrades)),
        }
    }
}

#[async_trait]
impl ChangeReader for LedgerChangeReader {
    async fn read(&mut self) -> Result<Option<Change>, IngestError> {
        self.inner.read().await
    }
}

/// Transactions of one ledger in application order.
pub struct LedgerTransactionReader {
    transactions: VecDeque<Transaction>,
}

impl LedgerTransactionReader {
    /// Fails if the ledger's transaction indexes are not `1..=n` in order.
    pub fn new(ledger: &ClosedLedger) -> Result<Self, IngestError> {
        for (position, tx) in ledger.transactions.iter().enumerate() {
            let expected = position as u32 + 1;
            if tx.index != expected {
                return Err(IngestError::StreamRead(format!(
                    "ledger {}: transaction at position {position} has index {}, expected {expected}",
                    ledger.sequence(),
                    tx.index
                )));
            }
        }
        Ok(Self {
            transactions: ledger.transactions.iter().cloned().collect(),
        })
    }
}

#[async_trait]
impl TransactionReader for LedgerTransactionReader {
    async fn read(&mut self) -> Result<Option<Transaction>, IngestError> {
        Ok(self.transactions.pop_front())
    }
}
