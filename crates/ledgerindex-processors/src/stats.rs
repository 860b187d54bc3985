//! Stats processors: count what flows through a group without writing rows.
//!
//! The counts live behind a [`StatsHandle`] so the runner can read them after
//! the processor itself was moved into (and consumed by) its group.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::{ChangeProcessor, TransactionProcessor};
use ledgerindex_core::session::StorageSession;
use ledgerindex_core::stats::{ChangeStats, TransactionStats};
use ledgerindex_core::types::{Change, ClosedLedger, Transaction};

/// Shared, clonable view of counts updated by a processor.
#[derive(Debug, Default)]
pub struct StatsHandle<T>(Arc<Mutex<T>>);

impl<T> Clone for StatsHandle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone + Default> StatsHandle<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(T::default())))
    }

    /// Copy of the current counts.
    pub fn snapshot(&self) -> T {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.0.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

// ─── Changes ─────────────────────────────────────────────────────────────────

/// Counts created/updated/removed entries per kind.
pub struct StatsChangeProcessor {
    stats: StatsHandle<ChangeStats>,
}

impl StatsChangeProcessor {
    pub fn new() -> Self {
        Self {
            stats: StatsHandle::new(),
        }
    }

    pub fn handle(&self) -> StatsHandle<ChangeStats> {
        self.stats.clone()
    }
}

impl Default for StatsChangeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeProcessor for StatsChangeProcessor {
    fn name(&self) -> &str {
        "stats_change_processor"
    }

    async fn process_change(&mut self, change: &Change) -> Result<(), IngestError> {
        self.stats.update(|s| s.record(change));
        Ok(())
    }

    async fn commit(&mut self, _session: &dyn StorageSession) -> Result<(), IngestError> {
        Ok(())
    }
}

// ─── Transactions ────────────────────────────────────────────────────────────

/// Counts transactions and operations of the ledger.
pub struct StatsLedgerTransactionProcessor {
    stats: StatsHandle<TransactionStats>,
}

impl StatsLedgerTransactionProcessor {
    pub fn new() -> Self {
        Self {
            stats: StatsHandle::new(),
        }
    }

    pub fn handle(&self) -> StatsHandle<TransactionStats> {
        self.stats.clone()
    }
}

impl Default for StatsLedgerTransactionProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionProcessor for StatsLedgerTransactionProcessor {
    fn name(&self) -> &str {
        "stats_ledger_transaction_processor"
    }

    async fn process_transaction(
        &mut self,
        _ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        self.stats.update(|s| s.record(tx));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ledger, payment, tx};

    #[tokio::test]
    async fn change_counts_survive_the_processor() {
        let mut p = StatsChangeProcessor::new();
        let handle = p.handle();
        p.process_change(&Change::genesis("test net")).await.unwrap();
        drop(p);

        let stats = handle.snapshot();
        assert_eq!(stats.accounts_created, 1);
        assert_eq!(stats.total(), 1);
    }

    #[tokio::test]
    async fn transaction_counts() {
        let mut p = StatsLedgerTransactionProcessor::new();
        let handle = p.handle();
        let mut ok = tx(1, true);
        ok.operations.push(payment("GA", "GB"));
        let failed = tx(2, false);
        let l = ledger(10, vec![ok.clone(), failed.clone()]);

        p.process_transaction(&l, &ok).await.unwrap();
        p.process_transaction(&l, &failed).await.unwrap();

        let stats = handle.snapshot();
        assert_eq!(stats.transactions_successful, 1);
        assert_eq!(stats.transactions_failed, 1);
        assert_eq!(stats.operations_in_successful, 1);
        assert_eq!(stats.operations_by_type["payment"], 1);
    }
}
