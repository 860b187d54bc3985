//! Capability traits for pluggable processors and filterers.

use async_trait::async_trait;

use crate::error::IngestError;
use crate::session::StorageSession;
use crate::types::{Change, ClosedLedger, Transaction};

/// Consumes a change stream and stages its accumulated effect on `commit`.
#[async_trait]
pub trait ChangeProcessor: Send {
    /// Stable name used as the duration key.
    fn name(&self) -> &str;

    async fn process_change(&mut self, change: &Change) -> Result<(), IngestError>;

    /// Stage the accumulated writes into `session`. Must not call
    /// `session.commit()`; the group does that once for all members.
    async fn commit(&mut self, session: &dyn StorageSession) -> Result<(), IngestError>;
}

/// Consumes the transactions of one ledger.
#[async_trait]
pub trait TransactionProcessor: Send {
    /// Stable name used as the duration key.
    fn name(&self) -> &str;

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError>;

    /// Stage buffered rows into `session`. Runs after every lazy loader of the
    /// group has executed, so loader futures are resolvable here.
    async fn flush(&mut self, _session: &dyn StorageSession) -> Result<(), IngestError> {
        Ok(())
    }
}

/// Decides whether a transaction goes through normal processing.
#[async_trait]
pub trait TransactionFilterer: Send + Sync {
    /// Stable name used as the duration key.
    fn name(&self) -> &str;

    /// `Ok(true)` keeps the transaction, `Ok(false)` drops it.
    async fn should_keep(&self, ledger: &ClosedLedger, tx: &Transaction)
        -> Result<bool, IngestError>;
}
