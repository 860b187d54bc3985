//! Stream drivers: pull items from a reader and feed processor groups.
//!
//! Both drivers check the cancellation token before every item and stop at
//! the first reader or processor error. They never commit or flush; that is
//! left to the caller once the whole stream was consumed without error.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::IngestError;
use crate::group::{ChangeProcessorGroup, TransactionFiltererGroup, TransactionProcessorGroup};
use crate::reader::{ChangeReader, TransactionReader};
use crate::types::ClosedLedger;

/// Feed every change of `reader` to `group`. Returns the number of changes.
pub async fn stream_changes<R>(
    cancel: &CancellationToken,
    group: &mut ChangeProcessorGroup,
    reader: &mut R,
) -> Result<u64, IngestError>
where
    R: ChangeReader + ?Sized,
{
    let mut count = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let Some(change) = reader.read().await? else {
            break;
        };
        group.process_change(&change).await?;
        count += 1;
    }
    debug!(count, "change stream exhausted");
    Ok(count)
}

/// How the transactions of one ledger were routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionRouting {
    pub kept: u64,
    pub dropped: u64,
}

/// Feed every transaction of `reader` through `filterers`: kept transactions
/// go to `main`, dropped ones to `filtered_out`.
pub async fn stream_ledger_transactions<R>(
    cancel: &CancellationToken,
    filterers: &mut TransactionFiltererGroup,
    filtered_out: &mut TransactionProcessorGroup,
    main: &mut TransactionProcessorGroup,
    reader: &mut R,
    ledger: &ClosedLedger,
) -> Result<TransactionRouting, IngestError>
where
    R: TransactionReader + ?Sized,
{
    let mut routing = TransactionRouting::default();
    loop {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let Some(tx) = reader.read().await? else {
            break;
        };
        if filterers.evaluate(ledger, &tx).await? {
            main.process_transaction(ledger, &tx).await?;
            routing.kept += 1;
        } else {
            filtered_out.process_transaction(ledger, &tx).await?;
            routing.dropped += 1;
        }
    }
    debug!(
        sequence = ledger.sequence(),
        kept = routing.kept,
        dropped = routing.dropped,
        "transaction stream exhausted"
    );
    Ok(routing)
}
