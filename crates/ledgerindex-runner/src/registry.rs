//! Per-call processor builders.
//!
//! Every runner operation builds its processors, loaders and filterers fresh
//! from these functions. Member order is fixed: processors sharing a loader
//! rely on it, and the group reports durations in registration order.

use ledgerindex_core::error::IngestError;
use ledgerindex_core::group::{
    ChangeProcessorGroup, TransactionFiltererGroup, TransactionProcessorGroup,
};
use ledgerindex_core::loader::Loaders;
use ledgerindex_core::processor::{ChangeProcessor, TransactionProcessor};
use ledgerindex_core::session::StorageSession;
use ledgerindex_core::stats::{ChangeStats, TradeStats, TransactionStats};
use ledgerindex_processors::{
    AssetStatsProcessor, ClaimableBalancesTransactionProcessor, EffectsProcessor,
    EntryChangeProcessor, FilteredTransactionsProcessor, Filters, LedgersProcessor,
    LiquidityPoolsTransactionProcessor, OperationsProcessor, ParticipantsProcessor,
    SignersProcessor, StatsChangeProcessor, StatsHandle, StatsLedgerTransactionProcessor,
    TradesProcessor, TransactionsProcessor,
};

/// Where a change stream comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    HistoryArchive,
    Ledger,
}

impl ChangeSource {
    /// Value of the `source` field in progress lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HistoryArchive => "historyArchive",
            Self::Ledger => "ledger",
        }
    }

    /// Whether asset stats run with the ledger entry cache: only for changes
    /// read from a closed ledger.
    pub fn uses_ledger_entry_cache(&self) -> bool {
        matches!(self, Self::Ledger)
    }
}

/// A change group and the handle to its change counts.
pub struct ChangeProcessors {
    pub group: ChangeProcessorGroup,
    pub stats: StatsHandle<ChangeStats>,
}

/// Stats, account data, accounts, offers, asset stats, signers, trust
/// lines, claimable balances, liquidity pools.
pub fn build_change_processors(source: ChangeSource) -> ChangeProcessors {
    let stats = StatsChangeProcessor::new();
    let handle = stats.handle();

    let processors: Vec<Box<dyn ChangeProcessor>> = vec![
        Box::new(stats),
        Box::new(EntryChangeProcessor::account_data()),
        Box::new(EntryChangeProcessor::accounts()),
        Box::new(EntryChangeProcessor::offers()),
        Box::new(AssetStatsProcessor::new(source.uses_ledger_entry_cache())),
        Box::new(SignersProcessor::new()),
        Box::new(EntryChangeProcessor::trust_lines()),
        Box::new(EntryChangeProcessor::claimable_balances()),
        Box::new(EntryChangeProcessor::liquidity_pools()),
    ];
    ChangeProcessors {
        group: ChangeProcessorGroup::new(processors),
        stats: handle,
    }
}

/// The main transaction group and the handles to its counts.
pub struct TransactionProcessors {
    pub group: TransactionProcessorGroup,
    pub stats: StatsHandle<TransactionStats>,
    pub trades: StatsHandle<TradeStats>,
}

/// Stats, effects, ledgers, operations, trades, participants, transactions,
/// claimable balances, liquidity pools; with a fresh set of loaders.
///
/// `ledgers` is passed in because the caller feeds it the ledger header
/// before streaming.
pub fn build_transaction_processors(ledgers: LedgersProcessor) -> TransactionProcessors {
    let loaders = Loaders::new();
    let stats = StatsLedgerTransactionProcessor::new();
    let stats_handle = stats.handle();
    let trades = TradesProcessor::new(&loaders);
    let trades_handle = trades.handle();

    let processors: Vec<Box<dyn TransactionProcessor>> = vec![
        Box::new(stats),
        Box::new(EffectsProcessor::new(loaders.accounts.clone())),
        Box::new(ledgers),
        Box::new(OperationsProcessor::new()),
        Box::new(trades),
        Box::new(ParticipantsProcessor::new(loaders.accounts.clone())),
        Box::new(TransactionsProcessor::new()),
        Box::new(ClaimableBalancesTransactionProcessor::new(
            loaders.claimable_balances.clone(),
        )),
        Box::new(LiquidityPoolsTransactionProcessor::new(
            loaders.liquidity_pools.clone(),
        )),
    ];
    TransactionProcessors {
        group: TransactionProcessorGroup::new(processors, loaders.all()),
        stats: stats_handle,
        trades: trades_handle,
    }
}

/// Receives the transactions dropped by filtering. Inert when filtering is
/// off.
pub fn build_filtered_out_processors(filtering_enabled: bool) -> TransactionProcessorGroup {
    if !filtering_enabled {
        return TransactionProcessorGroup::empty();
    }
    TransactionProcessorGroup::new(vec![Box::new(FilteredTransactionsProcessor::new())], vec![])
}

/// Filterers from the cached rules. Empty (keep everything) when filtering
/// is off.
pub async fn build_filterers(
    filters: &mut Filters,
    session: &dyn StorageSession,
    filtering_enabled: bool,
) -> Result<TransactionFiltererGroup, IngestError> {
    if !filtering_enabled {
        return Ok(TransactionFiltererGroup::new(vec![]));
    }
    Ok(TransactionFiltererGroup::new(filters.filterers(session).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_group_order() {
        let built = build_change_processors(ChangeSource::Ledger);
        assert_eq!(built.group.len(), 9);
    }

    #[test]
    fn ledger_entry_cache_only_for_ledger_changes() {
        assert!(ChangeSource::Ledger.uses_ledger_entry_cache());
        assert!(!ChangeSource::HistoryArchive.uses_ledger_entry_cache());
    }

    #[test]
    fn transaction_group_is_fresh_per_call() {
        let a = build_transaction_processors(LedgersProcessor::new(1));
        let b = build_transaction_processors(LedgersProcessor::new(1));
        assert_eq!(a.group.len(), 9);
        assert_eq!(b.group.processed_transactions(), 0);
    }

    #[test]
    fn filtered_out_group_only_when_enabled() {
        assert!(build_filtered_out_processors(false).is_empty());
        assert_eq!(build_filtered_out_processors(true).len(), 1);
    }
}
