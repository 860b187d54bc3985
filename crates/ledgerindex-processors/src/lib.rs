//! ledgerindex-processors — the concrete processors and filterers.
//!
//! Change processors stage current-state rows at commit; transaction
//! processors buffer history rows and stage them at flush, after the shared
//! lazy loaders have resolved account/asset/pool/balance ids.
//!
//! | processor                                  | kind        | writes                          |
//! |--------------------------------------------|-------------|---------------------------------|
//! | [`StatsChangeProcessor`]                   | change      | nothing (counts)                |
//! | [`EntryChangeProcessor`]                   | change      | one state table per entry kind  |
//! | [`AssetStatsProcessor`]                    | change      | `asset_stats`                   |
//! | [`SignersProcessor`]                       | change      | `accounts_signers`              |
//! | [`StatsLedgerTransactionProcessor`]        | transaction | nothing (counts)                |
//! | [`EffectsProcessor`]                       | transaction | `history_effects`               |
//! | [`LedgersProcessor`]                       | transaction | `history_ledgers`               |
//! | [`OperationsProcessor`]                    | transaction | `history_operations`            |
//! | [`TradesProcessor`]                        | transaction | `history_trades`                |
//! | [`ParticipantsProcessor`]                  | transaction | `history_*_participants`        |
//! | [`TransactionsProcessor`]                  | transaction | `history_transactions`          |
//! | [`ClaimableBalancesTransactionProcessor`]  | transaction | `history_*_claimable_balances`  |
//! | [`LiquidityPoolsTransactionProcessor`]     | transaction | `history_*_liquidity_pools`     |
//! | [`FilteredTransactionsProcessor`]          | transaction | `history_transactions_filtered_tmp` |

pub mod asset_stats;
pub mod claimable_balances;
pub mod effects;
pub mod entries;
pub mod filtered_tmp;
pub mod filters;
pub mod ledgers;
pub mod liquidity_pools;
mod links;
pub mod participants;
pub mod signers;
pub mod stats;
pub mod toid;
pub mod trades;
pub mod transactions;

#[cfg(test)]
mod fixtures;

pub use asset_stats::AssetStatsProcessor;
pub use claimable_balances::ClaimableBalancesTransactionProcessor;
pub use effects::EffectsProcessor;
pub use entries::EntryChangeProcessor;
pub use filtered_tmp::FilteredTransactionsProcessor;
pub use filters::{AccountFilter, AssetFilter, Filters};
pub use ledgers::LedgersProcessor;
pub use liquidity_pools::LiquidityPoolsTransactionProcessor;
pub use participants::ParticipantsProcessor;
pub use signers::SignersProcessor;
pub use stats::{StatsChangeProcessor, StatsHandle, StatsLedgerTransactionProcessor};
pub use trades::TradesProcessor;
pub use transactions::{OperationsProcessor, TransactionsProcessor};
