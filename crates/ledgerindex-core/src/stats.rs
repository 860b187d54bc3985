//! Per-call statistics: change counts, transaction counts, trade counts and
//! per-processor run durations.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Change, ChangeType, ClaimAtom, LedgerEntryKind, Transaction};

// ─── ChangeStats ──────────────────────────────────────────────────────────────

/// Counts of applied changes, by entry kind and change type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub accounts_created: i64,
    pub accounts_updated: i64,
    pub accounts_removed: i64,

    pub claimable_balances_created: i64,
    pub claimable_balances_updated: i64,
    pub claimable_balances_removed: i64,

    pub data_created: i64,
    pub data_updated: i64,
    pub data_removed: i64,

    pub liquidity_pools_created: i64,
    pub liquidity_pools_updated: i64,
    pub liquidity_pools_removed: i64,

    pub offers_created: i64,
    pub offers_updated: i64,
    pub offers_removed: i64,

    pub trust_lines_created: i64,
    pub trust_lines_updated: i64,
    pub trust_lines_removed: i64,
}

impl ChangeStats {
    pub fn record(&mut self, change: &Change) {
        let counter = match (change.kind, change.change_type()) {
            (LedgerEntryKind::Account, ChangeType::Created) => &mut self.accounts_created,
            (LedgerEntryKind::Account, ChangeType::Updated) => &mut self.accounts_updated,
            (LedgerEntryKind::Account, ChangeType::Removed) => &mut self.accounts_removed,
            (LedgerEntryKind::ClaimableBalance, ChangeType::Created) => {
                &mut self.claimable_balances_created
            }
            (LedgerEntryKind::ClaimableBalance, ChangeType::Updated) => {
                &mut self.claimable_balances_updated
            }
            (LedgerEntryKind::ClaimableBalance, ChangeType::Removed) => {
                &mut self.claimable_balances_removed
            }
            (LedgerEntryKind::Data, ChangeType::Created) => &mut self.data_created,
            (LedgerEntryKind::Data, ChangeType::Updated) => &mut self.data_updated,
            (LedgerEntryKind::Data, ChangeType::Removed) => &mut self.data_removed,
            (LedgerEntryKind::LiquidityPool, ChangeType::Created) => {
                &mut self.liquidity_pools_created
            }
            (LedgerEntryKind::LiquidityPool, ChangeType::Updated) => {
                &mut self.liquidity_pools_updated
            }
            (LedgerEntryKind::LiquidityPool, ChangeType::Removed) => {
                &mut self.liquidity_pools_removed
            }
            (LedgerEntryKind::Offer, ChangeType::Created) => &mut self.offers_created,
            (LedgerEntryKind::Offer, ChangeType::Updated) => &mut self.offers_updated,
            (LedgerEntryKind::Offer, ChangeType::Removed) => &mut self.offers_removed,
            (LedgerEntryKind::TrustLine, ChangeType::Created) => &mut self.trust_lines_created,
            (LedgerEntryKind::TrustLine, ChangeType::Updated) => &mut self.trust_lines_updated,
            (LedgerEntryKind::TrustLine, ChangeType::Removed) => &mut self.trust_lines_removed,
        };
        *counter += 1;
    }

    /// Total number of recorded changes.
    pub fn total(&self) -> i64 {
        self.as_map().values().sum()
    }

    /// Flat `name → count` view, for structured log lines.
    pub fn as_map(&self) -> BTreeMap<&'static str, i64> {
        BTreeMap::from([
            ("stats_accounts_created", self.accounts_created),
            ("stats_accounts_updated", self.accounts_updated),
            ("stats_accounts_removed", self.accounts_removed),
            ("stats_claimable_balances_created", self.claimable_balances_created),
            ("stats_claimable_balances_updated", self.claimable_balances_updated),
            ("stats_claimable_balances_removed", self.claimable_balances_removed),
            ("stats_data_created", self.data_created),
            ("stats_data_updated", self.data_updated),
            ("stats_data_removed", self.data_removed),
            ("stats_liquidity_pools_created", self.liquidity_pools_created),
            ("stats_liquidity_pools_updated", self.liquidity_pools_updated),
            ("stats_liquidity_pools_removed", self.liquidity_pools_removed),
            ("stats_offers_created", self.offers_created),
            ("stats_offers_updated", self.offers_updated),
            ("stats_offers_removed", self.offers_removed),
            ("stats_trust_lines_created", self.trust_lines_created),
            ("stats_trust_lines_updated", self.trust_lines_updated),
            ("stats_trust_lines_removed", self.trust_lines_removed),
        ])
    }
}

// ─── TransactionStats ─────────────────────────────────────────────────────────

/// Counts of processed transactions and operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub transactions: i64,
    pub transactions_successful: i64,
    pub transactions_failed: i64,
    /// Transactions dropped by the filter group.
    pub transactions_filtered: i64,

    pub operations: i64,
    pub operations_in_successful: i64,
    pub operations_in_failed: i64,

    /// Operation type name → count, over all processed transactions.
    pub operations_by_type: BTreeMap<String, i64>,
}

impl TransactionStats {
    pub fn record(&mut self, tx: &Transaction) {
        let ops = tx.operations.len() as i64;
        self.transactions += 1;
        self.operations += ops;
        if tx.successful {
            self.transactions_successful += 1;
            self.operations_in_successful += ops;
        } else {
            self.transactions_failed += 1;
            self.operations_in_failed += ops;
        }
        for op in &tx.operations {
            *self
                .operations_by_type
                .entry(op.body.type_name().to_string())
                .or_default() += 1;
        }
    }
}

// ─── TradeStats ───────────────────────────────────────────────────────────────

/// Counts of trades ingested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStats {
    pub count: i64,
    /// `"sold/bought"` asset pair → trade count.
    pub by_asset_pair: BTreeMap<String, i64>,
}

impl TradeStats {
    pub fn record(&mut self, claim: &ClaimAtom) {
        self.count += 1;
        *self
            .by_asset_pair
            .entry(format!("{}/{}", claim.asset_sold, claim.asset_bought))
            .or_default() += 1;
    }
}

// ─── ProcessorDurations ───────────────────────────────────────────────────────

/// Elapsed time per processor, keyed by the processor's stable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorDurations(HashMap<String, Duration>);

impl ProcessorDurations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `elapsed` under `name`.
    pub fn add(&mut self, name: &str, elapsed: Duration) {
        *self.0.entry(name.to_string()).or_default() += elapsed;
    }

    /// Fold another set of durations into this one.
    pub fn merge(&mut self, other: &ProcessorDurations) {
        for (name, elapsed) in &other.0 {
            self.add(name, *elapsed);
        }
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> Duration {
        self.0.values().sum()
    }
}

// ─── Aggregates ───────────────────────────────────────────────────────────────

/// Result of running the transaction processors on one ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionProcessingStats {
    pub transaction_stats: TransactionStats,
    pub transaction_durations: ProcessorDurations,
    pub trade_stats: TradeStats,
}

/// Result of running every processor on one ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub change_stats: ChangeStats,
    pub change_durations: ProcessorDurations,
    pub transaction_stats: TransactionStats,
    pub transaction_durations: ProcessorDurations,
    pub trade_stats: TradeStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountEntry, Asset, LedgerEntry, LedgerEntryData};

    #[test]
    fn change_stats_counts_by_kind_and_type() {
        let mut stats = ChangeStats::default();
        stats.record(&Change::genesis("net"));
        stats.record(&Change::removed(LedgerEntry::new(
            3,
            LedgerEntryData::Account(AccountEntry {
                account_id: "GA".into(),
                balance: 0,
                seq_num: 0,
                num_sub_entries: 0,
                flags: 0,
                home_domain: String::new(),
                thresholds: [1, 0, 0, 0],
                signers: vec![],
            }),
        )));
        assert_eq!(stats.accounts_created, 1);
        assert_eq!(stats.accounts_removed, 1);
        assert_eq!(stats.total(), 2);
    }

    #[test]
    fn durations_accumulate_and_merge() {
        let mut a = ProcessorDurations::new();
        a.add("accounts", Duration::from_millis(5));
        a.add("accounts", Duration::from_millis(5));

        let mut b = ProcessorDurations::new();
        b.add("asset_filter", Duration::from_millis(1));

        a.merge(&b);
        assert_eq!(a.get("accounts"), Some(Duration::from_millis(10)));
        assert!(a.contains("asset_filter"));
        assert_eq!(a.total(), Duration::from_millis(11));
    }

    #[test]
    fn trade_stats_by_pair() {
        let mut stats = TradeStats::default();
        let claim = ClaimAtom {
            seller_id: Some("GS".into()),
            liquidity_pool_id: None,
            offer_id: 7,
            asset_sold: Asset::Native,
            amount_sold: 10,
            asset_bought: Asset::credit("USD", "GI"),
            amount_bought: 1,
        };
        stats.record(&claim);
        stats.record(&claim);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.by_asset_pair["native/USD:GI"], 2);
    }
}
