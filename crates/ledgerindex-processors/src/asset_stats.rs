//! Per-asset statistics: holders, balances held in trust lines, claimable
//! balances and liquidity pools.
//!
//! Deltas are accumulated while streaming and merged with the stored row at
//! commit. A row whose counters all drop to zero is removed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::ChangeProcessor;
use ledgerindex_core::session::{StateRow, StateTable, StorageSession};
use ledgerindex_core::types::{Asset, Change, LedgerEntry, LedgerEntryData};

/// Stored asset-stats row, also used as a delta while streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStat {
    pub accounts: i64,
    pub balance: i64,
    pub claimable_balances: i64,
    pub claimable_balances_amount: i64,
    pub liquidity_pools: i64,
    pub liquidity_pools_amount: i64,
}

impl AssetStat {
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    fn add(&mut self, other: &AssetStat) {
        self.accounts += other.accounts;
        self.balance += other.balance;
        self.claimable_balances += other.claimable_balances;
        self.claimable_balances_amount += other.claimable_balances_amount;
        self.liquidity_pools += other.liquidity_pools;
        self.liquidity_pools_amount += other.liquidity_pools_amount;
    }

    fn has_negative(&self) -> bool {
        [
            self.accounts,
            self.balance,
            self.claimable_balances,
            self.claimable_balances_amount,
            self.liquidity_pools,
            self.liquidity_pools_amount,
        ]
        .iter()
        .any(|v| *v < 0)
    }
}

/// Aggregates asset statistics from trust line, claimable balance and
/// liquidity pool changes.
pub struct AssetStatsProcessor {
    use_ledger_entry_cache: bool,
    deltas: BTreeMap<String, AssetStat>,
}

impl AssetStatsProcessor {
    /// `use_ledger_entry_cache` is set when changes come from a closed
    /// ledger; it only changes what is logged.
    pub fn new(use_ledger_entry_cache: bool) -> Self {
        Self {
            use_ledger_entry_cache,
            deltas: BTreeMap::new(),
        }
    }

    fn apply(&mut self, entry: &LedgerEntry, sign: i64) {
        match &entry.data {
            LedgerEntryData::TrustLine(t) => {
                self.delta(&t.asset, |d| {
                    d.accounts += sign;
                    d.balance += sign * t.balance;
                });
            }
            LedgerEntryData::ClaimableBalance(c) => {
                self.delta(&c.asset, |d| {
                    d.claimable_balances += sign;
                    d.claimable_balances_amount += sign * c.amount;
                });
            }
            LedgerEntryData::LiquidityPool(p) => {
                self.delta(&p.asset_a, |d| {
                    d.liquidity_pools += sign;
                    d.liquidity_pools_amount += sign * p.reserve_a;
                });
                self.delta(&p.asset_b, |d| {
                    d.liquidity_pools += sign;
                    d.liquidity_pools_amount += sign * p.reserve_b;
                });
            }
            _ => {}
        }
    }

    fn delta(&mut self, asset: &Asset, f: impl FnOnce(&mut AssetStat)) {
        // Native is not tracked.
        if matches!(asset, Asset::Native) {
            return;
        }
        f(self.deltas.entry(asset.to_string()).or_default());
    }
}

#[async_trait]
impl ChangeProcessor for AssetStatsProcessor {
    fn name(&self) -> &str {
        "asset_stats_processor"
    }

    async fn process_change(&mut self, change: &Change) -> Result<(), IngestError> {
        if let Some(pre) = &change.pre {
            self.apply(pre, -1);
        }
        if let Some(post) = &change.post {
            self.apply(post, 1);
        }
        Ok(())
    }

    async fn commit(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        let mut deltas = std::mem::take(&mut self.deltas);
        deltas.retain(|_, d| !d.is_zero());
        if deltas.is_empty() {
            return Ok(());
        }

        let stored = session
            .load_state(StateTable::AssetStats, deltas.keys().cloned().collect())
            .await?;

        let mut upserts = Vec::new();
        let mut removals = Vec::new();
        for (asset, delta) in deltas {
            let mut stat: AssetStat = match stored.get(&asset) {
                Some(v) => serde_json::from_value(v.clone())
                    .map_err(|e| IngestError::Storage(e.to_string()))?,
                None => AssetStat::default(),
            };
            stat.add(&delta);
            if stat.has_negative() {
                return Err(IngestError::Processor {
                    processor: self.name().to_string(),
                    reason: format!("asset {asset} stats went negative: {stat:?}"),
                });
            }
            if stat.is_zero() {
                removals.push(asset);
            } else {
                let body =
                    serde_json::to_value(&stat).map_err(|e| IngestError::Storage(e.to_string()))?;
                upserts.push(StateRow { key: asset, body });
            }
        }

        debug!(
            upserts = upserts.len(),
            removals = removals.len(),
            use_ledger_entry_cache = self.use_ledger_entry_cache,
            "staging asset stats"
        );
        if !upserts.is_empty() {
            session.upsert_state(StateTable::AssetStats, upserts).await?;
        }
        if !removals.is_empty() {
            session.remove_state(StateTable::AssetStats, removals).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{created, trust_line, usd};
    use ledgerindex_storage::InMemorySession;

    fn stat(session: &InMemorySession) -> Option<AssetStat> {
        session
            .state(StateTable::AssetStats, "USD:GISSUER")
            .map(|v| serde_json::from_value(v).unwrap())
    }

    #[tokio::test]
    async fn merges_with_stored_row() {
        let session = InMemorySession::new();
        let mut p = AssetStatsProcessor::new(true);
        p.process_change(&created(trust_line("GA", usd(), 100))).await.unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();

        let mut p = AssetStatsProcessor::new(false);
        p.process_change(&created(trust_line("GB", usd(), 5))).await.unwrap();
        p.process_change(&Change::updated(
            trust_line("GA", usd(), 100),
            trust_line("GA", usd(), 60),
        ))
        .await
        .unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();

        let s = stat(&session).unwrap();
        assert_eq!(s.accounts, 2);
        assert_eq!(s.balance, 65);
    }

    #[tokio::test]
    async fn row_removed_when_last_holder_leaves() {
        let session = InMemorySession::new();
        let mut p = AssetStatsProcessor::new(false);
        p.process_change(&created(trust_line("GA", usd(), 0))).await.unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();
        assert!(stat(&session).is_some());

        p.process_change(&Change::removed(trust_line("GA", usd(), 0))).await.unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();
        assert!(stat(&session).is_none());
    }

    #[tokio::test]
    async fn negative_totals_are_rejected() {
        let session = InMemorySession::new();
        let mut p = AssetStatsProcessor::new(false);
        p.process_change(&Change::removed(trust_line("GA", usd(), 10))).await.unwrap();
        assert!(p.commit(&session).await.is_err());
    }
}
