//! `history_trades`: one row per offer or pool crossed by a successful
//! operation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::loader::{Loader, LoaderFuture, Loaders};
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};
use ledgerindex_core::stats::TradeStats;
use ledgerindex_core::types::{ClosedLedger, Transaction};

use crate::stats::StatsHandle;
use crate::toid::operation_id;

/// Where the sold side of a trade came from.
enum Seller {
    Offer { account: LoaderFuture, offer_id: i64 },
    Pool(LoaderFuture),
}

struct PendingTrade {
    ledger_sequence: u32,
    ledger_closed_at: i64,
    operation_id: i64,
    order: u32,
    seller: Seller,
    base_asset: LoaderFuture,
    base_amount: i64,
    counter_account: LoaderFuture,
    counter_asset: LoaderFuture,
    counter_amount: i64,
}

#[derive(Serialize)]
struct TradeRecord {
    history_operation_id: i64,
    order: u32,
    ledger_closed_at: i64,
    base_offer_id: Option<i64>,
    base_account_id: Option<i64>,
    base_liquidity_pool_id: Option<i64>,
    base_asset_id: i64,
    base_amount: i64,
    counter_account_id: i64,
    counter_asset_id: i64,
    counter_amount: i64,
}

pub struct TradesProcessor {
    accounts: Arc<Loader>,
    assets: Arc<Loader>,
    pools: Arc<Loader>,
    stats: StatsHandle<TradeStats>,
    pending: Vec<PendingTrade>,
}

impl TradesProcessor {
    pub fn new(loaders: &Loaders) -> Self {
        Self {
            accounts: loaders.accounts.clone(),
            assets: loaders.assets.clone(),
            pools: loaders.liquidity_pools.clone(),
            stats: StatsHandle::new(),
            pending: Vec::new(),
        }
    }

    /// Trade counts of everything processed so far.
    pub fn handle(&self) -> StatsHandle<TradeStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl TransactionProcessor for TradesProcessor {
    fn name(&self) -> &str {
        "trades_processor"
    }

    async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        if !tx.successful {
            return Ok(());
        }
        let seq = ledger.sequence();
        for (i, op) in tx.operations.iter().enumerate() {
            let buyer = tx.operation_source(op);
            for (order, claim) in op.claims.iter().enumerate() {
                let seller = match (&claim.seller_id, &claim.liquidity_pool_id) {
                    (_, Some(pool)) => Seller::Pool(self.pools.get_future(pool.as_str())?),
                    (Some(account), None) => Seller::Offer {
                        account: self.accounts.get_future(account.as_str())?,
                        offer_id: claim.offer_id,
                    },
                    (None, None) => {
                        return Err(IngestError::Processor {
                            processor: self.name().to_string(),
                            reason: format!(
                                "claim {order} of tx {} op {i} has neither seller nor pool",
                                tx.hash
                            ),
                        });
                    }
                };
                self.pending.push(PendingTrade {
                    ledger_sequence: seq,
                    ledger_closed_at: ledger.close_time(),
                    operation_id: operation_id(seq, tx.index, i),
                    order: order as u32,
                    seller,
                    base_asset: self.assets.get_future(claim.asset_sold.to_string())?,
                    base_amount: claim.amount_sold,
                    counter_account: self.accounts.get_future(buyer)?,
                    counter_asset: self.assets.get_future(claim.asset_bought.to_string())?,
                    counter_amount: claim.amount_bought,
                });
                self.stats.update(|s| s.record(claim));
            }
        }
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(self.pending.len());
        for trade in std::mem::take(&mut self.pending) {
            let (base_offer_id, base_account_id, base_liquidity_pool_id) = match &trade.seller {
                Seller::Offer { account, offer_id } => (Some(*offer_id), Some(account.value()?), None),
                Seller::Pool(pool) => (None, None, Some(pool.value()?)),
            };
            let record = TradeRecord {
                history_operation_id: trade.operation_id,
                order: trade.order,
                ledger_closed_at: trade.ledger_closed_at,
                base_offer_id,
                base_account_id,
                base_liquidity_pool_id,
                base_asset_id: trade.base_asset.value()?,
                base_amount: trade.base_amount,
                counter_account_id: trade.counter_account.value()?,
                counter_asset_id: trade.counter_asset.value()?,
                counter_amount: trade.counter_amount,
            };
            rows.push(HistoryRow::from_record(trade.ledger_sequence, &record)?);
        }
        session.insert_history(HistoryTable::Trades, rows).await
    }
}
