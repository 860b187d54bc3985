//! `history_effects`: the account-level effects of successful operations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use ledgerindex_core::error::IngestError;
use ledgerindex_core::loader::{Loader, LoaderFuture};
use ledgerindex_core::processor::TransactionProcessor;
use ledgerindex_core::session::{HistoryRow, HistoryTable, StorageSession};
use ledgerindex_core::types::{ClosedLedger, Operation, OperationBody, Transaction};

use crate::toid::operation_id;

/// One effect before its account id is resolved.
struct PendingEffect {
    ledger_sequence: u32,
    account: LoaderFuture,
    operation_id: i64,
    order: u32,
    kind: &'static str,
    details: Value,
}

#[derive(Serialize)]
struct EffectRecord<'a> {
    history_account_id: i64,
    address: &'a str,
    history_operation_id: i64,
    order: u32,
    #[serde(rename = "type")]
    kind: &'static str,
    details: &'a Value,
}

/// `(account, effect type, details)` of one operation.
fn operation_effects(source: &str, op: &Operation) -> Vec<(String, &'static str, Value)> {
    let source = source.to_string();
    match &op.body {
        OperationBody::CreateAccount {
            destination,
            starting_balance,
        } => vec![
            (
                destination.clone(),
                "account_created",
                json!({ "starting_balance": starting_balance }),
            ),
            (
                source,
                "account_debited",
                json!({ "asset": "native", "amount": starting_balance }),
            ),
        ],
        OperationBody::Payment {
            destination,
            asset,
            amount,
        } => vec![
            (
                destination.clone(),
                "account_credited",
                json!({ "asset": asset.to_string(), "amount": amount }),
            ),
            (
                source,
                "account_debited",
                json!({ "asset": asset.to_string(), "amount": amount }),
            ),
        ],
        OperationBody::PathPaymentStrictReceive {
            destination,
            send_asset,
            dest_asset,
            dest_amount,
            ..
        } => vec![
            (
                destination.clone(),
                "account_credited",
                json!({ "asset": dest_asset.to_string(), "amount": dest_amount }),
            ),
            (
                source,
                "account_debited",
                json!({ "asset": send_asset.to_string() }),
            ),
        ],
        OperationBody::PathPaymentStrictSend {
            destination,
            send_asset,
            send_amount,
            dest_asset,
            ..
        } => vec![
            (
                destination.clone(),
                "account_credited",
                json!({ "asset": dest_asset.to_string() }),
            ),
            (
                source,
                "account_debited",
                json!({ "asset": send_asset.to_string(), "amount": send_amount }),
            ),
        ],
        OperationBody::SetOptions {
            signer,
            home_domain,
        } => {
            let mut out = Vec::new();
            if let Some(signer) = signer {
                let kind = if signer.weight == 0 {
                    "signer_removed"
                } else {
                    "signer_updated"
                };
                out.push((
                    source.clone(),
                    kind,
                    json!({ "public_key": signer.key, "weight": signer.weight }),
                ));
            }
            if let Some(domain) = home_domain {
                out.push((
                    source,
                    "account_home_domain_updated",
                    json!({ "home_domain": domain }),
                ));
            }
            out
        }
        OperationBody::ChangeTrust { asset, limit } => {
            let kind = if *limit == 0 {
                "trustline_removed"
            } else {
                "trustline_updated"
            };
            vec![(source, kind, json!({ "asset": asset.to_string(), "limit": limit }))]
        }
        OperationBody::AccountMerge { destination } => vec![
            (source, "account_removed", json!({})),
            (destination.clone(), "account_credited", json!({ "asset": "native" })),
        ],
        OperationBody::ManageData { name, value } => {
            let kind = if value.is_some() {
                "data_updated"
            } else {
                "data_removed"
            };
            vec![(source, kind, json!({ "name": name }))]
        }
        OperationBody::BumpSequence { bump_to } => {
            vec![(source, "sequence_bumped", json!({ "new_seq": bump_to }))]
        }
        OperationBody::CreateClaimableBalance { asset, amount, .. } => vec![(
            source,
            "claimable_balance_created",
            json!({ "asset": asset.to_string(), "amount": amount }),
        )],
        OperationBody::ClaimClaimableBalance { balance_id } => vec![(
            source,
            "claimable_balance_claimed",
            json!({ "balance_id": balance_id }),
        )],
        OperationBody::ClawbackClaimableBalance { balance_id } => vec![(
            source,
            "claimable_balance_clawed_back",
            json!({ "balance_id": balance_id }),
        )],
        OperationBody::LiquidityPoolDeposit {
            liquidity_pool_id, ..
        } => vec![(
            source,
            "liquidity_pool_deposited",
            json!({ "liquidity_pool_id": liquidity_pool_id }),
        )],
        OperationBody::LiquidityPoolWithdraw {
            liquidity_pool_id,
            amount,
        } => vec![(
            source,
            "liquidity_pool_withdrew",
            json!({ "liquidity_pool_id": liquidity_pool_id, "shares": amount }),
        )],
        OperationBody::ManageSellOffer { .. }
        | OperationBody::ManageBuyOffer { .. }
        | OperationBody::CreatePassiveSellOffer { .. } => {
            let mut out = Vec::new();
            for claim in &op.claims {
                let details = json!({
                    "offer_id": claim.offer_id,
                    "sold_asset": claim.asset_bought.to_string(),
                    "sold_amount": claim.amount_bought,
                    "bought_asset": claim.asset_sold.to_string(),
                    "bought_amount": claim.amount_sold,
                });
                out.push((source.clone(), "trade", details.clone()));
                if let Some(seller) = &claim.seller_id {
                    out.push((seller.clone(), "trade", details));
                }
            }
            out
        }
    }
}

/// Derives effects of successful operations; account ids come from the
/// shared account loader.
pub struct EffectsProcessor {
    accounts: Arc<Loader>,
    pending: Vec<PendingEffect>,
}

impl EffectsProcessor {
    pub fn new(accounts: Arc<Loader>) -> Self {
        Self {
            accounts,
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl TransactionProcessor for EffectsProcessor {
    fn name(&self) -> &str {
        "effects_processor"
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
            let effects = operation_effects(tx.operation_source(op), op);
            for (order, (account, kind, details)) in effects.into_iter().enumerate() {
                self.pending.push(PendingEffect {
                    ledger_sequence: seq,
                    account: self.accounts.get_future(account)?,
                    operation_id: operation_id(seq, tx.index, i),
                    order: order as u32 + 1,
                    kind,
                    details,
                });
            }
        }
        Ok(())
    }

    async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(self.pending.len());
        for effect in std::mem::take(&mut self.pending) {
            let record = EffectRecord {
                history_account_id: effect.account.value()?,
                address: effect.account.key(),
                history_operation_id: effect.operation_id,
                order: effect.order,
                kind: effect.kind,
                details: &effect.details,
            };
            rows.push(HistoryRow::from_record(effect.ledger_sequence, &record)?);
        }
        session.insert_history(HistoryTable::Effects, rows).await
    }
}
