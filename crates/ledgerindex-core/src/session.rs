//! Storage session: the transactional handle every processor writes through.
//!
//! Processors stage writes (state upserts/removals, history rows, id lookups)
//! into the session's pending batch. Nothing is durable until `commit`, and
//! `rollback` discards everything staged since the last commit. Only the
//! processor groups call `commit`; individual processors never do.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Current-state tables written by change processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTable {
    Accounts,
    AccountData,
    Offers,
    TrustLines,
    Signers,
    AssetStats,
    ClaimableBalances,
    LiquidityPools,
}

impl StateTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::AccountData => "accounts_data",
            Self::Offers => "offers",
            Self::TrustLines => "trust_lines",
            Self::Signers => "accounts_signers",
            Self::AssetStats => "asset_stats",
            Self::ClaimableBalances => "claimable_balances",
            Self::LiquidityPools => "liquidity_pools",
        }
    }
}

impl fmt::Display for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only history tables written by transaction processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTable {
    Ledgers,
    Transactions,
    Operations,
    Effects,
    Trades,
    TransactionParticipants,
    OperationParticipants,
    TransactionClaimableBalances,
    OperationClaimableBalances,
    TransactionLiquidityPools,
    OperationLiquidityPools,
    /// Temporary table of transactions dropped by ingestion filtering.
    TransactionsFilteredTmp,
}

impl HistoryTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ledgers => "history_ledgers",
            Self::Transactions => "history_transactions",
            Self::Operations => "history_operations",
            Self::Effects => "history_effects",
            Self::Trades => "history_trades",
            Self::TransactionParticipants => "history_transaction_participants",
            Self::OperationParticipants => "history_operation_participants",
            Self::TransactionClaimableBalances => "history_transaction_claimable_balances",
            Self::OperationClaimableBalances => "history_operation_claimable_balances",
            Self::TransactionLiquidityPools => "history_transaction_liquidity_pools",
            Self::OperationLiquidityPools => "history_operation_liquidity_pools",
            Self::TransactionsFilteredTmp => "history_transactions_filtered_tmp",
        }
    }
}

impl fmt::Display for HistoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier namespaces resolved in bulk by lazy loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Account,
    Asset,
    LiquidityPool,
    ClaimableBalance,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "history_accounts",
            Self::Asset => "history_assets",
            Self::LiquidityPool => "history_liquidity_pools",
            Self::ClaimableBalance => "history_claimable_balances",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One current-state row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub key: String,
    pub body: serde_json::Value,
}

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub ledger_sequence: u32,
    pub body: serde_json::Value,
}

impl HistoryRow {
    /// Serialize a typed row into a history row.
    pub fn from_record<T: Serialize>(ledger_sequence: u32, record: &T) -> Result<Self, IngestError> {
        let body =
            serde_json::to_value(record).map_err(|e| IngestError::Storage(e.to_string()))?;
        Ok(Self {
            ledger_sequence,
            body,
        })
    }
}

/// One whitelist-based filter rule as stored by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub enabled: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Unix timestamp of the last operator edit.
    #[serde(default)]
    pub last_modified: i64,
}

/// Ingestion filter rules stored in the database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Canonical asset strings (`native`, `CODE:ISSUER`).
    pub asset: FilterRule,
    /// Account ids.
    pub account: FilterRule,
}

/// Transactional storage handle shared by all processors of one call.
#[async_trait]
pub trait StorageSession: Send + Sync {
    /// Stage upserts into a current-state table.
    async fn upsert_state(&self, table: StateTable, rows: Vec<StateRow>)
        -> Result<(), IngestError>;

    /// Stage removals from a current-state table.
    async fn remove_state(&self, table: StateTable, keys: Vec<String>) -> Result<(), IngestError>;

    /// Read current-state rows (pending writes included) for `keys`.
    /// Missing keys are absent from the result.
    async fn load_state(
        &self,
        table: StateTable,
        keys: Vec<String>,
    ) -> Result<HashMap<String, serde_json::Value>, IngestError>;

    /// Stage rows for a history table.
    async fn insert_history(&self, table: HistoryTable, rows: Vec<HistoryRow>)
        -> Result<(), IngestError>;

    /// Get-or-create numeric history ids for `keys` in one round trip.
    async fn resolve_ids(
        &self,
        kind: LookupKind,
        keys: Vec<String>,
    ) -> Result<HashMap<String, i64>, IngestError>;

    /// Make everything staged since the last commit durable, atomically.
    async fn commit(&self) -> Result<(), IngestError>;

    /// Discard everything staged since the last commit.
    async fn rollback(&self) -> Result<(), IngestError>;

    /// Delete filtered-tmp rows older than `age`. Executes immediately,
    /// outside the pending batch. Returns the number of deleted rows.
    async fn delete_filtered_transactions_older_than(&self, age: Duration)
        -> Result<u64, IngestError>;

    /// Load the operator-configured ingestion filter rules.
    async fn filter_rules(&self) -> Result<FilterRules, IngestError>;
}
