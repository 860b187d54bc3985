//! Shared types for the ingestion pipeline.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

// ─── Hash ─────────────────────────────────────────────────────────────────────

/// A 32-byte hash (ledger hash, bucket list hash, transaction hash).
///
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// SHA-256 of `data`.
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(data.as_ref());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Parse a hex string (with or without a `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ─── Asset ────────────────────────────────────────────────────────────────────

/// An asset: the native lumen or an issued credit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    Native,
    Credit { code: String, issuer: String },
}

impl Asset {
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self::Credit {
            code: code.into(),
            issuer: issuer.into(),
        }
    }

    /// The issuing account, if any.
    pub fn issuer(&self) -> Option<&str> {
        match self {
            Self::Native => None,
            Self::Credit { issuer, .. } => Some(issuer),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Credit { code, issuer } => write!(f, "{code}:{issuer}"),
        }
    }
}

// ─── Ledger entries ───────────────────────────────────────────────────────────

/// The kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Account,
    TrustLine,
    Offer,
    Data,
    ClaimableBalance,
    LiquidityPool,
}

impl fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Account => "account",
            Self::TrustLine => "trust_line",
            Self::Offer => "offer",
            Self::Data => "data",
            Self::ClaimableBalance => "claimable_balance",
            Self::LiquidityPool => "liquidity_pool",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub key: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
    pub balance: i64,
    pub seq_num: i64,
    #[serde(default)]
    pub num_sub_entries: u32,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub home_domain: String,
    /// Master weight, low, medium, high.
    pub thresholds: [u8; 4],
    #[serde(default)]
    pub signers: Vec<Signer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLineEntry {
    pub account_id: String,
    pub asset: Asset,
    pub balance: i64,
    pub limit: i64,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub seller_id: String,
    pub offer_id: i64,
    pub selling: Asset,
    pub buying: Asset,
    pub amount: i64,
    pub price_n: i32,
    pub price_d: i32,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub account_id: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalanceEntry {
    pub balance_id: String,
    pub asset: Asset,
    pub amount: i64,
    #[serde(default)]
    pub claimants: Vec<String>,
    #[serde(default)]
    pub sponsor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolEntry {
    pub pool_id: String,
    pub asset_a: Asset,
    pub asset_b: Asset,
    pub fee_bp: u32,
    pub reserve_a: i64,
    pub reserve_b: i64,
    pub total_shares: i64,
    #[serde(default)]
    pub trustline_count: i64,
}

/// Typed body of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEntryData {
    Account(AccountEntry),
    TrustLine(TrustLineEntry),
    Offer(OfferEntry),
    Data(DataEntry),
    ClaimableBalance(ClaimableBalanceEntry),
    LiquidityPool(LiquidityPoolEntry),
}

/// One ledger entry as of some ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub last_modified_ledger: u32,
    pub data: LedgerEntryData,
}

impl LedgerEntry {
    pub fn new(last_modified_ledger: u32, data: LedgerEntryData) -> Self {
        Self {
            last_modified_ledger,
            data,
        }
    }

    pub fn kind(&self) -> LedgerEntryKind {
        match &self.data {
            LedgerEntryData::Account(_) => LedgerEntryKind::Account,
            LedgerEntryData::TrustLine(_) => LedgerEntryKind::TrustLine,
            LedgerEntryData::Offer(_) => LedgerEntryKind::Offer,
            LedgerEntryData::Data(_) => LedgerEntryKind::Data,
            LedgerEntryData::ClaimableBalance(_) => LedgerEntryKind::ClaimableBalance,
            LedgerEntryData::LiquidityPool(_) => LedgerEntryKind::LiquidityPool,
        }
    }

    /// Stable identity of the entry within its kind.
    pub fn key(&self) -> String {
        match &self.data {
            LedgerEntryData::Account(a) => a.account_id.clone(),
            LedgerEntryData::TrustLine(t) => format!("{}:{}", t.account_id, t.asset),
            LedgerEntryData::Offer(o) => o.offer_id.to_string(),
            LedgerEntryData::Data(d) => format!("{}:{}", d.account_id, d.name),
            LedgerEntryData::ClaimableBalance(c) => c.balance_id.clone(),
            LedgerEntryData::LiquidityPool(p) => p.pool_id.clone(),
        }
    }
}

// ─── Change ───────────────────────────────────────────────────────────────────

/// Whether a change created, updated or removed its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Removed,
}

/// One entry-level state mutation.
///
/// `pre` is `None` for a creation, `post` is `None` for a removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: LedgerEntryKind,
    pub pre: Option<LedgerEntry>,
    pub post: Option<LedgerEntry>,
}

/// Balance of the root account at genesis, in stroops.
pub const GENESIS_ROOT_BALANCE: i64 = 1_000_000_000_000_000_000;

impl Change {
    pub fn created(entry: LedgerEntry) -> Self {
        Self {
            kind: entry.kind(),
            pre: None,
            post: Some(entry),
        }
    }

    pub fn updated(pre: LedgerEntry, post: LedgerEntry) -> Self {
        Self {
            kind: post.kind(),
            pre: Some(pre),
            post: Some(post),
        }
    }

    pub fn removed(entry: LedgerEntry) -> Self {
        Self {
            kind: entry.kind(),
            pre: Some(entry),
            post: None,
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match (&self.pre, &self.post) {
            (None, _) => ChangeType::Created,
            (Some(_), None) => ChangeType::Removed,
            (Some(_), Some(_)) => ChangeType::Updated,
        }
    }

    /// The post-state if present, otherwise the pre-state.
    pub fn entry(&self) -> Option<&LedgerEntry> {
        self.post.as_ref().or(self.pre.as_ref())
    }

    /// Key of the affected entry.
    pub fn key(&self) -> Option<String> {
        self.entry().map(LedgerEntry::key)
    }

    /// The synthetic change that creates the root account of a network.
    pub fn genesis(network_passphrase: &str) -> Self {
        Self::created(LedgerEntry::new(
            1,
            LedgerEntryData::Account(AccountEntry {
                account_id: root_account_id(network_passphrase),
                balance: GENESIS_ROOT_BALANCE,
                seq_num: 0,
                num_sub_entries: 0,
                flags: 0,
                home_domain: String::new(),
                thresholds: [1, 0, 0, 0],
                signers: vec![],
            }),
        ))
    }
}

/// Network id: SHA-256 of the network passphrase.
pub fn network_id(network_passphrase: &str) -> Hash {
    Hash::sha256(network_passphrase.as_bytes())
}

/// Root account id of the network identified by `network_passphrase`.
pub fn root_account_id(network_passphrase: &str) -> String {
    format!("G{}", hex::encode_upper(network_id(network_passphrase).0))
}

// ─── Operations and transactions ──────────────────────────────────────────────

/// One offer or pool claim made while an operation crossed the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAtom {
    /// Seller of the crossed offer; `None` when a liquidity pool was crossed.
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub liquidity_pool_id: Option<String>,
    #[serde(default)]
    pub offer_id: i64,
    pub asset_sold: Asset,
    pub amount_sold: i64,
    pub asset_bought: Asset,
    pub amount_bought: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationBody {
    CreateAccount {
        destination: String,
        starting_balance: i64,
    },
    Payment {
        destination: String,
        asset: Asset,
        amount: i64,
    },
    PathPaymentStrictReceive {
        destination: String,
        send_asset: Asset,
        dest_asset: Asset,
        dest_amount: i64,
        #[serde(default)]
        path: Vec<Asset>,
    },
    PathPaymentStrictSend {
        destination: String,
        send_asset: Asset,
        send_amount: i64,
        dest_asset: Asset,
        #[serde(default)]
        path: Vec<Asset>,
    },
    ManageSellOffer {
        selling: Asset,
        buying: Asset,
        amount: i64,
        price_n: i32,
        price_d: i32,
        offer_id: i64,
    },
    ManageBuyOffer {
        selling: Asset,
        buying: Asset,
        buy_amount: i64,
        price_n: i32,
        price_d: i32,
        offer_id: i64,
    },
    CreatePassiveSellOffer {
        selling: Asset,
        buying: Asset,
        amount: i64,
        price_n: i32,
        price_d: i32,
    },
    SetOptions {
        #[serde(default)]
        signer: Option<Signer>,
        #[serde(default)]
        home_domain: Option<String>,
    },
    ChangeTrust {
        asset: Asset,
        limit: i64,
    },
    AccountMerge {
        destination: String,
    },
    ManageData {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    BumpSequence {
        bump_to: i64,
    },
    CreateClaimableBalance {
        asset: Asset,
        amount: i64,
        #[serde(default)]
        claimants: Vec<String>,
    },
    ClaimClaimableBalance {
        balance_id: String,
    },
    ClawbackClaimableBalance {
        balance_id: String,
    },
    LiquidityPoolDeposit {
        liquidity_pool_id: String,
        max_amount_a: i64,
        max_amount_b: i64,
    },
    LiquidityPoolWithdraw {
        liquidity_pool_id: String,
        amount: i64,
    },
}

impl OperationBody {
    /// Stable snake_case name of the operation type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateAccount { .. } => "create_account",
            Self::Payment { .. } => "payment",
            Self::PathPaymentStrictReceive { .. } => "path_payment_strict_receive",
            Self::PathPaymentStrictSend { .. } => "path_payment_strict_send",
            Self::ManageSellOffer { .. } => "manage_sell_offer",
            Self::ManageBuyOffer { .. } => "manage_buy_offer",
            Self::CreatePassiveSellOffer { .. } => "create_passive_sell_offer",
            Self::SetOptions { .. } => "set_options",
            Self::ChangeTrust { .. } => "change_trust",
            Self::AccountMerge { .. } => "account_merge",
            Self::ManageData { .. } => "manage_data",
            Self::BumpSequence { .. } => "bump_sequence",
            Self::CreateClaimableBalance { .. } => "create_claimable_balance",
            Self::ClaimClaimableBalance { .. } => "claim_claimable_balance",
            Self::ClawbackClaimableBalance { .. } => "clawback_claimable_balance",
            Self::LiquidityPoolDeposit { .. } => "liquidity_pool_deposit",
            Self::LiquidityPoolWithdraw { .. } => "liquidity_pool_withdraw",
        }
    }

    /// Accounts referenced by the operation body (not including its source).
    pub fn accounts(&self) -> Vec<&str> {
        match self {
            Self::CreateAccount { destination, .. }
            | Self::Payment { destination, .. }
            | Self::PathPaymentStrictReceive { destination, .. }
            | Self::PathPaymentStrictSend { destination, .. }
            | Self::AccountMerge { destination } => vec![destination.as_str()],
            Self::CreateClaimableBalance { claimants, .. } => {
                claimants.iter().map(String::as_str).collect()
            }
            _ => vec![],
        }
    }

    /// Assets referenced by the operation body.
    pub fn assets(&self) -> Vec<&Asset> {
        match self {
            Self::Payment { asset, .. }
            | Self::ChangeTrust { asset, .. }
            | Self::CreateClaimableBalance { asset, .. } => vec![asset],
            Self::PathPaymentStrictReceive {
                send_asset,
                dest_asset,
                path,
                ..
            }
            | Self::PathPaymentStrictSend {
                send_asset,
                dest_asset,
                path,
                ..
            } => {
                let mut out = vec![send_asset, dest_asset];
                out.extend(path.iter());
                out
            }
            Self::ManageSellOffer { selling, buying, .. }
            | Self::ManageBuyOffer { selling, buying, .. }
            | Self::CreatePassiveSellOffer { selling, buying, .. } => vec![selling, buying],
            _ => vec![],
        }
    }
}

/// One operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation-level source; falls back to the transaction source.
    #[serde(default)]
    pub source_account: Option<String>,
    pub body: OperationBody,
    /// Trades produced by the operation (only for successful transactions).
    #[serde(default)]
    pub claims: Vec<ClaimAtom>,
}

/// One ledger transaction together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// 1-based application order within the ledger.
    pub index: u32,
    pub hash: Hash,
    pub source_account: String,
    /// Fee source for fee-bump transactions.
    #[serde(default)]
    pub fee_account: Option<String>,
    pub fee_charged: i64,
    pub max_fee: i64,
    pub successful: bool,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Changes caused by charging the fee.
    #[serde(default)]
    pub fee_changes: Vec<Change>,
    /// Changes caused by applying the operations.
    #[serde(default)]
    pub meta_changes: Vec<Change>,
}

impl Transaction {
    /// The effective source account of `op`.
    pub fn operation_source<'a>(&'a self, op: &'a Operation) -> &'a str {
        op.source_account.as_deref().unwrap_or(&self.source_account)
    }

    /// Every account touched by the transaction: sources, fee source and
    /// accounts referenced by operation bodies.
    pub fn participants(&self) -> Vec<&str> {
        let mut out = vec![self.source_account.as_str()];
        if let Some(fee) = &self.fee_account {
            out.push(fee);
        }
        for op in &self.operations {
            out.push(self.operation_source(op));
            out.extend(op.body.accounts());
        }
        let mut seen = std::collections::HashSet::new();
        out.retain(|a| seen.insert(*a));
        out
    }
}

// ─── Ledger ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    pub sequence: u32,
    pub protocol_version: u32,
    /// Unix timestamp of ledger close (seconds since epoch).
    pub close_time: i64,
    pub hash: Hash,
    pub previous_hash: Hash,
    pub bucket_list_hash: Hash,
    #[serde(default)]
    pub total_coins: i64,
    #[serde(default)]
    pub fee_pool: i64,
    #[serde(default)]
    pub base_fee: u32,
    #[serde(default)]
    pub base_reserve: u32,
    #[serde(default)]
    pub max_tx_set_size: u32,
}

/// One closed ledger: header, applied transactions and upgrade changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedLedger {
    pub header: LedgerHeader,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub upgrade_changes: Vec<Change>,
}

impl ClosedLedger {
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn protocol_version(&self) -> u32 {
        self.header.protocol_version
    }

    pub fn close_time(&self) -> i64 {
        self.header.close_time
    }

    pub fn successful_transaction_count(&self) -> usize {
        self.transactions.iter().filter(|t| t.successful).count()
    }

    pub fn failed_transaction_count(&self) -> usize {
        self.transactions.len() - self.successful_transaction_count()
    }

    /// Operations in successful transactions.
    pub fn operation_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.successful)
            .map(|t| t.operations.len())
            .sum()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, balance: i64) -> LedgerEntry {
        LedgerEntry::new(
            10,
            LedgerEntryData::Account(AccountEntry {
                account_id: id.into(),
                balance,
                seq_num: 1,
                num_sub_entries: 0,
                flags: 0,
                home_domain: String::new(),
                thresholds: [1, 0, 0, 0],
                signers: vec![],
            }),
        )
    }

    #[test]
    fn change_type_from_pre_post() {
        assert_eq!(Change::created(account("GA", 1)).change_type(), ChangeType::Created);
        assert_eq!(
            Change::updated(account("GA", 1), account("GA", 2)).change_type(),
            ChangeType::Updated
        );
        assert_eq!(Change::removed(account("GA", 1)).change_type(), ChangeType::Removed);
    }

    #[test]
    fn genesis_creates_root_account() {
        let change = Change::genesis("Test SDF Network ; September 2015");
        assert_eq!(change.change_type(), ChangeType::Created);
        assert_eq!(change.kind, LedgerEntryKind::Account);
        let post = change.post.unwrap();
        assert_eq!(post.last_modified_ledger, 1);
        match post.data {
            LedgerEntryData::Account(a) => {
                assert_eq!(a.balance, GENESIS_ROOT_BALANCE);
                assert_eq!(a.seq_num, 0);
                assert_eq!(a.thresholds, [1, 0, 0, 0]);
                assert_eq!(a.account_id, root_account_id("Test SDF Network ; September 2015"));
            }
            other => panic!("unexpected genesis entry: {other:?}"),
        }
    }

    #[test]
    fn root_account_depends_on_network() {
        assert_ne!(root_account_id("net a"), root_account_id("net b"));
    }

    #[test]
    fn asset_display() {
        assert_eq!(Asset::Native.to_string(), "native");
        assert_eq!(Asset::credit("USD", "GISSUER").to_string(), "USD:GISSUER");
    }

    #[test]
    fn hash_hex_parsing() {
        let h = Hash::sha256(b"abc");
        assert_eq!(Hash::from_hex(&h.to_string()).unwrap(), h);
        assert_eq!(Hash::from_hex(&format!("0x{h}")).unwrap(), h);
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn trust_line_key_includes_asset() {
        let tl = LedgerEntry::new(
            5,
            LedgerEntryData::TrustLine(TrustLineEntry {
                account_id: "GA".into(),
                asset: Asset::credit("EUR", "GI"),
                balance: 0,
                limit: 100,
                flags: 0,
            }),
        );
        assert_eq!(tl.key(), "GA:EUR:GI");
        assert_eq!(tl.kind(), LedgerEntryKind::TrustLine);
    }

    #[test]
    fn participants_are_deduplicated() {
        let tx = Transaction {
            index: 1,
            hash: Hash::ZERO,
            source_account: "GA".into(),
            fee_account: None,
            fee_charged: 100,
            max_fee: 100,
            successful: true,
            memo: None,
            operations: vec![
                Operation {
                    source_account: None,
                    body: OperationBody::Payment {
                        destination: "GB".into(),
                        asset: Asset::Native,
                        amount: 5,
                    },
                    claims: vec![],
                },
                Operation {
                    source_account: Some("GB".into()),
                    body: OperationBody::Payment {
                        destination: "GA".into(),
                        asset: Asset::Native,
                        amount: 5,
                    },
                    claims: vec![],
                },
            ],
            fee_changes: vec![],
            meta_changes: vec![],
        };
        assert_eq!(tx.participants(), vec!["GA", "GB"]);
    }
}
