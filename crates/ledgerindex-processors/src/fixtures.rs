//! Builders used by the unit tests of this crate.

use ledgerindex_core::types::{
    AccountEntry, Asset, Change, ClaimAtom, ClosedLedger, Hash, LedgerEntry, LedgerEntryData,
    LedgerHeader, Operation, OperationBody, Signer, Transaction, TrustLineEntry,
};

pub fn tx(index: u32, successful: bool) -> Transaction {
    Transaction {
        index,
        hash: Hash::sha256(index.to_be_bytes()),
        source_account: format!("GSRC{index}"),
        fee_account: None,
        fee_charged: 100,
        max_fee: 200,
        successful,
        memo: None,
        operations: vec![],
        fee_changes: vec![],
        meta_changes: vec![],
    }
}

pub fn ledger(sequence: u32, transactions: Vec<Transaction>) -> ClosedLedger {
    ClosedLedger {
        header: LedgerHeader {
            sequence,
            protocol_version: 20,
            close_time: 1_700_000_000,
            hash: Hash::sha256(sequence.to_be_bytes()),
            previous_hash: Hash::sha256(sequence.saturating_sub(1).to_be_bytes()),
            bucket_list_hash: Hash::ZERO,
            total_coins: 1_000,
            fee_pool: 10,
            base_fee: 100,
            base_reserve: 5_000_000,
            max_tx_set_size: 1000,
        },
        transactions,
        upgrade_changes: vec![],
    }
}

pub fn usd() -> Asset {
    Asset::credit("USD", "GISSUER")
}

pub fn payment(source: &str, destination: &str) -> Operation {
    Operation {
        source_account: Some(source.to_string()),
        body: OperationBody::Payment {
            destination: destination.to_string(),
            asset: usd(),
            amount: 50,
        },
        claims: vec![],
    }
}

pub fn sell_offer(source: &str, claims: Vec<ClaimAtom>) -> Operation {
    Operation {
        source_account: Some(source.to_string()),
        body: OperationBody::ManageSellOffer {
            selling: Asset::Native,
            buying: usd(),
            amount: 100,
            price_n: 1,
            price_d: 2,
            offer_id: 0,
        },
        claims,
    }
}

pub fn claim(seller: &str, offer_id: i64) -> ClaimAtom {
    ClaimAtom {
        seller_id: Some(seller.to_string()),
        liquidity_pool_id: None,
        offer_id,
        asset_sold: usd(),
        amount_sold: 10,
        asset_bought: Asset::Native,
        amount_bought: 20,
    }
}

pub fn account(id: &str, balance: i64, signers: Vec<(&str, u32)>) -> LedgerEntry {
    LedgerEntry::new(
        2,
        LedgerEntryData::Account(AccountEntry {
            account_id: id.to_string(),
            balance,
            seq_num: 1,
            num_sub_entries: 0,
            flags: 0,
            home_domain: String::new(),
            thresholds: [1, 0, 0, 0],
            signers: signers
                .into_iter()
                .map(|(key, weight)| Signer {
                    key: key.to_string(),
                    weight,
                })
                .collect(),
        }),
    )
}

pub fn trust_line(account_id: &str, asset: Asset, balance: i64) -> LedgerEntry {
    LedgerEntry::new(
        2,
        LedgerEntryData::TrustLine(TrustLineEntry {
            account_id: account_id.to_string(),
            asset,
            balance,
            limit: i64::MAX,
            flags: 1,
        }),
    )
}

pub fn created(entry: LedgerEntry) -> Change {
    Change::created(entry)
}
