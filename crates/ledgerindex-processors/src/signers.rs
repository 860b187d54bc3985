//! Account signers, derived from account entries.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Serialize;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::ChangeProcessor;
use ledgerindex_core::session::{StateRow, StateTable, StorageSession};
use ledgerindex_core::types::{Change, LedgerEntry, LedgerEntryData, LedgerEntryKind};

#[derive(Debug, Serialize)]
struct SignerRow<'a> {
    account_id: &'a str,
    signer: &'a str,
    weight: u32,
    last_modified_ledger: u32,
}

#[derive(Debug, Default)]
struct AccountSigners {
    before: BTreeSet<String>,
    after: Option<LedgerEntry>,
}

fn signer_keys(entry: Option<&LedgerEntry>) -> BTreeSet<String> {
    match entry.map(|e| &e.data) {
        Some(LedgerEntryData::Account(a)) => a.signers.iter().map(|s| s.key.clone()).collect(),
        _ => BTreeSet::new(),
    }
}

/// Keeps one `account:signer` row per signer of every account.
#[derive(Default)]
pub struct SignersProcessor {
    accounts: BTreeMap<String, AccountSigners>,
}

impl SignersProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeProcessor for SignersProcessor {
    fn name(&self) -> &str {
        "signers_processor"
    }

    async fn process_change(&mut self, change: &Change) -> Result<(), IngestError> {
        if change.kind != LedgerEntryKind::Account {
            return Ok(());
        }
        let Some(key) = change.key() else {
            return Ok(());
        };
        let slot = self.accounts.entry(key).or_insert_with(|| AccountSigners {
            before: signer_keys(change.pre.as_ref()),
            after: None,
        });
        slot.after = change.post.clone();
        Ok(())
    }

    async fn commit(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        let mut upserts = Vec::new();
        let mut removals = Vec::new();

        for (account_id, signers) in std::mem::take(&mut self.accounts) {
            let after = signer_keys(signers.after.as_ref());
            for gone in signers.before.difference(&after) {
                removals.push(format!("{account_id}:{gone}"));
            }
            let Some(entry) = &signers.after else {
                continue;
            };
            let LedgerEntryData::Account(account) = &entry.data else {
                continue;
            };
            for signer in &account.signers {
                let row = SignerRow {
                    account_id: &account_id,
                    signer: &signer.key,
                    weight: signer.weight,
                    last_modified_ledger: entry.last_modified_ledger,
                };
                upserts.push(StateRow {
                    key: format!("{account_id}:{}", signer.key),
                    body: serde_json::to_value(&row)
                        .map_err(|e| IngestError::Storage(e.to_string()))?,
                });
            }
        }

        if !upserts.is_empty() {
            session.upsert_state(StateTable::Signers, upserts).await?;
        }
        if !removals.is_empty() {
            session.remove_state(StateTable::Signers, removals).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{account, created};
    use ledgerindex_storage::InMemorySession;

    #[tokio::test]
    async fn replaced_signer_is_removed() {
        let session = InMemorySession::new();
        let mut p = SignersProcessor::new();
        p.process_change(&created(account("GA", 1, vec![("GK1", 1)]))).await.unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();
        assert!(session.state(StateTable::Signers, "GA:GK1").is_some());

        p.process_change(&Change::updated(
            account("GA", 1, vec![("GK1", 1)]),
            account("GA", 1, vec![("GK2", 5)]),
        ))
        .await
        .unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();

        assert!(session.state(StateTable::Signers, "GA:GK1").is_none());
        let row = session.state(StateTable::Signers, "GA:GK2").unwrap();
        assert_eq!(row["weight"], 5);
    }

    #[tokio::test]
    async fn removed_account_drops_all_signers() {
        let session = InMemorySession::new();
        let mut p = SignersProcessor::new();
        p.process_change(&Change::removed(account("GA", 1, vec![("GK1", 1), ("GK2", 1)])))
            .await
            .unwrap();
        p.commit(&session).await.unwrap();
        let loaded = session
            .load_state(StateTable::Signers, vec!["GA:GK1".into(), "GA:GK2".into()])
            .await
            .unwrap();
        assert!(loaded.is_empty());
        assert!(!session.pending_is_empty());
    }
}
