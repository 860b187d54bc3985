//! Current-state processors for ledger entries.
//!
//! One [`EntryChangeProcessor`] per entry kind. Changes are compacted per
//! entry key while streaming, so a checkpoint or ledger with many changes to
//! the same entry stages a single write at commit:
//!
//! | first change | last post-state | staged        |
//! |--------------|-----------------|---------------|
//! | created      | present         | upsert        |
//! | created      | removed         | nothing       |
//! | updated      | present         | upsert        |
//! | updated      | removed         | removal       |

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::ChangeProcessor;
use ledgerindex_core::session::{StateRow, StateTable, StorageSession};
use ledgerindex_core::types::{Change, ChangeType, LedgerEntry, LedgerEntryKind};

#[derive(Debug)]
struct Compacted {
    existed_before: bool,
    post: Option<LedgerEntry>,
}

/// Stages the net effect of a change stream on one current-state table.
pub struct EntryChangeProcessor {
    name: &'static str,
    kind: LedgerEntryKind,
    table: StateTable,
    entries: BTreeMap<String, Compacted>,
}

impl EntryChangeProcessor {
    fn new(name: &'static str, kind: LedgerEntryKind, table: StateTable) -> Self {
        Self {
            name,
            kind,
            table,
            entries: BTreeMap::new(),
        }
    }

    pub fn accounts() -> Self {
        Self::new("accounts_processor", LedgerEntryKind::Account, StateTable::Accounts)
    }

    pub fn account_data() -> Self {
        Self::new("account_data_processor", LedgerEntryKind::Data, StateTable::AccountData)
    }

    pub fn offers() -> Self {
        Self::new("offers_processor", LedgerEntryKind::Offer, StateTable::Offers)
    }

    pub fn trust_lines() -> Self {
        Self::new("trust_lines_processor", LedgerEntryKind::TrustLine, StateTable::TrustLines)
    }

    pub fn claimable_balances() -> Self {
        Self::new(
            "claimable_balances_change_processor",
            LedgerEntryKind::ClaimableBalance,
            StateTable::ClaimableBalances,
        )
    }

    pub fn liquidity_pools() -> Self {
        Self::new(
            "liquidity_pools_change_processor",
            LedgerEntryKind::LiquidityPool,
            StateTable::LiquidityPools,
        )
    }

    /// Number of distinct entries touched so far.
    pub fn pending_entries(&self) -> usize {
        self.entries.len()
    }

    fn invalid(&self, key: &str, reason: &str) -> IngestError {
        IngestError::Processor {
            processor: self.name.to_string(),
            reason: format!("entry {key}: {reason}"),
        }
    }
}

#[async_trait]
impl ChangeProcessor for EntryChangeProcessor {
    fn name(&self) -> &str {
        self.name
    }

    async fn process_change(&mut self, change: &Change) -> Result<(), IngestError> {
        if change.kind != self.kind {
            return Ok(());
        }
        let Some(key) = change.key() else {
            return Ok(());
        };

        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(
                    key,
                    Compacted {
                        existed_before: change.pre.is_some(),
                        post: change.post.clone(),
                    },
                );
            }
            Some(current) => {
                let exists = current.post.is_some();
                match (change.change_type(), exists) {
                    (ChangeType::Created, true) => {
                        return Err(self.invalid(&key, "created while it already exists"));
                    }
                    (ChangeType::Updated | ChangeType::Removed, false) => {
                        return Err(self.invalid(&key, "changed after it was removed"));
                    }
                    _ => current.post = change.post.clone(),
                }
            }
        }
        Ok(())
    }

    async fn commit(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        let mut upserts = Vec::new();
        let mut removals = Vec::new();
        for (key, entry) in std::mem::take(&mut self.entries) {
            match entry.post {
                Some(post) => {
                    let body = serde_json::to_value(&post)
                        .map_err(|e| IngestError::Storage(e.to_string()))?;
                    upserts.push(StateRow { key, body });
                }
                None if entry.existed_before => removals.push(key),
                None => {}
            }
        }

        debug!(
            processor = self.name,
            upserts = upserts.len(),
            removals = removals.len(),
            "staging entry changes"
        );
        if !upserts.is_empty() {
            session.upsert_state(self.table, upserts).await?;
        }
        if !removals.is_empty() {
            session.remove_state(self.table, removals).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{account, created, trust_line, usd};
    use ledgerindex_storage::InMemorySession;

    #[tokio::test]
    async fn last_post_state_wins() {
        let session = InMemorySession::new();
        let mut p = EntryChangeProcessor::accounts();
        p.process_change(&created(account("GA", 10, vec![]))).await.unwrap();
        p.process_change(&Change::updated(account("GA", 10, vec![]), account("GA", 25, vec![])))
            .await
            .unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();

        let row = session.state(StateTable::Accounts, "GA").unwrap();
        assert_eq!(row["data"]["balance"], 25);
        assert_eq!(p.pending_entries(), 0);
    }

    #[tokio::test]
    async fn create_then_remove_stages_nothing() {
        let session = InMemorySession::new();
        let mut p = EntryChangeProcessor::accounts();
        p.process_change(&created(account("GA", 10, vec![]))).await.unwrap();
        p.process_change(&Change::removed(account("GA", 10, vec![]))).await.unwrap();
        p.commit(&session).await.unwrap();
        assert!(session.pending_is_empty());
    }

    #[tokio::test]
    async fn removal_of_existing_entry_is_staged() {
        let session = InMemorySession::new();
        let mut p = EntryChangeProcessor::trust_lines();
        p.process_change(&created(trust_line("GA", usd(), 5))).await.unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(session.state_count(StateTable::TrustLines), 1);

        p.process_change(&Change::removed(trust_line("GA", usd(), 5))).await.unwrap();
        p.commit(&session).await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(session.state_count(StateTable::TrustLines), 0);
    }

    #[tokio::test]
    async fn ignores_other_kinds() {
        let mut p = EntryChangeProcessor::offers();
        p.process_change(&created(account("GA", 1, vec![]))).await.unwrap();
        assert_eq!(p.pending_entries(), 0);
    }

    #[tokio::test]
    async fn double_create_is_an_error() {
        let mut p = EntryChangeProcessor::accounts();
        p.process_change(&created(account("GA", 1, vec![]))).await.unwrap();
        let err = p
            .process_change(&created(account("GA", 1, vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Processor { .. }));
    }
}
