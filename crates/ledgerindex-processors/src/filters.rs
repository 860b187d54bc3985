//! Ingestion filtering: whitelist filterers and the filter-rule cache.
//!
//! Rules are stored by the operator in the database. [`Filters`] loads them
//! through the session at most once per refresh interval and builds one
//! filterer per enabled rule.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use ledgerindex_core::error::IngestError;
use ledgerindex_core::processor::TransactionFilterer;
use ledgerindex_core::session::{FilterRule, FilterRules, StorageSession};
use ledgerindex_core::types::{ClosedLedger, Transaction};

/// Default interval between two filter-rule reloads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

// ─── Filterers ───────────────────────────────────────────────────────────────

/// Keeps transactions with at least one operation touching a whitelisted
/// asset (`native` or `CODE:ISSUER`).
pub struct AssetFilter {
    whitelist: HashSet<String>,
}

impl AssetFilter {
    pub fn new(whitelist: impl IntoIterator<Item = String>) -> Self {
        Self {
            whitelist: whitelist.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TransactionFilterer for AssetFilter {
    fn name(&self) -> &str {
        "asset_filter"
    }

    async fn should_keep(&self, _ledger: &ClosedLedger, tx: &Transaction) -> Result<bool, IngestError> {
        let keep = tx.operations.iter().any(|op| {
            op.body
                .assets()
                .into_iter()
                .chain(op.claims.iter().flat_map(|c| [&c.asset_sold, &c.asset_bought]))
                .any(|asset| self.whitelist.contains(&asset.to_string()))
        });
        Ok(keep)
    }
}

/// Keeps transactions where a whitelisted account is the source, the fee
/// source, an operation source or an operation target.
pub struct AccountFilter {
    whitelist: HashSet<String>,
}

impl AccountFilter {
    pub fn new(whitelist: impl IntoIterator<Item = String>) -> Self {
        Self {
            whitelist: whitelist.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TransactionFilterer for AccountFilter {
    fn name(&self) -> &str {
        "account_filter"
    }

    async fn should_keep(&self, _ledger: &ClosedLedger, tx: &Transaction) -> Result<bool, IngestError> {
        Ok(tx
            .participants()
            .into_iter()
            .any(|account| self.whitelist.contains(account)))
    }
}

// ─── Rule cache ──────────────────────────────────────────────────────────────

/// Caches the stored filter rules for `refresh_interval`.
pub struct Filters {
    refresh_interval: Duration,
    rules: Option<FilterRules>,
    loaded_at: Option<Instant>,
    loads: u32,
}

impl Filters {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            rules: None,
            loaded_at: None,
            loads: 0,
        }
    }

    /// Number of times the rules were read from storage.
    pub fn loads(&self) -> u32 {
        self.loads
    }

    fn is_stale(&self) -> bool {
        match self.loaded_at {
            None => true,
            Some(at) => at.elapsed() >= self.refresh_interval,
        }
    }

    /// Current rules, reloading them if the cache is stale. A failed reload
    /// keeps serving the previous rules; with nothing cached it is an error.
    pub async fn rules(&mut self, session: &dyn StorageSession) -> Result<FilterRules, IngestError> {
        if self.is_stale() {
            match session.filter_rules().await {
                Ok(rules) => {
                    debug!(
                        asset_enabled = rules.asset.enabled,
                        account_enabled = rules.account.enabled,
                        "filter rules loaded"
                    );
                    self.rules = Some(rules);
                    self.loaded_at = Some(Instant::now());
                    self.loads += 1;
                }
                Err(e) if self.rules.is_some() => {
                    warn!(error = %e, "failed to reload filter rules, keeping cached rules");
                }
                Err(e) => return Err(e),
            }
        }
        self.rules
            .clone()
            .ok_or_else(|| IngestError::Storage("filter rules unavailable".into()))
    }

    /// One filterer per enabled rule, asset filter first.
    pub async fn filterers(
        &mut self,
        session: &dyn StorageSession,
    ) -> Result<Vec<Box<dyn TransactionFilterer>>, IngestError> {
        let rules = self.rules(session).await?;
        Ok(build_filterers(&rules))
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_INTERVAL)
    }
}

fn build_filterers(rules: &FilterRules) -> Vec<Box<dyn TransactionFilterer>> {
    let mut out: Vec<Box<dyn TransactionFilterer>> = Vec::new();
    let enabled = |rule: &FilterRule| rule.enabled.then(|| rule.whitelist.clone());
    if let Some(list) = enabled(&rules.asset) {
        out.push(Box::new(AssetFilter::new(list)));
    }
    if let Some(list) = enabled(&rules.account) {
        out.push(Box::new(AccountFilter::new(list)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ledger, payment, tx};
    use ledgerindex_storage::InMemorySession;

    fn rules(asset: Option<&str>, account: Option<&str>) -> FilterRules {
        let rule = |v: Option<&str>| FilterRule {
            enabled: v.is_some(),
            whitelist: v.map(|s| vec![s.to_string()]).unwrap_or_default(),
            last_modified: 0,
        };
        FilterRules {
            asset: rule(asset),
            account: rule(account),
        }
    }

    #[tokio::test]
    async fn asset_filter_matches_operation_assets() {
        let mut t = tx(1, true);
        t.operations.push(payment("GA", "GB"));
        let l = ledger(5, vec![t.clone()]);

        assert!(AssetFilter::new(["USD:GISSUER".to_string()]).should_keep(&l, &t).await.unwrap());
        assert!(!AssetFilter::new(["EUR:GISSUER".to_string()]).should_keep(&l, &t).await.unwrap());
        assert!(!AssetFilter::new(["USD:GISSUER".to_string()])
            .should_keep(&l, &tx(2, true))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn account_filter_matches_destinations() {
        let mut t = tx(1, true);
        t.operations.push(payment("GA", "GB"));
        let l = ledger(5, vec![t.clone()]);
        assert!(AccountFilter::new(["GB".to_string()]).should_keep(&l, &t).await.unwrap());
        assert!(!AccountFilter::new(["GZ".to_string()]).should_keep(&l, &t).await.unwrap());
    }

    #[tokio::test]
    async fn disabled_rules_build_no_filterers() {
        let session = InMemorySession::new();
        let mut filters = Filters::default();
        assert!(filters.filterers(&session).await.unwrap().is_empty());

        session.set_filter_rules(rules(Some("native"), None));
        let mut filters = Filters::default();
        let built = filters.filterers(&session).await.unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].name(), "asset_filter");
    }

    #[tokio::test]
    async fn rules_are_cached_until_refresh() {
        let session = InMemorySession::new();
        let mut filters = Filters::new(Duration::from_secs(3600));
        filters.rules(&session).await.unwrap();
        session.set_filter_rules(rules(Some("native"), Some("GA")));
        let cached = filters.rules(&session).await.unwrap();
        assert!(!cached.asset.enabled);
        assert_eq!(filters.loads(), 1);

        let mut eager = Filters::new(Duration::ZERO);
        eager.rules(&session).await.unwrap();
        eager.rules(&session).await.unwrap();
        assert_eq!(eager.loads(), 2);
    }
}
