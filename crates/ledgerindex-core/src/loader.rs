//! Lazy loaders: deferred bulk resolution of history ids.
//!
//! During processing, transaction processors ask a [`Loader`] for a
//! [`LoaderFuture`] per account/asset/pool/balance key instead of querying the
//! database row by row. When the transaction group flushes, every loader
//! resolves all requested keys in a single `resolve_ids` round trip, and only
//! then do processors turn their futures into concrete ids.
//!
//! One loader per kind is created per call and shared (via `Arc`) between all
//! processors that need it. A loader is sealed by `exec`; asking it for a new
//! future afterwards is an error.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::IngestError;
use crate::session::{LookupKind, StorageSession};

/// A unit of deferred work executed before the transaction group flushes.
#[async_trait]
pub trait LazyLoader: Send + Sync {
    /// Stable name used for durations and log lines.
    fn name(&self) -> &str;

    /// Resolve everything requested so far.
    async fn exec(&self, session: &dyn StorageSession) -> Result<(), IngestError>;
}

#[derive(Default)]
struct LoaderState {
    pending: BTreeSet<String>,
    resolved: HashMap<String, i64>,
    sealed: bool,
}

/// Bulk id resolver for one [`LookupKind`].
pub struct Loader {
    kind: LookupKind,
    name: String,
    state: Mutex<LoaderState>,
}

impl Loader {
    pub fn new(kind: LookupKind) -> Arc<Self> {
        let name = match kind {
            LookupKind::Account => "account_loader",
            LookupKind::Asset => "asset_loader",
            LookupKind::LiquidityPool => "liquidity_pool_loader",
            LookupKind::ClaimableBalance => "claimable_balance_loader",
        };
        Arc::new(Self {
            kind,
            name: name.to_string(),
            state: Mutex::new(LoaderState::default()),
        })
    }

    pub fn kind(&self) -> LookupKind {
        self.kind
    }

    /// Register `key` for resolution and return a handle to its future id.
    pub fn get_future(self: &Arc<Self>, key: impl Into<String>) -> Result<LoaderFuture, IngestError> {
        let key = key.into();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.sealed {
            return Err(IngestError::Loader(format!(
                "{} is sealed, cannot register key {key}",
                self.name
            )));
        }
        state.pending.insert(key.clone());
        Ok(LoaderFuture {
            key,
            loader: Arc::clone(self),
        })
    }

    /// The resolved id of `key`. Only valid after `exec`.
    pub fn get_now(&self, key: &str) -> Result<i64, IngestError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.sealed {
            return Err(IngestError::Loader(format!(
                "{} has not been executed, cannot resolve {key}",
                self.name
            )));
        }
        state.resolved.get(key).copied().ok_or_else(|| {
            IngestError::Loader(format!("{}: key {key} was never registered", self.name))
        })
    }

    /// Number of distinct keys registered so far.
    pub fn requested(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).pending.len()
    }
}

#[async_trait]
impl LazyLoader for Loader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, session: &dyn StorageSession) -> Result<(), IngestError> {
        let keys: Vec<String> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.sealed = true;
            state.pending.iter().cloned().collect()
        };
        if keys.is_empty() {
            return Ok(());
        }

        let resolved = session.resolve_ids(self.kind, keys.clone()).await?;
        if let Some(missing) = keys.iter().find(|k| !resolved.contains_key(*k)) {
            return Err(IngestError::Loader(format!(
                "{}: session did not resolve key {missing}",
                self.name
            )));
        }

        debug!(loader = %self.name, keys = keys.len(), "lazy loader executed");
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolved
            .extend(resolved);
        Ok(())
    }
}

/// A handle to an id that becomes available after its loader executes.
#[derive(Clone)]
pub struct LoaderFuture {
    key: String,
    loader: Arc<Loader>,
}

impl LoaderFuture {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The resolved id.
    pub fn value(&self) -> Result<i64, IngestError> {
        self.loader.get_now(&self.key)
    }
}

impl std::fmt::Debug for LoaderFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderFuture")
            .field("kind", &self.loader.kind)
            .field("key", &self.key)
            .finish()
    }
}

/// The four loaders shared by the transaction processors of one call.
#[derive(Clone)]
pub struct Loaders {
    pub accounts: Arc<Loader>,
    pub assets: Arc<Loader>,
    pub liquidity_pools: Arc<Loader>,
    pub claimable_balances: Arc<Loader>,
}

impl Loaders {
    pub fn new() -> Self {
        Self {
            accounts: Loader::new(LookupKind::Account),
            assets: Loader::new(LookupKind::Asset),
            liquidity_pools: Loader::new(LookupKind::LiquidityPool),
            claimable_balances: Loader::new(LookupKind::ClaimableBalance),
        }
    }

    /// All loaders, in execution order.
    pub fn all(&self) -> Vec<Arc<dyn LazyLoader>> {
        vec![
            self.accounts.clone() as Arc<dyn LazyLoader>,
            self.assets.clone() as Arc<dyn LazyLoader>,
            self.liquidity_pools.clone() as Arc<dyn LazyLoader>,
            self.claimable_balances.clone() as Arc<dyn LazyLoader>,
        ]
    }
}

impl Default for Loaders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;

    #[tokio::test]
    async fn futures_resolve_after_exec() {
        let session = RecordingSession::new();
        let loader = Loader::new(LookupKind::Account);
        let a = loader.get_future("GA").unwrap();
        let b = loader.get_future("GB").unwrap();
        let a2 = loader.get_future("GA").unwrap();
        assert_eq!(loader.requested(), 2);

        // Not resolvable before exec.
        assert!(a.value().is_err());

        loader.exec(&session).await.unwrap();
        assert_eq!(a.value().unwrap(), a2.value().unwrap());
        assert_ne!(a.value().unwrap(), b.value().unwrap());
        assert_eq!(session.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn sealed_loader_rejects_new_keys() {
        let session = RecordingSession::new();
        let loader = Loader::new(LookupKind::Asset);
        loader.exec(&session).await.unwrap();
        // Nothing was requested, so no round trip happened.
        assert_eq!(session.resolve_calls(), 0);
        assert!(matches!(
            loader.get_future("native"),
            Err(IngestError::Loader(_))
        ));
    }

    #[test]
    fn loaders_in_fixed_order() {
        let names: Vec<String> = Loaders::new()
            .all()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "account_loader",
                "asset_loader",
                "liquidity_pool_loader",
                "claimable_balance_loader"
            ]
        );
    }
}
