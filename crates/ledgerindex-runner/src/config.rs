//! Runner configuration and its fluent builder.
//!
//! # Example
//!
//! ```rust
//! use ledgerindex_runner::RunnerBuilder;
//!
//! let config = RunnerBuilder::new()
//!     .network_passphrase("Test SDF Network ; September 2015")
//!     .enable_ingestion_filtering(true)
//!     .filtered_tmp_gc_period_secs(600)
//!     .build_config();
//! assert!(config.enable_ingestion_filtering);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of a [`ProcessorRunner`](crate::ProcessorRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Passphrase of the network; determines the genesis root account.
    pub network_passphrase: String,
    /// Highest ledger protocol version this build can ingest.
    pub max_supported_protocol_version: u32,
    /// Route transactions through the filter group and keep dropped ones in
    /// the filtered-tmp table.
    pub enable_ingestion_filtering: bool,
    /// Age after which filtered-tmp rows are swept, and the minimum time
    /// between two sweeps.
    pub filtered_tmp_gc_period_secs: u64,
    /// Emit a progress line every N streamed items (0 disables them).
    pub log_frequency: u64,
    /// Add process RSS to progress lines.
    pub log_memory_stats: bool,
    /// How long filter rules are served from cache.
    pub filter_refresh_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            network_passphrase: "Test SDF Network ; September 2015".into(),
            max_supported_protocol_version: 21,
            enable_ingestion_filtering: false,
            filtered_tmp_gc_period_secs: 300,
            log_frequency: 50_000,
            log_memory_stats: false,
            filter_refresh_interval_secs: 10,
        }
    }
}

impl RunnerConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn filtered_tmp_gc_period(&self) -> Duration {
        Duration::from_secs(self.filtered_tmp_gc_period_secs)
    }

    pub fn filter_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.filter_refresh_interval_secs)
    }
}

/// Fluent builder for [`RunnerConfig`].
#[derive(Default)]
pub struct RunnerBuilder {
    config: RunnerConfig,
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
        }
    }

    pub fn network_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.config.network_passphrase = passphrase.into();
        self
    }

    pub fn max_supported_protocol_version(mut self, version: u32) -> Self {
        self.config.max_supported_protocol_version = version;
        self
    }

    pub fn enable_ingestion_filtering(mut self, enabled: bool) -> Self {
        self.config.enable_ingestion_filtering = enabled;
        self
    }

    pub fn filtered_tmp_gc_period_secs(mut self, secs: u64) -> Self {
        self.config.filtered_tmp_gc_period_secs = secs;
        self
    }

    /// Set the progress-line frequency (items between two lines).
    pub fn log_frequency(mut self, n: u64) -> Self {
        self.config.log_frequency = n;
        self
    }

    pub fn log_memory_stats(mut self, enabled: bool) -> Self {
        self.config.log_memory_stats = enabled;
        self
    }

    pub fn filter_refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.filter_refresh_interval_secs = secs;
        self
    }

    pub fn build_config(self) -> RunnerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = RunnerBuilder::new().build_config();
        assert_eq!(cfg.max_supported_protocol_version, 21);
        assert_eq!(cfg.filtered_tmp_gc_period(), Duration::from_secs(300));
        assert_eq!(cfg.log_frequency, 50_000);
        assert!(!cfg.enable_ingestion_filtering);
    }

    #[test]
    fn builder_custom() {
        let cfg = RunnerBuilder::new()
            .network_passphrase("Public Global Stellar Network ; September 2015")
            .max_supported_protocol_version(20)
            .log_frequency(10)
            .log_memory_stats(true)
            .filter_refresh_interval_secs(1)
            .build_config();
        assert_eq!(cfg.max_supported_protocol_version, 20);
        assert_eq!(cfg.log_frequency, 10);
        assert!(cfg.log_memory_stats);
        assert_eq!(cfg.filter_refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = RunnerConfig::from_json(r#"{ "enable_ingestion_filtering": true }"#).unwrap();
        assert!(cfg.enable_ingestion_filtering);
        assert_eq!(cfg.filter_refresh_interval_secs, 10);
    }
}
