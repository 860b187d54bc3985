//! Progress logging for long streams.
//!
//! [`LoggingReader`] wraps a change or transaction reader and every
//! `frequency` items emits an `info!` line with the item count and
//! throughput, plus the process RSS when memory-stats logging is on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use crate::error::IngestError;
use crate::reader::{ChangeReader, TransactionReader};
use crate::types::{Change, Transaction};

/// Runtime on/off switch for memory statistics in progress lines.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatsFlag(Arc<AtomicBool>);

impl MemoryStatsFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Resident set size of this process in MB, read from `/proc/self/status`.
/// `None` on non-Linux platforms or if the file can't be read.
pub fn rss_mb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            // "VmRSS:    123456 kB"
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

/// A reader wrapper that logs progress every `frequency` items.
pub struct LoggingReader<R> {
    inner: R,
    source: &'static str,
    sequence: u32,
    frequency: u64,
    memory_stats: MemoryStatsFlag,
    count: u64,
    started: Instant,
    finished: bool,
}

impl<R> LoggingReader<R> {
    /// `source` names the stream origin (`"historyArchive"`, `"ledger"`).
    /// A `frequency` of 0 disables the periodic lines.
    pub fn new(
        inner: R,
        source: &'static str,
        sequence: u32,
        frequency: u64,
        memory_stats: MemoryStatsFlag,
    ) -> Self {
        Self {
            inner,
            source,
            sequence,
            frequency,
            memory_stats,
            count: 0,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Items read so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }

    fn observe<T>(&mut self, item: &Option<T>, kind: &'static str) {
        match item {
            Some(_) => {
                self.count += 1;
                if self.frequency > 0 && self.count % self.frequency == 0 {
                    self.log_progress(kind);
                }
            }
            None if !self.finished => {
                self.finished = true;
                info!(
                    source = self.source,
                    sequence = self.sequence,
                    count = self.count,
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    "Finished reading {kind}"
                );
            }
            None => {}
        }
    }

    fn log_progress(&self, kind: &'static str) {
        let rate = self.rate();
        if self.memory_stats.is_enabled() {
            info!(
                source = self.source,
                sequence = self.sequence,
                count = self.count,
                per_second = rate.round() as u64,
                rss_mb = rss_mb().unwrap_or(0),
                "Processing {kind}"
            );
        } else {
            info!(
                source = self.source,
                sequence = self.sequence,
                count = self.count,
                per_second = rate.round() as u64,
                "Processing {kind}"
            );
        }
    }
}

#[async_trait]
impl<R: ChangeReader> ChangeReader for LoggingReader<R> {
    async fn read(&mut self) -> Result<Option<Change>, IngestError> {
        let item = self.inner.read().await?;
        self.observe(&item, "entries");
        Ok(item)
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        self.inner.close().await
    }
}

#[async_trait]
impl<R: TransactionReader> TransactionReader for LoggingReader<R> {
    async fn read(&mut self) -> Result<Option<Transaction>, IngestError> {
        let item = self.inner.read().await?;
        self.observe(&item, "transactions");
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::VecChangeReader;

    #[tokio::test]
    async fn counts_items_and_passes_them_through() {
        let changes: Vec<Change> = (0..5).map(|i| Change::genesis(&format!("n{i}"))).collect();
        let mut reader = LoggingReader::new(
            VecChangeReader::new(changes.clone()),
            "ledger",
            42,
            2,
            MemoryStatsFlag::new(true),
        );
        let mut seen = vec![];
        while let Some(c) = reader.read().await.unwrap() {
            seen.push(c);
        }
        assert_eq!(seen, changes);
        assert_eq!(reader.count(), 5);
        // Reading past the end stays at None.
        assert!(reader.read().await.unwrap().is_none());
    }

    #[test]
    fn memory_flag_is_shared() {
        let flag = MemoryStatsFlag::new(false);
        let clone = flag.clone();
        flag.enable();
        assert!(clone.is_enabled());
        clone.disable();
        assert!(!flag.is_enabled());
    }
}
