//! The processor runner: one entry point per unit of ingestion.
//!
//! # Operations
//! - `run_history_archive_ingestion`: a checkpoint snapshot (or the genesis
//!   ledger) through the change processors, committed once.
//! - `run_transaction_processors_on_ledger`: the transactions of one closed
//!   ledger through the filter group, the filtered-out group and the main
//!   group, each flushed once.
//! - `run_all_processors_on_ledger`: the ledger's changes, committed, then
//!   its transactions. The two phases are not atomic together.
//!
//! Every operation builds its processors and loaders fresh. On error the
//! session is rolled back so nothing staged by the failed call leaks into
//! the next one.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ledgerindex_core::archive::HistoryArchiveAdapter;
use ledgerindex_core::error::{IngestError, ResultExt};
use ledgerindex_core::progress::{LoggingReader, MemoryStatsFlag};
use ledgerindex_core::reader::{
    ChangeReader, LedgerChangeReader, LedgerTransactionReader, VecChangeReader,
};
use ledgerindex_core::session::StorageSession;
use ledgerindex_core::stats::{ChangeStats, LedgerStats, TransactionProcessingStats};
use ledgerindex_core::stream::{stream_changes, stream_ledger_transactions};
use ledgerindex_core::types::{Change, ClosedLedger, Hash};
use ledgerindex_processors::{Filters, LedgersProcessor};

use crate::config::RunnerConfig;
use crate::registry::{
    build_change_processors, build_filtered_out_processors, build_filterers,
    build_transaction_processors, ChangeSource,
};

/// Version stamped on every ledger row written by this build.
pub const CURRENT_INGEST_VERSION: u32 = 1;

/// Drives processors over checkpoints and closed ledgers against one
/// storage session.
pub struct ProcessorRunner {
    config: RunnerConfig,
    session: Arc<dyn StorageSession>,
    archive: Option<Arc<dyn HistoryArchiveAdapter>>,
    filters: Filters,
    memory_stats: MemoryStatsFlag,
    cancel: CancellationToken,
    last_filtered_tmp_gc: Option<Instant>,
}

impl ProcessorRunner {
    pub fn new(config: RunnerConfig, session: Arc<dyn StorageSession>) -> Self {
        Self {
            filters: Filters::new(config.filter_refresh_interval()),
            memory_stats: MemoryStatsFlag::new(config.log_memory_stats),
            config,
            session,
            archive: None,
            cancel: CancellationToken::new(),
            last_filtered_tmp_gc: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Set the archive used for checkpoint ingestion.
    pub fn set_history_adapter(&mut self, archive: Arc<dyn HistoryArchiveAdapter>) {
        self.archive = Some(archive);
    }

    pub fn enable_memory_stats_logging(&self) {
        self.memory_stats.enable();
    }

    pub fn disable_memory_stats_logging(&self) {
        self.memory_stats.disable();
    }

    /// Cancelling this token stops the running operation at the next item
    /// with `IngestError::Cancelled`, without committing.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ─── Checkpoint ingestion ────────────────────────────────────────────────

    /// Ingest the genesis ledger state: the root account.
    pub async fn run_genesis_state_ingestion(&mut self) -> Result<ChangeStats, IngestError> {
        self.run_history_archive_ingestion(1, false, 0, Hash::ZERO).await
    }

    /// Ingest the full ledger state at `checkpoint` from the history archive.
    ///
    /// Unless `skip_checks` is set, `protocol_version` must be supported and
    /// the archive's bucket list hash must equal `bucket_list_hash`; both are
    /// checked before anything is streamed. Checkpoint 1 is the genesis
    /// ledger and never touches the archive.
    pub async fn run_history_archive_ingestion(
        &mut self,
        checkpoint: u32,
        skip_checks: bool,
        protocol_version: u32,
        bucket_list_hash: Hash,
    ) -> Result<ChangeStats, IngestError> {
        let result = self
            .history_archive_ingestion(checkpoint, skip_checks, protocol_version, bucket_list_hash)
            .await;
        self.settle(result, format!("checkpoint {checkpoint}")).await
    }

    async fn history_archive_ingestion(
        &mut self,
        checkpoint: u32,
        skip_checks: bool,
        protocol_version: u32,
        bucket_list_hash: Hash,
    ) -> Result<ChangeStats, IngestError> {
        let started = Instant::now();
        let mut built = build_change_processors(ChangeSource::HistoryArchive);

        if checkpoint == 1 {
            let mut reader =
                VecChangeReader::new([Change::genesis(&self.config.network_passphrase)]);
            stream_changes(&self.cancel, &mut built.group, &mut reader)
                .await
                .context("Error ingesting genesis ledger state")?;
        } else {
            if !skip_checks {
                self.check_protocol_version(protocol_version)?;
            }
            let archive = self.archive.clone().ok_or_else(|| IngestError::ArchiveRead {
                sequence: checkpoint,
                reason: "no history archive adapter configured".into(),
            })?;

            if !skip_checks {
                let archive_hash = archive
                    .bucket_list_hash(checkpoint)
                    .await
                    .context("Error getting bucket list hash")?;
                if archive_hash != bucket_list_hash {
                    return Err(IngestError::ArchiveHashMismatch {
                        sequence: checkpoint,
                        archive: archive_hash,
                        ledger: bucket_list_hash,
                    });
                }
            }

            let reader = archive
                .state(checkpoint)
                .await
                .with_context(|| format!("Error creating history archive reader at {checkpoint}"))?;
            let mut reader = LoggingReader::new(
                reader,
                ChangeSource::HistoryArchive.as_str(),
                checkpoint,
                self.config.log_frequency,
                self.memory_stats.clone(),
            );
            // the reader is closed whether or not streaming succeeded
            let streamed = stream_changes(&self.cancel, &mut built.group, &mut reader).await;
            let closed = reader.close().await;
            if let (Err(_), Err(e)) = (&streamed, &closed) {
                warn!(checkpoint, error = %e, "Error closing history archive reader");
            }
            streamed.context("Error streaming changes from history archive")?;
            closed.context("Error closing history archive reader")?;
        }

        built
            .group
            .commit(self.session.as_ref())
            .await
            .context("Error committing changes")?;

        let stats = built.stats.snapshot();
        info!(
            checkpoint,
            changes = built.group.processed_changes(),
            entries = stats.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processed entries from history archive"
        );
        Ok(stats)
    }

    // ─── Ledger ingestion ────────────────────────────────────────────────────

    /// Run the transaction processors on one closed ledger.
    pub async fn run_transaction_processors_on_ledger(
        &mut self,
        ledger: &ClosedLedger,
    ) -> Result<TransactionProcessingStats, IngestError> {
        let result = self.transaction_processing(ledger).await;
        self.settle(result, format!("ledger {}", ledger.sequence())).await
    }

    /// Run the change processors, commit, then run the transaction
    /// processors on one closed ledger.
    pub async fn run_all_processors_on_ledger(
        &mut self,
        ledger: &ClosedLedger,
    ) -> Result<LedgerStats, IngestError> {
        let result = self.all_processing(ledger).await;
        self.settle(result, format!("ledger {}", ledger.sequence())).await
    }

    async fn all_processing(&mut self, ledger: &ClosedLedger) -> Result<LedgerStats, IngestError> {
        self.check_protocol_version(ledger.protocol_version())?;

        let mut built = build_change_processors(ChangeSource::Ledger);
        let mut reader = LoggingReader::new(
            LedgerChangeReader::new(ledger),
            ChangeSource::Ledger.as_str(),
            ledger.sequence(),
            self.config.log_frequency,
            self.memory_stats.clone(),
        );
        stream_changes(&self.cancel, &mut built.group, &mut reader)
            .await
            .context("Error streaming changes from ledger")?;
        built
            .group
            .commit(self.session.as_ref())
            .await
            .context("Error committing changes from processor")?;

        let tx = self.transaction_processing(ledger).await?;
        Ok(LedgerStats {
            change_stats: built.stats.snapshot(),
            change_durations: built.group.durations().clone(),
            transaction_stats: tx.transaction_stats,
            transaction_durations: tx.transaction_durations,
            trade_stats: tx.trade_stats,
        })
    }

    async fn transaction_processing(
        &mut self,
        ledger: &ClosedLedger,
    ) -> Result<TransactionProcessingStats, IngestError> {
        self.check_protocol_version(ledger.protocol_version())?;
        let sequence = ledger.sequence();
        let filtering = self.config.enable_ingestion_filtering;

        let mut ledgers = LedgersProcessor::new(CURRENT_INGEST_VERSION);
        ledgers.process_ledger(ledger);

        let mut filterers = build_filterers(&mut self.filters, self.session.as_ref(), filtering)
            .await
            .context("Error loading ingestion filters")?;
        let mut filtered_out = build_filtered_out_processors(filtering);
        let mut main = build_transaction_processors(ledgers);

        let reader = LedgerTransactionReader::new(ledger).context("Error creating ledger reader")?;
        let mut reader = LoggingReader::new(
            reader,
            ChangeSource::Ledger.as_str(),
            sequence,
            self.config.log_frequency,
            self.memory_stats.clone(),
        );
        let routing = stream_ledger_transactions(
            &self.cancel,
            &mut filterers,
            &mut filtered_out,
            &mut main.group,
            &mut reader,
            ledger,
        )
        .await
        .context("Error streaming changes from ledger")?;

        if filtering {
            filtered_out
                .flush(self.session.as_ref())
                .await
                .context("Error flushing temp filtered tx from ledger")?;
            self.sweep_filtered_transactions().await;
        }

        main.group
            .flush(self.session.as_ref())
            .await
            .context("Error flushing changes from processor")?;

        let mut transaction_stats = main.stats.snapshot();
        transaction_stats.transactions_filtered = filterers.dropped_transactions();

        let mut transaction_durations = main.group.durations().clone();
        transaction_durations.merge(filtered_out.durations());
        transaction_durations.merge(filterers.durations());

        info!(
            sequence,
            kept = routing.kept,
            filtered = routing.dropped,
            operations = transaction_stats.operations,
            "Processed ledger"
        );
        Ok(TransactionProcessingStats {
            transaction_stats,
            transaction_durations,
            trade_stats: main.trades.snapshot(),
        })
    }

    // ─── Helpers ─────────────────────────────────────────────────────────────

    fn check_protocol_version(&self, version: u32) -> Result<(), IngestError> {
        let max = self.config.max_supported_protocol_version;
        if version > max {
            return Err(IngestError::ProtocolVersionUnsupported { version, max });
        }
        Ok(())
    }

    /// Delete old filtered-tmp rows, at most once per GC period. Failures are
    /// logged and never fail the ledger.
    async fn sweep_filtered_transactions(&mut self) {
        let period = self.config.filtered_tmp_gc_period();
        let due = self
            .last_filtered_tmp_gc
            .map_or(true, |at| at.elapsed() >= period);
        if !due {
            return;
        }
        self.last_filtered_tmp_gc = Some(Instant::now());

        match self
            .session
            .delete_filtered_transactions_older_than(period)
            .await
        {
            Ok(deleted) => debug!(deleted, "Swept filtered transactions"),
            Err(e) => {
                let err = IngestError::Housekeeping(e.to_string());
                warn!(
                    error = %err,
                    gc_period_secs = period.as_secs(),
                    "Error deleting filtered transactions older than the GC period"
                );
            }
        }
    }

    /// Roll back whatever the failed call staged and tag the error with the
    /// unit being ingested.
    async fn settle<T>(
        &self,
        result: Result<T, IngestError>,
        unit: String,
    ) -> Result<T, IngestError> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if let Err(rollback) = self.session.rollback().await {
            warn!(error = %rollback, %unit, "Error rolling back session");
        }
        if err.is_cancelled() {
            info!(%unit, "Ingestion cancelled");
        } else {
            warn!(error = %err, %unit, "Ingestion failed");
        }
        Err(err.context(unit))
    }
}
