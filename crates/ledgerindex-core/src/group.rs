//! Processor groups: fan one stream out to an ordered list of members.
//!
//! Members are always called in registration order. The order matters: some
//! processors share lazy-loader state that earlier members populate.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::IngestError;
use crate::loader::LazyLoader;
use crate::processor::{ChangeProcessor, TransactionFilterer, TransactionProcessor};
use crate::session::StorageSession;
use crate::stats::ProcessorDurations;
use crate::types::{Change, ClosedLedger, Transaction};

fn member_error(name: &str, err: IngestError) -> IngestError {
    match err {
        e @ IngestError::Processor { .. } => e,
        e @ IngestError::Cancelled => e,
        other => IngestError::Processor {
            processor: name.to_string(),
            reason: other.to_string(),
        },
    }
}

// ─── Change group ─────────────────────────────────────────────────────────────

/// Ordered change processors with a single group-level commit.
pub struct ChangeProcessorGroup {
    processors: Vec<Box<dyn ChangeProcessor>>,
    durations: ProcessorDurations,
    changes: u64,
}

impl ChangeProcessorGroup {
    pub fn new(processors: Vec<Box<dyn ChangeProcessor>>) -> Self {
        Self {
            processors,
            durations: ProcessorDurations::new(),
            changes: 0,
        }
    }

    /// Forward `change` to every member; the first error aborts.
    pub async fn process_change(&mut self, change: &Change) -> Result<(), IngestError> {
        for p in self.processors.iter_mut() {
            let started = Instant::now();
            let result = p.process_change(change).await;
            self.durations.add(p.name(), started.elapsed());
            result.map_err(|e| member_error(p.name(), e))?;
        }
        self.changes += 1;
        Ok(())
    }

    /// Let every member stage its writes, then commit the session once.
    pub async fn commit(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        for p in self.processors.iter_mut() {
            let started = Instant::now();
            let result = p.commit(session).await;
            self.durations.add(p.name(), started.elapsed());
            result.map_err(|e| IngestError::Commit(format!("{}: {e}", p.name())))?;
        }
        session
            .commit()
            .await
            .map_err(|e| IngestError::Commit(e.to_string()))?;
        debug!(
            processors = self.processors.len(),
            changes = self.changes,
            "change group committed"
        );
        Ok(())
    }

    pub fn durations(&self) -> &ProcessorDurations {
        &self.durations
    }

    /// Number of changes every member has processed.
    pub fn processed_changes(&self) -> u64 {
        self.changes
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

// ─── Transaction group ────────────────────────────────────────────────────────

/// Ordered transaction processors plus the lazy loaders they share.
///
/// A group with no processors and no loaders is a valid no-op sink.
pub struct TransactionProcessorGroup {
    processors: Vec<Box<dyn TransactionProcessor>>,
    loaders: Vec<Arc<dyn LazyLoader>>,
    durations: ProcessorDurations,
    transactions: u64,
}

impl TransactionProcessorGroup {
    pub fn new(
        processors: Vec<Box<dyn TransactionProcessor>>,
        loaders: Vec<Arc<dyn LazyLoader>>,
    ) -> Self {
        Self {
            processors,
            loaders,
            durations: ProcessorDurations::new(),
            transactions: 0,
        }
    }

    /// An inert group.
    pub fn empty() -> Self {
        Self::new(vec![], vec![])
    }

    /// Forward `tx` to every member; the first error aborts.
    pub async fn process_transaction(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<(), IngestError> {
        for p in self.processors.iter_mut() {
            let started = Instant::now();
            let result = p.process_transaction(ledger, tx).await;
            self.durations.add(p.name(), started.elapsed());
            result.map_err(|e| member_error(p.name(), e))?;
        }
        self.transactions += 1;
        Ok(())
    }

    /// Execute every loader, let every member stage its rows, then commit the
    /// session once. The first error aborts.
    pub async fn flush(&mut self, session: &dyn StorageSession) -> Result<(), IngestError> {
        for loader in &self.loaders {
            let started = Instant::now();
            let result = loader.exec(session).await;
            self.durations.add(loader.name(), started.elapsed());
            result.map_err(|e| IngestError::Flush(format!("{}: {e}", loader.name())))?;
        }
        for p in self.processors.iter_mut() {
            let started = Instant::now();
            let result = p.flush(session).await;
            self.durations.add(p.name(), started.elapsed());
            result.map_err(|e| IngestError::Flush(format!("{}: {e}", p.name())))?;
        }
        session
            .commit()
            .await
            .map_err(|e| IngestError::Flush(e.to_string()))?;
        debug!(
            processors = self.processors.len(),
            transactions = self.transactions,
            "transaction group flushed"
        );
        Ok(())
    }

    pub fn durations(&self) -> &ProcessorDurations {
        &self.durations
    }

    /// Number of transactions every member has processed.
    pub fn processed_transactions(&self) -> u64 {
        self.transactions
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty() && self.loaders.is_empty()
    }
}

// ─── Filter group ─────────────────────────────────────────────────────────────

/// Ordered transaction filterers combined with logical AND.
///
/// An empty group keeps every transaction.
pub struct TransactionFiltererGroup {
    filterers: Vec<Box<dyn TransactionFilterer>>,
    durations: ProcessorDurations,
    dropped: i64,
}

impl TransactionFiltererGroup {
    pub fn new(filterers: Vec<Box<dyn TransactionFilterer>>) -> Self {
        Self {
            filterers,
            durations: ProcessorDurations::new(),
            dropped: 0,
        }
    }

    /// `true` if every filterer keeps `tx`. Stops at the first filterer that
    /// drops it.
    pub async fn evaluate(
        &mut self,
        ledger: &ClosedLedger,
        tx: &Transaction,
    ) -> Result<bool, IngestError> {
        for f in &self.filterers {
            let started = Instant::now();
            let result = f.should_keep(ledger, tx).await;
            self.durations.add(f.name(), started.elapsed());
            let keep = result.map_err(|e| IngestError::FilterEvaluation {
                filter: f.name().to_string(),
                reason: e.to_string(),
            })?;
            if !keep {
                self.dropped += 1;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Transactions dropped so far.
    pub fn dropped_transactions(&self) -> i64 {
        self.dropped
    }

    pub fn durations(&self) -> &ProcessorDurations {
        &self.durations
    }

    pub fn is_empty(&self) -> bool {
        self.filterers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::session::LookupKind;
    use crate::testing::{ledger, tx, RecordingSession};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Records calls into a shared journal.
    struct Journal {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<u32>,
        seen: u32,
    }

    impl Journal {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.into(),
                log: log.clone(),
                fail_on: None,
                seen: 0,
            }
        }
    }

    #[async_trait]
    impl ChangeProcessor for Journal {
        fn name(&self) -> &str {
            &self.name
        }
        async fn process_change(&mut self, _c: &Change) -> Result<(), IngestError> {
            self.seen += 1;
            if self.fail_on == Some(self.seen) {
                return Err(IngestError::Storage("disk full".into()));
            }
            self.log.lock().unwrap().push(format!("{}:change", self.name));
            Ok(())
        }
        async fn commit(&mut self, _s: &dyn StorageSession) -> Result<(), IngestError> {
            self.log.lock().unwrap().push(format!("{}:commit", self.name));
            Ok(())
        }
    }

    #[async_trait]
    impl TransactionProcessor for Journal {
        fn name(&self) -> &str {
            &self.name
        }
        async fn process_transaction(
            &mut self,
            _l: &ClosedLedger,
            t: &Transaction,
        ) -> Result<(), IngestError> {
            self.log.lock().unwrap().push(format!("{}:tx{}", self.name, t.index));
            Ok(())
        }
        async fn flush(&mut self, _s: &dyn StorageSession) -> Result<(), IngestError> {
            self.log.lock().unwrap().push(format!("{}:flush", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn change_group_forwards_in_order_and_commits_once() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut group = ChangeProcessorGroup::new(vec![
            Box::new(Journal::new("a", &log)),
            Box::new(Journal::new("b", &log)),
        ]);
        let session = RecordingSession::new();

        group.process_change(&Change::genesis("net")).await.unwrap();
        group.commit(&session).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:change", "b:change", "a:commit", "b:commit"]
        );
        assert_eq!(session.commits(), 1);
        assert!(group.durations().contains("a"));
        assert!(group.durations().contains("b"));
        assert_eq!(group.processed_changes(), 1);
    }

    #[tokio::test]
    async fn change_group_first_error_aborts_remaining_members() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut failing = Journal::new("a", &log);
        failing.fail_on = Some(1);
        let mut group = ChangeProcessorGroup::new(vec![
            Box::new(failing),
            Box::new(Journal::new("b", &log)),
        ]);

        let err = group.process_change(&Change::genesis("net")).await.unwrap_err();
        match err {
            IngestError::Processor { processor, .. } => assert_eq!(processor, "a"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transaction_group_runs_loaders_before_member_flush() {
        let log = Arc::new(Mutex::new(vec![]));
        let loader = Loader::new(LookupKind::Account);
        let future = loader.get_future("GA").unwrap();
        let mut group = TransactionProcessorGroup::new(
            vec![Box::new(Journal::new("ops", &log))],
            vec![loader.clone() as Arc<dyn LazyLoader>],
        );
        let session = RecordingSession::new();
        let l = ledger(100, vec![tx(1, true)]);

        group.process_transaction(&l, &l.transactions[0]).await.unwrap();
        group.flush(&session).await.unwrap();

        assert!(future.value().is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["ops:tx1", "ops:flush"]);
        assert_eq!(session.resolve_calls(), 1);
        assert_eq!(session.commits(), 1);
        assert!(group.durations().contains("account_loader"));
    }

    #[tokio::test]
    async fn empty_transaction_group_is_a_sink() {
        let mut group = TransactionProcessorGroup::empty();
        assert!(group.is_empty());
        let l = ledger(7, vec![tx(1, true)]);
        group.process_transaction(&l, &l.transactions[0]).await.unwrap();
        assert_eq!(group.processed_transactions(), 1);
        assert!(group.durations().is_empty());
    }

    struct DropOdd(Arc<AtomicU32>);

    #[async_trait]
    impl TransactionFilterer for DropOdd {
        fn name(&self) -> &str {
            "drop_odd"
        }
        async fn should_keep(&self, _l: &ClosedLedger, t: &Transaction) -> Result<bool, IngestError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(t.index % 2 == 0)
        }
    }

    struct KeepAll(Arc<AtomicU32>);

    #[async_trait]
    impl TransactionFilterer for KeepAll {
        fn name(&self) -> &str {
            "keep_all"
        }
        async fn should_keep(&self, _l: &ClosedLedger, _t: &Transaction) -> Result<bool, IngestError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn filter_group_is_logical_and_with_short_circuit() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let mut group = TransactionFiltererGroup::new(vec![
            Box::new(DropOdd(first.clone())),
            Box::new(KeepAll(second.clone())),
        ]);
        let l = ledger(5, vec![tx(1, true), tx(2, true), tx(3, false)]);

        let mut kept = vec![];
        for t in &l.transactions {
            if group.evaluate(&l, t).await.unwrap() {
                kept.push(t.index);
            }
        }
        assert_eq!(kept, vec![2]);
        assert_eq!(group.dropped_transactions(), 2);
        assert_eq!(first.load(Ordering::Relaxed), 3);
        // Only the kept transaction reached the second filterer.
        assert_eq!(second.load(Ordering::Relaxed), 1);
        assert!(group.durations().contains("drop_odd"));
    }

    #[tokio::test]
    async fn empty_filter_group_keeps_everything() {
        let mut group = TransactionFiltererGroup::new(vec![]);
        let l = ledger(5, vec![tx(1, true)]);
        assert!(group.evaluate(&l, &l.transactions[0]).await.unwrap());
        assert_eq!(group.dropped_transactions(), 0);
    }
}
