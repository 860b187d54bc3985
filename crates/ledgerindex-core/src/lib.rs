//! ledgerindex-core — foundation for turning ledger history into relational rows.
//!
//! # Architecture
//!
//! ```text
//! ProcessorRunner (ledgerindex-runner)
//!     ├── HistoryArchiveAdapter / LedgerChangeReader / LedgerTransactionReader
//!     ├── LoggingReader           (progress lines every N items)
//!     ├── stream_changes / stream_ledger_transactions
//!     ├── TransactionFiltererGroup (AND of filterers, drop count)
//!     ├── ChangeProcessorGroup     (ordered members, one commit)
//!     ├── TransactionProcessorGroup (ordered members + lazy loaders, one flush)
//!     └── StorageSession           (pending batch, commit / rollback)
//! ```

pub mod archive;
pub mod error;
pub mod group;
pub mod loader;
pub mod processor;
pub mod progress;
pub mod reader;
pub mod session;
pub mod stats;
pub mod stream;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{HistoryArchiveAdapter, MemoryArchive};
pub use error::{IngestError, ResultExt};
pub use group::{ChangeProcessorGroup, TransactionFiltererGroup, TransactionProcessorGroup};
pub use loader::{LazyLoader, Loader, LoaderFuture, Loaders};
pub use processor::{ChangeProcessor, TransactionFilterer, TransactionProcessor};
pub use progress::{LoggingReader, MemoryStatsFlag};
pub use reader::{
    ChangeReader, LedgerChangeReader, LedgerTransactionReader, TransactionReader, VecChangeReader,
};
pub use session::{
    FilterRule, FilterRules, HistoryRow, HistoryTable, LookupKind, StateRow, StateTable,
    StorageSession,
};
pub use stats::{
    ChangeStats, LedgerStats, ProcessorDurations, TradeStats, TransactionProcessingStats,
    TransactionStats,
};
pub use stream::{stream_changes, stream_ledger_transactions, TransactionRouting};
pub use types::{Change, ChangeType, ClosedLedger, Hash, LedgerEntry, LedgerEntryKind, Transaction};
