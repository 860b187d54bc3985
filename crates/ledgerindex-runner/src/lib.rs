//! ledgerindex-runner — orchestrates processors over checkpoints and ledgers.
//!
//! ```text
//! ProcessorRunner
//!     ├── run_history_archive_ingestion  (archive snapshot → change group → commit)
//!     ├── run_transaction_processors_on_ledger
//!     │       filter group ─┬─ kept    → main group         → flush
//!     │                     └─ dropped → filtered-out group → flush, GC sweep
//!     └── run_all_processors_on_ledger  (ledger changes → commit, then the above)
//! ```

pub mod config;
pub mod registry;
pub mod runner;

pub use config::{RunnerBuilder, RunnerConfig};
pub use registry::{
    build_change_processors, build_filtered_out_processors, build_filterers,
    build_transaction_processors, ChangeProcessors, ChangeSource, TransactionProcessors,
};
pub use runner::{ProcessorRunner, CURRENT_INGEST_VERSION};
