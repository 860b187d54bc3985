//! History archive adapter: the checkpoint snapshot source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::reader::{ChangeReader, VecChangeReader};
use crate::types::{Change, Hash};

/// Access to a content-addressed history archive.
///
/// Bucket-level checksum verification is the adapter's job; the runner only
/// compares the archive's bucket list hash with the one in the ledger header.
#[async_trait]
pub trait HistoryArchiveAdapter: Send + Sync {
    /// The bucket list hash the archive records for `checkpoint`.
    async fn bucket_list_hash(&self, checkpoint: u32) -> Result<Hash, IngestError>;

    /// A reader over the full ledger state at `checkpoint`.
    async fn state(&self, checkpoint: u32) -> Result<Box<dyn ChangeReader>, IngestError>;
}

/// One archived checkpoint.
#[derive(Debug, Clone)]
pub struct ArchivedCheckpoint {
    pub bucket_list_hash: Hash,
    pub changes: Vec<Change>,
}

/// In-memory archive for tests and embedded use.
#[derive(Default)]
pub struct MemoryArchive {
    checkpoints: Mutex<HashMap<u32, ArchivedCheckpoint>>,
    hash_requests: AtomicU32,
    state_requests: AtomicU32,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a checkpoint.
    pub fn insert(&self, checkpoint: u32, bucket_list_hash: Hash, changes: Vec<Change>) {
        self.checkpoints.lock().unwrap_or_else(|e| e.into_inner()).insert(
            checkpoint,
            ArchivedCheckpoint {
                bucket_list_hash,
                changes,
            },
        );
    }

    /// Number of `bucket_list_hash` calls served.
    pub fn hash_requests(&self) -> u32 {
        self.hash_requests.load(Ordering::SeqCst)
    }

    /// Number of `state` calls served.
    pub fn state_requests(&self) -> u32 {
        self.state_requests.load(Ordering::SeqCst)
    }

    fn get(&self, checkpoint: u32) -> Result<ArchivedCheckpoint, IngestError> {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&checkpoint)
            .cloned()
            .ok_or_else(|| IngestError::ArchiveRead {
                sequence: checkpoint,
                reason: "checkpoint not found in archive".into(),
            })
    }
}

#[async_trait]
impl HistoryArchiveAdapter for MemoryArchive {
    async fn bucket_list_hash(&self, checkpoint: u32) -> Result<Hash, IngestError> {
        self.hash_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(checkpoint)?.bucket_list_hash)
    }

    async fn state(&self, checkpoint: u32) -> Result<Box<dyn ChangeReader>, IngestError> {
        self.state_requests.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VecChangeReader::new(self.get(checkpoint)?.changes)))
    }
}
