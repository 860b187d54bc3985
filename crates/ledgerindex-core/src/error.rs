//! Error types for the ingestion pipeline.

use thiserror::Error;

use crate::types::Hash;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(
        "protocol version {version} is not supported (latest supported protocol version is {max})"
    )]
    ProtocolVersionUnsupported { version: u32, max: u32 },

    #[error(
        "bucket list hash of history archive and ledger header does not match at {sequence}: {archive} {ledger}"
    )]
    ArchiveHashMismatch {
        sequence: u32,
        archive: Hash,
        ledger: Hash,
    },

    #[error("History archive error at checkpoint {sequence}: {reason}")]
    ArchiveRead { sequence: u32, reason: String },

    #[error("Stream read error: {0}")]
    StreamRead(String),

    #[error("Processor error in '{processor}': {reason}")]
    Processor { processor: String, reason: String },

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Flush error: {0}")]
    Flush(String),

    #[error("Filter error in '{filter}': {reason}")]
    FilterEvaluation { filter: String, reason: String },

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Housekeeping error: {0}")]
    Housekeeping(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Wrap this error with a description of the phase it happened in.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with every context layer peeled off.
    pub fn root(&self) -> &IngestError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` if the error must fail the enclosing operation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.root(), Self::Cancelled | Self::Housekeeping(_))
    }

    /// Returns `true` if the operation was stopped by a cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

/// Attach phase context to a fallible result.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, IngestError>;

    fn with_context<F, S>(self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T, IngestError> {
    fn context(self, context: impl Into<String>) -> Result<T, IngestError> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_peels_context() {
        let err = IngestError::Cancelled
            .context("Error streaming changes from ledger")
            .context("ledger 100");
        assert!(matches!(err.root(), IngestError::Cancelled));
        assert!(err.is_cancelled());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "ledger 100: Error streaming changes from ledger: Ingestion cancelled"
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(IngestError::Commit("boom".into()).is_fatal());
        assert!(!IngestError::Housekeeping("slow".into()).is_fatal());
        assert!(IngestError::ProtocolVersionUnsupported { version: 22, max: 21 }.is_fatal());
    }
}
