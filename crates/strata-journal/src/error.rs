use std::io;

use strata_store::StoreError;
use strata_types::ErrorKind;

/// Errors produced by the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// I/O error while appending, syncing, or reading the journal file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record does not fit the `u32` length prefix.
    #[error("journal record too large: {0} bytes")]
    RecordTooLarge(usize),

    /// Applying a recovered record to the store failed.
    #[error("replay failed: {0}")]
    Replay(#[from] StoreError),
}

impl JournalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Replay(e) => e.kind(),
            Self::RecordTooLarge(_) => ErrorKind::InvalidOperation,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience alias used throughout the journal crate.
pub type Result<T> = std::result::Result<T, JournalError>;
