use std::io;

use strata_client::ClientError;
use strata_journal::JournalError;
use strata_store::StoreError;
use strata_types::ErrorKind;

/// Errors produced by the reference cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// I/O error while preparing the data directory.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Appending, syncing, or replaying the journal failed.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// The configuration is unreadable or out of range.
    #[error("config error: {0}")]
    Config(String),

    /// The tokio runtime could not be started.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The cluster is shutting down and no longer accepts work.
    #[error("cluster is shut down")]
    Shutdown,
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Journal(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::PoolNotFound(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::InvalidOperation,
            Self::Shutdown => ErrorKind::Transport,
            Self::Io(_) | Self::Runtime(_) => ErrorKind::Internal,
        }
    }
}

impl From<ClusterError> for ClientError {
    fn from(err: ClusterError) -> Self {
        ClientError::Cluster {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the cluster crate.
pub type Result<T> = std::result::Result<T, ClusterError>;
