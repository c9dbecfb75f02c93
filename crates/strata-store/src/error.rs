use strata_types::{ErrorKind, PoolId};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested pool does not exist.
    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    /// A pool with this name already exists.
    #[error("pool already exists: {0}")]
    PoolExists(String),

    /// Pool names must be non-empty.
    #[error("invalid pool name: {0:?}")]
    InvalidPoolName(String),

    /// The update closure rejected the mutation; nothing was installed.
    #[error("update aborted: {0}")]
    Aborted(ErrorKind),
}

impl StoreError {
    /// Position of this error in the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PoolNotFound(_) => ErrorKind::NotFound,
            Self::PoolExists(_) => ErrorKind::Exists,
            Self::InvalidPoolName(_) => ErrorKind::InvalidOperation,
            Self::Aborted(kind) => *kind,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
