use strata_types::{ErrorKind, TypeError};
use thiserror::Error;

/// Errors surfaced by the client engine.
///
/// Local validation failures are returned directly from builders and
/// submission calls. Failures found by the cluster while executing a batch
/// arrive as [`ClientError::Remote`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("batch too large: {size} bytes (max {max})")]
    BatchTooLarge { size: usize, max: usize },

    #[error("codec error: {0}")]
    Codec(String),

    /// The completion has not reached the milestone the caller asked about.
    #[error("operation not complete")]
    NotComplete,

    /// The cluster executed the request and reported a failure.
    #[error("remote failure: {0}")]
    Remote(ErrorKind),

    /// A cluster control call failed.
    #[error("{kind}: {message}")]
    Cluster { kind: ErrorKind, message: String },

    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Position of this error in the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOperation(_)
            | Self::Type(_)
            | Self::BatchTooLarge { .. }
            | Self::Codec(_)
            | Self::NotComplete
            | Self::Config(_) => ErrorKind::InvalidOperation,
            Self::PoolNotFound(_) => ErrorKind::NotFound,
            Self::Remote(kind) | Self::Cluster { kind, .. } => *kind,
        }
    }

    /// Negative integer code of [`Self::kind`].
    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_into_taxonomy() {
        assert_eq!(ClientError::PoolNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ClientError::Remote(ErrorKind::Exists).code(), -17);
        assert_eq!(
            ClientError::Type(TypeError::EmptyObjectName).kind(),
            ErrorKind::InvalidOperation
        );
        let err = ClientError::Cluster {
            kind: ErrorKind::Transport,
            message: "runtime gone".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.to_string(), "transport failure: runtime gone");
    }
}
