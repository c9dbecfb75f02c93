use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("object name must not be empty")]
    EmptyObjectName,

    #[error("pool name must not be empty")]
    EmptyPoolName,

    #[error("invalid snapshot context: {0}")]
    InvalidSnapContext(String),

    #[error("unknown log level: {0}")]
    UnknownLogLevel(String),
}

impl TypeError {
    /// Every type-level validation failure is a malformed request.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidOperation
    }
}

/// The fixed error taxonomy surfaced by every Strata operation.
///
/// Each kind maps to a small negative integer code; `code()` and
/// `from_code()` convert between the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    /// Object, attribute, key, or pool absent.
    #[error("not found")]
    NotFound,
    /// Exclusive-create collision.
    #[error("already exists")]
    Exists,
    /// A compare or assert sub-operation did not hold.
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("permission denied")]
    PermissionDenied,
    /// Malformed request, detected locally or by the cluster.
    #[error("invalid operation")]
    InvalidOperation,
    #[error("interrupted")]
    Interrupted,
    /// The adapter gave up on the request.
    #[error("cancelled")]
    Cancelled,
    /// Network or cluster-level failure.
    #[error("transport failure")]
    Transport,
    /// Unexpected state.
    #[error("internal error")]
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::NotFound,
        ErrorKind::Exists,
        ErrorKind::PreconditionFailed,
        ErrorKind::PermissionDenied,
        ErrorKind::InvalidOperation,
        ErrorKind::Interrupted,
        ErrorKind::Cancelled,
        ErrorKind::Transport,
        ErrorKind::Internal,
    ];

    /// Negative integer code for this kind.
    pub const fn code(self) -> i32 {
        match self {
            Self::NotFound => -2,
            Self::Exists => -17,
            Self::PreconditionFailed => -125,
            Self::PermissionDenied => -1,
            Self::InvalidOperation => -22,
            Self::Interrupted => -4,
            Self::Cancelled => -103,
            Self::Transport => -5,
            Self::Internal => -131,
        }
    }

    /// Map a code back to its kind. Unknown codes return `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Compare and assert failures abort a batch regardless of op flags.
    pub fn is_precondition(self) -> bool {
        matches!(self, Self::PreconditionFailed)
    }
}
