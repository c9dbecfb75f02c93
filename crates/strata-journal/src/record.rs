use serde::{Deserialize, Serialize};
use strata_store::{ObjectRecord, PoolInfo};
use strata_types::{ObjectKey, PoolId, SnapId};

/// One journaled change.
///
/// Object changes carry the full post-image so replay never re-executes a
/// batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    PoolCreated(PoolInfo),
    PoolDeleted {
        pool: PoolId,
    },
    SnapAllocated {
        pool: PoolId,
        snap: SnapId,
    },
    /// `record` is `None` when the object was removed with nothing left to keep.
    ObjectUpdated {
        pool: PoolId,
        key: ObjectKey,
        record: Option<ObjectRecord>,
    },
}

impl JournalRecord {
    /// Pool the record applies to.
    pub fn pool(&self) -> PoolId {
        match self {
            Self::PoolCreated(info) => info.id,
            Self::PoolDeleted { pool }
            | Self::SnapAllocated { pool, .. }
            | Self::ObjectUpdated { pool, .. } => *pool,
        }
    }
}
