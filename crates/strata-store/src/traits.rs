use serde::{Deserialize, Serialize};
use strata_types::{ErrorKind, ObjectKey, PoolId, SnapId};

use crate::error::StoreResult;
use crate::object::ObjectRecord;

/// Static description of a pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub id: PoolId,
    pub name: String,
    pub pg_count: u32,
    /// Newest snapshot id allocated in the pool.
    pub snap_seq: u64,
}

/// Space and I/O counters for a pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolUsage {
    pub bytes: u64,
    pub objects: u64,
    pub clones: u64,
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
}

/// Mutation applied by [`ObjectStore::update`].
///
/// Receives a working copy of the record (empty if the key is absent).
/// Returning `Err` discards the copy.
pub type RecordUpdate<'a> = dyn FnMut(&mut ObjectRecord) -> Result<(), ErrorKind> + 'a;

/// Pool-partitioned object store.
///
/// All implementations must satisfy these invariants:
/// - `update` is atomic per key: concurrent readers see either the old or the
///   new record, never a partially applied one.
/// - Updates within one placement group are serialized.
/// - A record left with no head and no clones is deleted.
/// - Listing within a placement group is ordered by key.
pub trait ObjectStore: Send + Sync {
    /// Create a pool with a fresh id.
    fn create_pool(&self, name: &str, pg_count: u32) -> StoreResult<PoolInfo>;

    /// Install a pool with a known id and snapshot sequence (journal replay).
    fn restore_pool(&self, info: PoolInfo) -> StoreResult<()>;

    /// Delete a pool and every object in it.
    fn delete_pool(&self, pool: PoolId) -> StoreResult<()>;

    fn lookup_pool(&self, name: &str) -> StoreResult<Option<PoolId>>;

    fn pool_info(&self, pool: PoolId) -> StoreResult<PoolInfo>;

    /// All pools, ordered by id.
    fn pools(&self) -> StoreResult<Vec<PoolInfo>>;

    /// Allocate the next snapshot id in the pool.
    fn allocate_snap(&self, pool: PoolId) -> StoreResult<SnapId>;

    /// Raise the pool's snapshot sequence to at least `snap` (journal replay).
    fn advance_snap_seq(&self, pool: PoolId, snap: SnapId) -> StoreResult<()>;

    /// Read a record. Returns `Ok(None)` if the key is absent.
    fn read(&self, pool: PoolId, key: &ObjectKey) -> StoreResult<Option<ObjectRecord>>;

    /// Atomically mutate a record, returning the installed post-image
    /// (`None` when the record was deleted).
    fn update(
        &self,
        pool: PoolId,
        key: &ObjectKey,
        mutation: &mut RecordUpdate<'_>,
    ) -> StoreResult<Option<ObjectRecord>>;

    /// Replace a record wholesale (journal replay). `None` deletes it.
    fn put(&self, pool: PoolId, key: &ObjectKey, record: Option<ObjectRecord>) -> StoreResult<()>;

    /// Up to `max` keys of one placement group, strictly after `after`.
    fn list(
        &self,
        pool: PoolId,
        placement: u32,
        after: Option<&ObjectKey>,
        max: usize,
    ) -> StoreResult<Vec<ObjectKey>>;

    /// Every record in the pool, including ones that only hold clones.
    fn export(&self, pool: PoolId) -> StoreResult<Vec<(ObjectKey, ObjectRecord)>>;

    fn usage(&self, pool: PoolId) -> StoreResult<PoolUsage>;

    /// Count a read of `bytes` against the pool.
    fn record_read(&self, pool: PoolId, bytes: u64);

    /// Count a write of `bytes` against the pool.
    fn record_write(&self, pool: PoolId, bytes: u64);
}
