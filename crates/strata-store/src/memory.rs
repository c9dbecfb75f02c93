use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use strata_types::{ObjectKey, PoolId, SnapId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectRecord;
use crate::traits::{ObjectStore, PoolInfo, PoolUsage, RecordUpdate};

type PlacementGroup = RwLock<BTreeMap<ObjectKey, ObjectRecord>>;

/// One pool: its placement groups and counters.
struct Pool {
    id: PoolId,
    name: String,
    snap_seq: AtomicU64,
    pgs: Vec<PlacementGroup>,
    reads: AtomicU64,
    read_bytes: AtomicU64,
    writes: AtomicU64,
    write_bytes: AtomicU64,
}

impl Pool {
    fn new(id: PoolId, name: String, pg_count: u32, snap_seq: u64) -> Self {
        let pg_count = pg_count.max(1);
        Self {
            id,
            name,
            snap_seq: AtomicU64::new(snap_seq),
            pgs: (0..pg_count).map(|_| RwLock::new(BTreeMap::new())).collect(),
            reads: AtomicU64::new(0),
            read_bytes: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_bytes: AtomicU64::new(0),
        }
    }

    fn pg_count(&self) -> u32 {
        self.pgs.len() as u32
    }

    fn pg_for(&self, key: &ObjectKey) -> &PlacementGroup {
        &self.pgs[key.placement(self.pg_count()) as usize]
    }

    fn info(&self) -> PoolInfo {
        PoolInfo {
            id: self.id,
            name: self.name.clone(),
            pg_count: self.pg_count(),
            snap_seq: self.snap_seq.load(Ordering::Acquire),
        }
    }
}

/// In-memory, placement-group-sharded object store.
///
/// Each placement group is a `BTreeMap` behind its own `RwLock`, so updates
/// to one group serialize while groups proceed in parallel. Records are
/// cloned on read.
pub struct InMemoryObjectStore {
    pools: RwLock<HashMap<PoolId, Arc<Pool>>>,
    next_pool_id: AtomicU64,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            next_pool_id: AtomicU64::new(1),
        }
    }

    /// Number of pools.
    pub fn pool_count(&self) -> usize {
        self.pools.read().expect("lock poisoned").len()
    }

    /// Total objects with a live head across all pools.
    pub fn total_objects(&self) -> u64 {
        let pools = self.pools.read().expect("lock poisoned");
        pools
            .values()
            .flat_map(|pool| pool.pgs.iter())
            .map(|pg| {
                let map = pg.read().expect("lock poisoned");
                map.values().filter(|r| r.exists()).count() as u64
            })
            .sum()
    }

    /// Total bytes held by heads and clones across all pools.
    pub fn total_bytes(&self) -> u64 {
        let pools = self.pools.read().expect("lock poisoned");
        pools
            .values()
            .flat_map(|pool| pool.pgs.iter())
            .map(|pg| {
                let map = pg.read().expect("lock poisoned");
                map.values().map(ObjectRecord::footprint).sum::<u64>()
            })
            .sum()
    }

    fn pool(&self, pool: PoolId) -> StoreResult<Arc<Pool>> {
        self.pools
            .read()
            .expect("lock poisoned")
            .get(&pool)
            .cloned()
            .ok_or(StoreError::PoolNotFound(pool))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn create_pool(&self, name: &str, pg_count: u32) -> StoreResult<PoolInfo> {
        if name.is_empty() {
            return Err(StoreError::InvalidPoolName(name.to_string()));
        }
        let mut pools = self.pools.write().expect("lock poisoned");
        if pools.values().any(|p| p.name == name) {
            return Err(StoreError::PoolExists(name.to_string()));
        }
        let id = PoolId::new(self.next_pool_id.fetch_add(1, Ordering::AcqRel));
        let pool = Arc::new(Pool::new(id, name.to_string(), pg_count, 0));
        let info = pool.info();
        pools.insert(id, pool);
        debug!(pool = %id, name, pg_count, "pool created");
        Ok(info)
    }

    fn restore_pool(&self, info: PoolInfo) -> StoreResult<()> {
        let mut pools = self.pools.write().expect("lock poisoned");
        if pools.values().any(|p| p.name == info.name && p.id != info.id) {
            return Err(StoreError::PoolExists(info.name));
        }
        self.next_pool_id
            .fetch_max(info.id.get() + 1, Ordering::AcqRel);
        let pool = Arc::new(Pool::new(info.id, info.name, info.pg_count, info.snap_seq));
        pools.insert(info.id, pool);
        Ok(())
    }

    fn delete_pool(&self, pool: PoolId) -> StoreResult<()> {
        let removed = self.pools.write().expect("lock poisoned").remove(&pool);
        match removed {
            Some(p) => {
                debug!(pool = %pool, name = %p.name, "pool deleted");
                Ok(())
            }
            None => Err(StoreError::PoolNotFound(pool)),
        }
    }

    fn lookup_pool(&self, name: &str) -> StoreResult<Option<PoolId>> {
        let pools = self.pools.read().expect("lock poisoned");
        Ok(pools.values().find(|p| p.name == name).map(|p| p.id))
    }

    fn pool_info(&self, pool: PoolId) -> StoreResult<PoolInfo> {
        Ok(self.pool(pool)?.info())
    }

    fn pools(&self) -> StoreResult<Vec<PoolInfo>> {
        let pools = self.pools.read().expect("lock poisoned");
        let mut infos: Vec<PoolInfo> = pools.values().map(|p| p.info()).collect();
        infos.sort_by_key(|info| info.id);
        Ok(infos)
    }

    fn allocate_snap(&self, pool: PoolId) -> StoreResult<SnapId> {
        let pool = self.pool(pool)?;
        let id = pool.snap_seq.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(SnapId::new(id))
    }

    fn advance_snap_seq(&self, pool: PoolId, snap: SnapId) -> StoreResult<()> {
        self.pool(pool)?
            .snap_seq
            .fetch_max(snap.get(), Ordering::AcqRel);
        Ok(())
    }

    fn read(&self, pool: PoolId, key: &ObjectKey) -> StoreResult<Option<ObjectRecord>> {
        let pool = self.pool(pool)?;
        let map = pool.pg_for(key).read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn update(
        &self,
        pool: PoolId,
        key: &ObjectKey,
        mutation: &mut RecordUpdate<'_>,
    ) -> StoreResult<Option<ObjectRecord>> {
        let pool = self.pool(pool)?;
        let mut map = pool.pg_for(key).write().expect("lock poisoned");
        let mut working = map.get(key).cloned().unwrap_or_default();
        mutation(&mut working).map_err(StoreError::Aborted)?;
        if working.is_vacant() {
            map.remove(key);
            Ok(None)
        } else {
            map.insert(key.clone(), working.clone());
            Ok(Some(working))
        }
    }

    fn put(&self, pool: PoolId, key: &ObjectKey, record: Option<ObjectRecord>) -> StoreResult<()> {
        let pool = self.pool(pool)?;
        let mut map = pool.pg_for(key).write().expect("lock poisoned");
        match record {
            Some(record) if !record.is_vacant() => {
                map.insert(key.clone(), record);
            }
            _ => {
                map.remove(key);
            }
        }
        Ok(())
    }

    fn list(
        &self,
        pool: PoolId,
        placement: u32,
        after: Option<&ObjectKey>,
        max: usize,
    ) -> StoreResult<Vec<ObjectKey>> {
        let pool = self.pool(pool)?;
        let Some(pg) = pool.pgs.get(placement as usize) else {
            return Ok(Vec::new());
        };
        let map = pg.read().expect("lock poisoned");
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        Ok(map
            .range::<ObjectKey, _>((lower, Bound::Unbounded))
            .filter(|(_, record)| record.exists())
            .take(max)
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn export(&self, pool: PoolId) -> StoreResult<Vec<(ObjectKey, ObjectRecord)>> {
        let pool = self.pool(pool)?;
        let mut records = Vec::new();
        for pg in &pool.pgs {
            let map = pg.read().expect("lock poisoned");
            records.extend(map.iter().map(|(k, r)| (k.clone(), r.clone())));
        }
        Ok(records)
    }

    fn usage(&self, pool: PoolId) -> StoreResult<PoolUsage> {
        let pool = self.pool(pool)?;
        let mut usage = PoolUsage {
            reads: pool.reads.load(Ordering::Relaxed),
            read_bytes: pool.read_bytes.load(Ordering::Relaxed),
            writes: pool.writes.load(Ordering::Relaxed),
            write_bytes: pool.write_bytes.load(Ordering::Relaxed),
            ..Default::default()
        };
        for pg in &pool.pgs {
            let map = pg.read().expect("lock poisoned");
            for record in map.values() {
                usage.bytes += record.footprint();
                usage.objects += u64::from(record.exists());
                usage.clones += record.clones.len() as u64;
            }
        }
        Ok(usage)
    }

    fn record_read(&self, pool: PoolId, bytes: u64) {
        if let Ok(pool) = self.pool(pool) {
            pool.reads.fetch_add(1, Ordering::Relaxed);
            pool.read_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    fn record_write(&self, pool: PoolId, bytes: u64) {
        if let Ok(pool) = self.pool(pool) {
            pool.writes.fetch_add(1, Ordering::Relaxed);
            pool.write_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("pool_count", &self.pool_count())
            .field("object_count", &self.total_objects())
            .finish()
    }
}
