use strata_store::{ObjectStore, StoreError};
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::JournalRecord;

/// Counters from one replay.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Pools created, including ones deleted later.
    pub pools: u64,
    pub snaps: u64,
    pub objects: u64,
    /// Records for pools deleted later in the journal.
    pub skipped: u64,
}

/// Apply recovered records to `store` in journal order.
///
/// Records that refer to a pool which no longer exists are skipped: the
/// pool was deleted after them.
pub fn replay_into(store: &dyn ObjectStore, records: &[JournalRecord]) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    for record in records {
        let applied = match record {
            JournalRecord::PoolCreated(info) => {
                store.restore_pool(info.clone()).map(|()| stats.pools += 1)
            }
            JournalRecord::PoolDeleted { pool } => store.delete_pool(*pool),
            JournalRecord::SnapAllocated { pool, snap } => store
                .advance_snap_seq(*pool, *snap)
                .map(|()| stats.snaps += 1),
            JournalRecord::ObjectUpdated { pool, key, record } => store
                .put(*pool, key, record.clone())
                .map(|()| stats.objects += 1),
        };
        match applied {
            Ok(()) => {}
            Err(StoreError::PoolNotFound(pool)) => {
                warn!(pool = %pool, "journal record for missing pool; skipping");
                stats.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    debug!(?stats, "journal replay complete");
    Ok(stats)
}

/// Records that rebuild the current contents of `store` from nothing.
///
/// Used to compact a journal: replaying the result yields the same pools,
/// snapshot sequences, and object records.
pub fn export_records(store: &dyn ObjectStore) -> Result<Vec<JournalRecord>> {
    let mut records = Vec::new();
    for info in store.pools()? {
        let pool = info.id;
        records.push(JournalRecord::PoolCreated(info));
        for (key, record) in store.export(pool)? {
            records.push(JournalRecord::ObjectUpdated {
                pool,
                key,
                record: Some(record),
            });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use strata_store::{InMemoryObjectStore, ObjectRecord, ObjectState, PoolInfo};
    use strata_types::{ObjectKey, PoolId, SnapId};

    fn pool_info(id: u64, name: &str) -> PoolInfo {
        PoolInfo {
            id: PoolId::new(id),
            name: name.into(),
            pg_count: 4,
            snap_seq: 0,
        }
    }

    fn record_with(bytes: &[u8]) -> ObjectRecord {
        let mut state = ObjectState::new(DateTime::<Utc>::UNIX_EPOCH);
        state.write_full(bytes);
        ObjectRecord {
            head: Some(state),
            ..Default::default()
        }
    }

    #[test]
    fn replay_rebuilds_pools_and_objects() {
        let key = ObjectKey::new("obj", None).unwrap();
        let records = vec![
            JournalRecord::PoolCreated(pool_info(3, "data")),
            JournalRecord::SnapAllocated {
                pool: PoolId::new(3),
                snap: SnapId::new(1),
            },
            JournalRecord::ObjectUpdated {
                pool: PoolId::new(3),
                key: key.clone(),
                record: Some(record_with(b"v1")),
            },
            JournalRecord::ObjectUpdated {
                pool: PoolId::new(3),
                key: key.clone(),
                record: Some(record_with(b"v2")),
            },
        ];

        let store = InMemoryObjectStore::new();
        let stats = replay_into(&store, &records).unwrap();
        assert_eq!(stats.pools, 1);
        assert_eq!(stats.objects, 2);

        let pool = store.lookup_pool("data").unwrap().unwrap();
        assert_eq!(pool, PoolId::new(3));
        assert_eq!(store.pool_info(pool).unwrap().snap_seq, 1);
        let head = store.read(pool, &key).unwrap().unwrap().head.unwrap();
        assert_eq!(head.data, b"v2");
    }

    #[test]
    fn records_after_pool_deletion_are_skipped() {
        let key = ObjectKey::new("obj", None).unwrap();
        let records = vec![
            JournalRecord::PoolCreated(pool_info(1, "gone")),
            JournalRecord::PoolDeleted { pool: PoolId::new(1) },
            JournalRecord::ObjectUpdated {
                pool: PoolId::new(1),
                key,
                record: None,
            },
        ];
        let store = InMemoryObjectStore::new();
        let stats = replay_into(&store, &records).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.pool_count(), 0);
    }

    #[test]
    fn export_then_replay_is_equivalent() {
        let source = InMemoryObjectStore::new();
        let info = source.create_pool("data", 4).unwrap();
        source.allocate_snap(info.id).unwrap();
        for name in ["a", "b", "c"] {
            let key = ObjectKey::new(name, None).unwrap();
            source
                .put(info.id, &key, Some(record_with(name.as_bytes())))
                .unwrap();
        }

        let records = export_records(&source).unwrap();
        let target = InMemoryObjectStore::new();
        replay_into(&target, &records).unwrap();

        assert_eq!(target.pools().unwrap(), source.pools().unwrap());
        let mut left = source.export(info.id).unwrap();
        let mut right = target.export(info.id).unwrap();
        left.sort_by(|a, b| a.0.cmp(&b.0));
        right.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(left, right);
    }
}
