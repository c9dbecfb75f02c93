use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Size and modification time of one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStat {
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// Usage counters for a pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStat {
    /// Space used in bytes.
    pub num_bytes: u64,
    /// Space used in KiB, rounded up.
    pub num_kb: u64,
    pub num_objects: u64,
    /// Snapshot clones held for objects in the pool.
    pub num_object_clones: u64,
    /// `num_objects * replicas`.
    pub num_object_copies: u64,
    pub num_objects_missing_on_primary: u64,
    /// Objects found on no storage node.
    pub num_objects_unfound: u64,
    /// Objects with fewer copies than configured.
    pub num_objects_degraded: u64,
    pub num_rd: u64,
    pub num_rd_kb: u64,
    pub num_wr: u64,
    pub num_wr_kb: u64,
}

/// Cluster-wide usage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStat {
    pub kb: u64,
    pub kb_used: u64,
    pub kb_avail: u64,
    pub num_objects: u64,
}

/// Round a byte count up to KiB.
pub fn bytes_to_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}
