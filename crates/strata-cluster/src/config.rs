use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_journal::SyncMode;

use crate::error::{ClusterError, Result};

/// Name of the journal file inside [`ClusterConfig::data_dir`].
pub const JOURNAL_FILE: &str = "journal.log";

/// Configuration for a [`LocalCluster`](crate::LocalCluster).
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// data_dir = "/var/lib/strata"
/// sync_mode = "every_write"
/// op_shards = 16
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Directory holding the journal. `None` keeps everything in memory and
    /// makes writes durable as soon as they are acknowledged.
    pub data_dir: Option<PathBuf>,
    pub sync_mode: SyncMode,
    /// Placement groups per new pool.
    pub pg_count: u32,
    /// Op queues; batches on one placement group always share a queue.
    pub op_shards: usize,
    pub worker_threads: usize,
    /// Largest object size a write may produce.
    pub max_object_size: u64,
    /// Raw capacity reported by cluster statistics.
    pub capacity_bytes: u64,
    /// Copies per object reported by pool statistics.
    pub replicas: u32,
    /// Buffered cluster log entries per monitor before it starts lagging.
    pub log_capacity: usize,
    /// Rewrite the journal as one record per live object after replay.
    pub compact_on_open: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_mode: SyncMode::EveryWrite,
            pg_count: 32,
            op_shards: 8,
            worker_threads: 2,
            max_object_size: 128 * 1024 * 1024,
            capacity_bytes: 1 << 40,
            replicas: 3,
            log_capacity: 1024,
            compact_on_open: true,
        }
    }
}

impl ClusterConfig {
    /// In-memory configuration with the default tuning.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Journal-backed configuration rooted at `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ClusterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Reject values the cluster cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pg_count == 0 {
            return Err(ClusterError::Config("pg_count must be at least 1".into()));
        }
        if self.op_shards == 0 {
            return Err(ClusterError::Config("op_shards must be at least 1".into()));
        }
        if self.worker_threads == 0 {
            return Err(ClusterError::Config("worker_threads must be at least 1".into()));
        }
        if self.log_capacity == 0 {
            return Err(ClusterError::Config("log_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(JOURNAL_FILE))
    }
}
