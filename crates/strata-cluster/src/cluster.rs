use std::sync::{Arc, Mutex};

use strata_client::{
    BatchKind, ClientResult, ClusterControl, CompletionNotifier, ContextSnapshot, Dispatcher,
    EncodedBatch, ListEntry, ListPage, ListPosition, LogCallback,
};
use strata_journal::{export_records, replay_into, Journal, JournalConfig, JournalRecord};
use strata_store::{InMemoryObjectStore, ObjectStore, PoolInfo};
use strata_types::{bytes_to_kb, ClusterStat, ErrorKind, LogLevel, ObjectKey, PoolId, PoolStat, SnapId};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::classes::ClassRegistry;
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::exec::Executor;
use crate::log::ClusterLog;

const WHO: &str = "cluster";

/// A batch waiting in an op queue.
struct Job {
    batch: EncodedBatch,
    key: ObjectKey,
    snapshot: ContextSnapshot,
    notifier: CompletionNotifier,
}

struct Inner {
    config: ClusterConfig,
    store: InMemoryObjectStore,
    journal: Option<Journal>,
    executor: Executor,
    log: ClusterLog,
    /// Serializes pool lifecycle changes with their journal records.
    pools: Mutex<()>,
}

/// In-process cluster executing batches on its own tokio runtime.
///
/// Batches are routed to op shards by (pool, placement group), so batches
/// on one object run in submission order while other objects proceed in
/// parallel. Each write is acknowledged once applied and journaled, and
/// made durable once the journal is synced. Without a data directory,
/// writes are durable as soon as they are acknowledged.
pub struct LocalCluster {
    inner: Arc<Inner>,
    shards: Vec<mpsc::UnboundedSender<Job>>,
    runtime: Option<Runtime>,
}

impl LocalCluster {
    /// Start an in-memory cluster with the default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::open(ClusterConfig::in_memory())
    }

    /// Start a cluster, replaying the journal when `config.data_dir` is set.
    pub fn open(config: ClusterConfig) -> Result<Self> {
        Self::open_with_classes(config, ClassRegistry::with_builtins())
    }

    pub fn open_with_classes(config: ClusterConfig, classes: ClassRegistry) -> Result<Self> {
        config.validate()?;
        let store = InMemoryObjectStore::new();
        let journal = match config.journal_path() {
            Some(path) => {
                let journal = Journal::open(
                    &path,
                    JournalConfig {
                        sync_mode: config.sync_mode,
                    },
                )?;
                let records = journal.recover()?;
                let stats = replay_into(&store, &records)?;
                info!(
                    path = %path.display(),
                    records = records.len(),
                    pools = stats.pools,
                    objects = stats.objects,
                    skipped = stats.skipped,
                    "journal replayed"
                );
                if config.compact_on_open && !records.is_empty() {
                    journal.rewrite(&export_records(&store)?)?;
                }
                Some(journal)
            }
            None => None,
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("strata-cluster")
            .enable_all()
            .build()
            .map_err(|e| ClusterError::Runtime(e.to_string()))?;

        let inner = Arc::new(Inner {
            executor: Executor::new(Arc::new(classes), config.max_object_size),
            log: ClusterLog::new(config.log_capacity),
            store,
            journal,
            pools: Mutex::new(()),
            config,
        });

        let shards = (0..inner.config.op_shards)
            .map(|index| {
                let (tx, rx) = mpsc::unbounded_channel();
                runtime.spawn(run_shard(Arc::clone(&inner), index, rx));
                tx
            })
            .collect();

        info!(
            shards = inner.config.op_shards,
            persistent = inner.journal.is_some(),
            "cluster started"
        );
        inner.log.emit(LogLevel::Info, WHO, "cluster started");
        Ok(Self {
            inner,
            shards,
            runtime: Some(runtime),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Direct access to the backing store.
    pub fn store(&self) -> &dyn ObjectStore {
        &self.inner.store
    }

    /// Append an entry to the cluster log.
    pub fn log(&self, level: LogLevel, who: &str, msg: impl Into<String>) {
        self.inner.log.emit(level, who, msg);
    }

    fn shard_for(&self, pool: PoolId, placement: u32) -> usize {
        let mixed = pool.get().wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ u64::from(placement);
        (mixed % self.shards.len() as u64) as usize
    }

    fn pool_info(&self, pool: PoolId) -> Result<PoolInfo> {
        Ok(self.inner.store.pool_info(pool)?)
    }

    fn create_pool_inner(&self, name: &str) -> Result<PoolId> {
        let _guard = self.inner.pools.lock().expect("lock poisoned");
        let info = self.inner.store.create_pool(name, self.inner.config.pg_count)?;
        self.inner.persist(&JournalRecord::PoolCreated(info.clone()))?;
        self.inner
            .log
            .emit(LogLevel::Info, WHO, format!("pool '{name}' created"));
        Ok(info.id)
    }

    fn delete_pool_inner(&self, name: &str) -> Result<()> {
        let _guard = self.inner.pools.lock().expect("lock poisoned");
        let pool = self
            .inner
            .store
            .lookup_pool(name)?
            .ok_or_else(|| ClusterError::PoolNotFound(name.to_string()))?;
        self.inner.store.delete_pool(pool)?;
        self.inner.persist(&JournalRecord::PoolDeleted { pool })?;
        self.inner
            .log
            .emit(LogLevel::Info, WHO, format!("pool '{name}' removed"));
        Ok(())
    }

    fn create_snapshot_inner(&self, pool: PoolId) -> Result<SnapId> {
        let _guard = self.inner.pools.lock().expect("lock poisoned");
        let snap = self.inner.store.allocate_snap(pool)?;
        self.inner.persist(&JournalRecord::SnapAllocated { pool, snap })?;
        debug!(pool = %pool, snap = %snap, "snapshot allocated");
        Ok(snap)
    }

    fn pool_stat_inner(&self, pool: PoolId) -> Result<PoolStat> {
        let usage = self.inner.store.usage(pool)?;
        Ok(PoolStat {
            num_bytes: usage.bytes,
            num_kb: bytes_to_kb(usage.bytes),
            num_objects: usage.objects,
            num_object_clones: usage.clones,
            num_object_copies: usage.objects * u64::from(self.inner.config.replicas),
            num_objects_missing_on_primary: 0,
            num_objects_unfound: 0,
            num_objects_degraded: 0,
            num_rd: usage.reads,
            num_rd_kb: bytes_to_kb(usage.read_bytes),
            num_wr: usage.writes,
            num_wr_kb: bytes_to_kb(usage.write_bytes),
        })
    }

    fn cluster_stat_inner(&self) -> Result<ClusterStat> {
        let mut used = 0;
        let mut objects = 0;
        for info in self.inner.store.pools()? {
            let usage = self.inner.store.usage(info.id)?;
            used += usage.bytes;
            objects += usage.objects;
        }
        let kb = bytes_to_kb(self.inner.config.capacity_bytes);
        let kb_used = bytes_to_kb(used);
        Ok(ClusterStat {
            kb,
            kb_used,
            kb_avail: kb.saturating_sub(kb_used),
            num_objects: objects,
        })
    }

    fn list_objects_inner(
        &self,
        pool: PoolId,
        position: &ListPosition,
        max: usize,
    ) -> Result<ListPage> {
        let pg_count = self.pool_info(pool)?.pg_count;
        let max = max.max(1);
        let mut entries = Vec::new();
        let mut placement = position.placement;
        let mut after = position.after.clone();

        // Fetch one extra entry to learn whether another page follows.
        while placement < pg_count && entries.len() <= max {
            let want = max + 1 - entries.len();
            let keys = self.inner.store.list(pool, placement, after.as_ref(), want)?;
            entries.extend(keys.into_iter().map(|key| ListEntry {
                name: key.name().to_string(),
                locator: key.locator().map(str::to_string),
                placement,
            }));
            placement += 1;
            after = None;
        }

        let next = if entries.len() > max {
            entries.truncate(max);
            entries.last().map(ListEntry::position)
        } else {
            None
        };
        Ok(ListPage { entries, next })
    }
}

impl Inner {
    /// Append `record` and sync it before returning.
    fn persist(&self, record: &JournalRecord) -> Result<()> {
        if let Some(journal) = &self.journal {
            let offset = journal.append(record)?;
            journal.sync_through(offset)?;
        }
        Ok(())
    }

    /// Apply one job. Returns the journal offset a write must be synced
    /// through before it is durable, with the notifier still waiting on it.
    fn process(&self, job: Job) -> Option<(u64, CompletionNotifier)> {
        let Job {
            batch,
            key,
            snapshot,
            notifier,
        } = job;
        let kind = batch.kind();
        let decoded = match batch.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(completion = %notifier.id(), error = %e, "undecodable batch");
                notifier.fail(ErrorKind::InvalidOperation);
                return None;
            }
        };

        let mut journaled = None;
        let executed = match &self.journal {
            Some(journal) => {
                self.executor
                    .execute_with(&self.store, &key, &snapshot, &decoded, &mut |post| {
                        let entry = JournalRecord::ObjectUpdated {
                            pool: snapshot.pool,
                            key: key.clone(),
                            record: post.clone(),
                        };
                        match journal.append(&entry) {
                            Ok(offset) => {
                                journaled = Some(offset);
                                Ok(())
                            }
                            Err(e) => {
                                error!(object = %key, error = %e, "journal append failed");
                                self.log.emit(
                                    LogLevel::Error,
                                    WHO,
                                    format!("journal append failed: {e}"),
                                );
                                Err(e.kind())
                            }
                        }
                    })
            }
            None => self.executor.execute(&self.store, &key, &snapshot, &decoded),
        };
        let execution = match executed {
            Ok(execution) => execution,
            Err(err) => {
                debug!(completion = %notifier.id(), object = %key, error = %err, "batch failed");
                notifier.fail(err);
                return None;
            }
        };
        match kind {
            BatchKind::Read => self.store.record_read(snapshot.pool, execution.read_bytes),
            BatchKind::Write => self.store.record_write(snapshot.pool, execution.write_bytes),
        }

        debug!(completion = %notifier.id(), object = %key, "batch applied");
        notifier.acknowledge(execution.outcome);
        if kind == BatchKind::Read {
            return None;
        }
        match journaled {
            None => {
                notifier.durable();
                None
            }
            Some(offset) => Some((offset, notifier)),
        }
    }

    fn make_durable(&self, offset: u64, notifier: CompletionNotifier) {
        let Some(journal) = &self.journal else {
            notifier.durable();
            return;
        };
        match journal.sync_through(offset) {
            Ok(()) => notifier.durable(),
            Err(e) => {
                error!(offset, error = %e, "journal sync failed");
                self.log
                    .emit(LogLevel::Error, WHO, format!("journal sync failed: {e}"));
                notifier.fail(ErrorKind::Transport);
            }
        }
    }
}

async fn run_shard(inner: Arc<Inner>, index: usize, mut rx: mpsc::UnboundedReceiver<Job>) {
    debug!(shard = index, "op shard started");
    // Jobs on one shard are applied one at a time, in submission order.
    while let Some(job) = rx.recv().await {
        let worker = Arc::clone(&inner);
        match tokio::task::spawn_blocking(move || worker.process(job)).await {
            Ok(Some((offset, notifier))) => {
                let worker = Arc::clone(&inner);
                tokio::task::spawn_blocking(move || worker.make_durable(offset, notifier));
            }
            Ok(None) => {}
            Err(e) => error!(shard = index, error = %e, "batch worker failed"),
        }
    }
    debug!(shard = index, "op shard stopped");
}

impl Dispatcher for LocalCluster {
    fn submit_batch(
        &self,
        batch: EncodedBatch,
        key: ObjectKey,
        snapshot: ContextSnapshot,
        notifier: CompletionNotifier,
    ) {
        let info = match self.pool_info(snapshot.pool) {
            Ok(info) => info,
            Err(e) => {
                debug!(pool = %snapshot.pool, error = %e, "batch for unknown pool");
                notifier.fail(e.kind());
                return;
            }
        };
        let placement = key.placement(info.pg_count);
        let shard = self.shard_for(snapshot.pool, placement);
        let job = Job {
            batch,
            key,
            snapshot,
            notifier,
        };
        if let Err(mpsc::error::SendError(job)) = self.shards[shard].send(job) {
            warn!(shard, "op shard closed");
            job.notifier.fail(ErrorKind::Transport);
        }
    }
}

impl ClusterControl for LocalCluster {
    fn create_pool(&self, name: &str) -> ClientResult<PoolId> {
        Ok(self.create_pool_inner(name)?)
    }

    fn delete_pool(&self, name: &str) -> ClientResult<()> {
        Ok(self.delete_pool_inner(name)?)
    }

    fn lookup_pool(&self, name: &str) -> ClientResult<Option<PoolId>> {
        Ok(self
            .inner
            .store
            .lookup_pool(name)
            .map_err(ClusterError::from)?)
    }

    fn list_pools(&self) -> ClientResult<Vec<(PoolId, String)>> {
        let mut pools = self.inner.store.pools().map_err(ClusterError::from)?;
        pools.sort_by_key(|p| p.id);
        Ok(pools.into_iter().map(|p| (p.id, p.name)).collect())
    }

    fn pool_stat(&self, pool: PoolId) -> ClientResult<PoolStat> {
        Ok(self.pool_stat_inner(pool)?)
    }

    fn cluster_stat(&self) -> ClientResult<ClusterStat> {
        Ok(self.cluster_stat_inner()?)
    }

    fn create_snapshot(&self, pool: PoolId) -> ClientResult<SnapId> {
        Ok(self.create_snapshot_inner(pool)?)
    }

    fn list_objects(
        &self,
        pool: PoolId,
        position: &ListPosition,
        max: usize,
    ) -> ClientResult<ListPage> {
        Ok(self.list_objects_inner(pool, position, max)?)
    }

    fn monitor_log(&self, level: LogLevel, callback: Option<LogCallback>) -> ClientResult<()> {
        let runtime = self.runtime.as_ref().ok_or(ClusterError::Shutdown)?;
        self.inner.log.monitor(runtime.handle(), level, callback);
        Ok(())
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.shards.clear();
        if let Some(journal) = &self.inner.journal {
            if let Err(e) = journal.sync() {
                warn!(error = %e, "final journal sync failed");
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!("cluster stopped");
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("shards", &self.shards.len())
            .field("persistent", &self.inner.journal.is_some())
            .field("pools", &self.inner.store.pool_count())
            .finish()
    }
}
