//! Scripted cluster used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use strata_types::{ClusterStat, LogEntry, LogLevel, ObjectKey, PoolId, PoolStat, SnapId};

use crate::codec::EncodedBatch;
use crate::completion::CompletionNotifier;
use crate::context::ContextSnapshot;
use crate::dispatch::{ClusterControl, Dispatcher, ListEntry, ListPage, ListPosition, LogCallback};
use crate::error::{ClientError, ClientResult};
use crate::op::{BatchKind, BatchOutcome, SubOpResult};

pub(crate) struct Submission {
    #[allow(dead_code)]
    pub batch: EncodedBatch,
    pub key: ObjectKey,
    pub snapshot: ContextSnapshot,
    pub notifier: CompletionNotifier,
}

/// Records submissions; optionally completes them immediately.
#[derive(Default)]
pub(crate) struct ScriptedCluster {
    pools: Mutex<Vec<(PoolId, String)>>,
    next_pool: AtomicU64,
    next_snap: AtomicU64,
    pending: Mutex<Vec<Submission>>,
    submitted: AtomicUsize,
    auto: AtomicBool,
    response: Mutex<Option<BatchOutcome>>,
    listing: Mutex<Vec<ListEntry>>,
    list_calls: AtomicUsize,
    log: Mutex<Option<(LogLevel, LogCallback)>>,
}

impl ScriptedCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&self, name: &str) -> PoolId {
        let id = PoolId::new(self.next_pool.fetch_add(1, Ordering::SeqCst) + 1);
        self.pools.lock().unwrap().push((id, name.to_string()));
        id
    }

    pub fn auto_complete(&self, on: bool) {
        self.auto.store(on, Ordering::SeqCst);
    }

    /// Outcome used by auto-completion instead of plain success.
    pub fn respond_with(&self, outcome: BatchOutcome) {
        *self.response.lock().unwrap() = Some(outcome);
    }

    pub fn take_pending(&self) -> Vec<Submission> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn set_listing(&self, mut entries: Vec<ListEntry>) {
        entries.sort_by(|a, b| (a.placement, &a.name).cmp(&(b.placement, &b.name)));
        *self.listing.lock().unwrap() = entries;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn emit(&self, entry: &LogEntry) {
        if let Some((level, callback)) = &*self.log.lock().unwrap() {
            if entry.level >= *level {
                callback(entry);
            }
        }
    }
}

impl Dispatcher for ScriptedCluster {
    fn submit_batch(
        &self,
        batch: EncodedBatch,
        key: ObjectKey,
        snapshot: ContextSnapshot,
        notifier: CompletionNotifier,
    ) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        if self.auto.load(Ordering::SeqCst) {
            let outcome = self.response.lock().unwrap().clone().unwrap_or_else(|| {
                BatchOutcome::success(vec![SubOpResult::default(); batch.op_count()])
            });
            let ok = outcome.rval >= 0;
            notifier.acknowledge(outcome);
            if ok && batch.kind() == BatchKind::Write {
                notifier.durable();
            }
            return;
        }
        self.pending.lock().unwrap().push(Submission {
            batch,
            key,
            snapshot,
            notifier,
        });
    }
}

impl ClusterControl for ScriptedCluster {
    fn create_pool(&self, name: &str) -> ClientResult<PoolId> {
        Ok(self.add_pool(name))
    }

    fn delete_pool(&self, name: &str) -> ClientResult<()> {
        let mut pools = self.pools.lock().unwrap();
        let before = pools.len();
        pools.retain(|(_, n)| n != name);
        if pools.len() == before {
            return Err(ClientError::PoolNotFound(name.to_string()));
        }
        Ok(())
    }

    fn lookup_pool(&self, name: &str) -> ClientResult<Option<PoolId>> {
        let pools = self.pools.lock().unwrap();
        Ok(pools.iter().find(|(_, n)| n == name).map(|(id, _)| *id))
    }

    fn list_pools(&self) -> ClientResult<Vec<(PoolId, String)>> {
        Ok(self.pools.lock().unwrap().clone())
    }

    fn pool_stat(&self, _pool: PoolId) -> ClientResult<PoolStat> {
        Ok(PoolStat::default())
    }

    fn cluster_stat(&self) -> ClientResult<ClusterStat> {
        Ok(ClusterStat::default())
    }

    fn create_snapshot(&self, _pool: PoolId) -> ClientResult<SnapId> {
        Ok(SnapId::new(self.next_snap.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn list_objects(
        &self,
        _pool: PoolId,
        position: &ListPosition,
        max: usize,
    ) -> ClientResult<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let listing = self.listing.lock().unwrap();
        let after = position.after.as_ref().map(|k| k.name().to_string());
        let remaining: Vec<&ListEntry> = listing
            .iter()
            .filter(|e| match &after {
                Some(name) => {
                    e.placement > position.placement
                        || (e.placement == position.placement && &e.name > name)
                }
                None => e.placement >= position.placement,
            })
            .collect();
        let entries: Vec<ListEntry> = remaining.iter().take(max).map(|e| (*e).clone()).collect();
        let next = if remaining.len() > entries.len() {
            entries.last().map(ListEntry::position)
        } else {
            None
        };
        Ok(ListPage { entries, next })
    }

    fn monitor_log(&self, level: LogLevel, callback: Option<LogCallback>) -> ClientResult<()> {
        *self.log.lock().unwrap() = callback.map(|cb| (level, cb));
        Ok(())
    }
}
