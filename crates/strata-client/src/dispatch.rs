use serde::{Deserialize, Serialize};
use strata_types::{ClusterStat, LogEntry, LogLevel, ObjectKey, PoolId, PoolStat, SnapId};

use crate::codec::EncodedBatch;
use crate::completion::CompletionNotifier;
use crate::context::ContextSnapshot;
use crate::error::ClientResult;

/// Sends encoded batches to the cluster.
///
/// Contract: for every submitted batch the implementation eventually
/// delivers exactly one acknowledgment and, for write batches, exactly one
/// durability event through the notifier, or a single failure in place of
/// either. Retries and deadlines are the implementation's business. Dropping
/// the notifier without a terminal event cancels the completion.
pub trait Dispatcher: Send + Sync {
    fn submit_batch(
        &self,
        batch: EncodedBatch,
        key: ObjectKey,
        snapshot: ContextSnapshot,
        notifier: CompletionNotifier,
    );
}

/// Callback receiving cluster log entries.
pub type LogCallback = Box<dyn Fn(&LogEntry) + Send + Sync + 'static>;

/// Request/response calls of an already-connected cluster.
pub trait ClusterControl: Dispatcher {
    fn create_pool(&self, name: &str) -> ClientResult<PoolId>;

    fn delete_pool(&self, name: &str) -> ClientResult<()>;

    fn lookup_pool(&self, name: &str) -> ClientResult<Option<PoolId>>;

    /// Pools as `(id, name)`, ordered by id.
    fn list_pools(&self) -> ClientResult<Vec<(PoolId, String)>>;

    fn pool_stat(&self, pool: PoolId) -> ClientResult<PoolStat>;

    fn cluster_stat(&self) -> ClientResult<ClusterStat>;

    /// Allocate a self-managed snapshot id in `pool`.
    fn create_snapshot(&self, pool: PoolId) -> ClientResult<SnapId>;

    /// One page of object names starting at `position`.
    fn list_objects(
        &self,
        pool: PoolId,
        position: &ListPosition,
        max: usize,
    ) -> ClientResult<ListPage>;

    /// Replace the log registration. `None` deregisters.
    fn monitor_log(&self, level: LogLevel, callback: Option<LogCallback>) -> ClientResult<()>;
}

/// Resume token for object listing.
///
/// Listing walks placement groups in order and keys in order within one
/// group. The token names the group and the last key returned from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListPosition {
    pub placement: u32,
    pub after: Option<ObjectKey>,
}

impl ListPosition {
    /// Beginning of the pool.
    pub fn start() -> Self {
        Self::default()
    }
}

/// One listed object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub locator: Option<String>,
    /// Placement group the object lives in.
    pub placement: u32,
}

impl ListEntry {
    /// Position that resumes listing just after this entry.
    pub fn position(&self) -> ListPosition {
        ListPosition {
            placement: self.placement,
            after: ObjectKey::new(self.name.as_str(), self.locator.clone()).ok(),
        }
    }
}

/// One page of a listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    /// Where the next page starts; `None` at the end of the pool.
    pub next: Option<ListPosition>,
}
