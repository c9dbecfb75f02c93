use std::sync::Arc;

use strata_types::{ObjectKey, PoolId, SnapContext, SnapId};

use crate::error::ClientResult;
use crate::inflight::InflightTracker;
use crate::session::Session;

/// Address fields captured when a batch is submitted.
///
/// In-flight batches only ever see their snapshot, so mutating the context
/// afterwards cannot affect them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub pool: PoolId,
    pub locator: Option<String>,
    pub read_snap: SnapId,
    pub snapc: SnapContext,
}

/// Which pool, locator key, and snapshots apply to the operations issued
/// through it.
///
/// Setters take `&mut self`, so a context cannot be reconfigured while
/// borrowed elsewhere. Cloning yields an independent context with its own
/// outstanding-write tracking, the way to give each thread its own view.
pub struct IoContext {
    pub(crate) session: Session,
    pool: PoolId,
    pool_name: String,
    locator: Option<String>,
    read_snap: SnapId,
    snapc: SnapContext,
    pub(crate) tracker: Arc<InflightTracker>,
}

impl IoContext {
    pub(crate) fn new(session: Session, pool: PoolId, pool_name: String) -> Self {
        Self {
            session,
            pool,
            pool_name,
            locator: None,
            read_snap: SnapId::HEAD,
            snapc: SnapContext::empty(),
            tracker: InflightTracker::new(),
        }
    }

    /// Point the context at another pool.
    pub fn set_pool(&mut self, name: &str) -> ClientResult<()> {
        self.pool = self.session.lookup_pool(name)?;
        self.pool_name = name.to_string();
        Ok(())
    }

    /// Override the key used for placement. `None` or an empty key places
    /// objects by name.
    pub fn set_locator_key(&mut self, key: Option<&str>) {
        self.locator = key.filter(|k| !k.is_empty()).map(str::to_string);
    }

    /// Snapshot that reads observe. [`SnapId::HEAD`] reads live objects.
    pub fn set_read_snapshot(&mut self, snap: SnapId) {
        self.read_snap = snap;
    }

    /// Snapshot set that writes must stay consistent with.
    pub fn set_write_snapshot_set(&mut self, seq: u64, snaps: Vec<SnapId>) -> ClientResult<()> {
        self.snapc = SnapContext::new(seq, snaps)?;
        Ok(())
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn locator_key(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    pub fn read_snapshot(&self) -> SnapId {
        self.read_snap
    }

    pub fn write_snapshot_set(&self) -> &SnapContext {
        &self.snapc
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Immutable copy of the address fields.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            pool: self.pool,
            locator: self.locator.clone(),
            read_snap: self.read_snap,
            snapc: self.snapc.clone(),
        }
    }

    /// Key for `name` under the current locator.
    pub fn key(&self, name: &str) -> ClientResult<ObjectKey> {
        Ok(ObjectKey::new(name, self.locator.clone())?)
    }

    /// Writes submitted through this context that are not yet terminal.
    pub fn outstanding_writes(&self) -> u64 {
        self.tracker.outstanding()
    }
}

impl Clone for IoContext {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            pool: self.pool,
            pool_name: self.pool_name.clone(),
            locator: self.locator.clone(),
            read_snap: self.read_snap,
            snapc: self.snapc.clone(),
            tracker: InflightTracker::new(),
        }
    }
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext")
            .field("pool", &self.pool)
            .field("pool_name", &self.pool_name)
            .field("locator", &self.locator)
            .field("read_snap", &self.read_snap)
            .field("snapc", &self.snapc)
            .finish()
    }
}
