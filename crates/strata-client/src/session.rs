use std::sync::Arc;

use strata_types::{ClusterStat, LogLevel, PoolId, PoolStat, SnapId};
use tracing::{debug, info};

use crate::codec::BatchCodec;
use crate::completion::{Callbacks, Completion, ReturnPolicy};
use crate::config::ClientConfig;
use crate::context::IoContext;
use crate::cursor::ObjectCursor;
use crate::dispatch::{ClusterControl, ListPosition, LogCallback};
use crate::error::{ClientError, ClientResult};
use crate::op::{BatchKind, OperationBatch};

/// How long [`OperationBatch::submit`] blocks before returning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitMode {
    /// Return a pending completion immediately.
    #[default]
    Async,
    /// Block until acknowledged or failed.
    WaitAcknowledged,
    /// Block until durable or failed.
    WaitDurable,
}

struct SessionInner {
    cluster: Arc<dyn ClusterControl>,
    config: ClientConfig,
}

/// Handle on an already-connected cluster.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn connect(cluster: Arc<dyn ClusterControl>) -> Self {
        Self::connect_with_config(cluster, ClientConfig::default())
    }

    pub fn connect_with_config(cluster: Arc<dyn ClusterControl>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner { cluster, config }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn create_pool(&self, name: &str) -> ClientResult<PoolId> {
        let pool = self.inner.cluster.create_pool(name)?;
        info!(pool = %pool, name, "pool created");
        Ok(pool)
    }

    pub fn delete_pool(&self, name: &str) -> ClientResult<()> {
        self.inner.cluster.delete_pool(name)?;
        info!(name, "pool deleted");
        Ok(())
    }

    pub fn lookup_pool(&self, name: &str) -> ClientResult<PoolId> {
        self.inner
            .cluster
            .lookup_pool(name)?
            .ok_or_else(|| ClientError::PoolNotFound(name.to_string()))
    }

    /// Pool names, ordered by pool id.
    pub fn list_pools(&self) -> ClientResult<Vec<String>> {
        Ok(self
            .inner
            .cluster
            .list_pools()?
            .into_iter()
            .map(|(_, name)| name)
            .collect())
    }

    pub fn pool_stat(&self, name: &str) -> ClientResult<PoolStat> {
        let pool = self.lookup_pool(name)?;
        self.inner.cluster.pool_stat(pool)
    }

    pub fn cluster_stat(&self) -> ClientResult<ClusterStat> {
        self.inner.cluster.cluster_stat()
    }

    /// Allocate a self-managed snapshot id in the pool.
    pub fn create_snapshot(&self, pool: &str) -> ClientResult<SnapId> {
        let pool = self.lookup_pool(pool)?;
        self.inner.cluster.create_snapshot(pool)
    }

    /// A fresh context on `pool`, reading the live view.
    pub fn io_context(&self, pool: &str) -> ClientResult<IoContext> {
        let id = self.lookup_pool(pool)?;
        Ok(IoContext::new(self.clone(), id, pool.to_string()))
    }

    /// List every object in `pool`.
    pub fn list_objects(&self, pool: &str) -> ClientResult<ObjectCursor> {
        self.list_objects_from(pool, ListPosition::start())
    }

    /// Resume a listing at a position taken from [`ObjectCursor::position`].
    pub fn list_objects_from(&self, pool: &str, from: ListPosition) -> ClientResult<ObjectCursor> {
        let pool = self.lookup_pool(pool)?;
        Ok(self.open_cursor(pool, from))
    }

    pub(crate) fn open_cursor(&self, pool: PoolId, from: ListPosition) -> ObjectCursor {
        ObjectCursor::open(
            Arc::clone(&self.inner.cluster),
            pool,
            from,
            self.inner.config.list_page_size,
        )
    }

    /// Register `callback` for cluster log entries at `level` or above,
    /// replacing any earlier registration. `None` deregisters.
    pub fn monitor_log(&self, level: LogLevel, callback: Option<LogCallback>) -> ClientResult<()> {
        self.inner.cluster.monitor_log(level, callback)
    }

    /// Validate, encode, and hand a batch to the dispatcher.
    pub(crate) fn submit(
        &self,
        ctx: &IoContext,
        object: &str,
        batch: OperationBatch,
        mode: SubmitMode,
        policy: ReturnPolicy,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        if batch.is_empty() {
            return Err(ClientError::InvalidOperation("empty batch".into()));
        }
        let key = ctx.key(object)?;
        let snapshot = ctx.snapshot();
        if batch.kind() == BatchKind::Write && !snapshot.read_snap.is_head() {
            return Err(ClientError::InvalidOperation(
                "write batch on a context reading a snapshot".into(),
            ));
        }
        let encoded = BatchCodec::encode(&batch, self.inner.config.max_batch_bytes)?;

        let guard = match batch.kind() {
            BatchKind::Write => Some(ctx.tracker.begin()),
            BatchKind::Read => None,
        };
        let (completion, notifier) =
            Completion::with_policy(batch.kind(), policy, callbacks, guard);
        debug!(
            completion = %completion.id(),
            pool = %snapshot.pool,
            object = %key,
            kind = ?batch.kind(),
            ops = batch.len(),
            "submitting batch"
        );
        self.inner
            .cluster
            .submit_batch(encoded, key, snapshot, notifier);

        match mode {
            SubmitMode::Async => {}
            SubmitMode::WaitAcknowledged => {
                completion.wait_for_acknowledged();
            }
            SubmitMode::WaitDurable => {
                completion.wait_for_durable();
            }
        }
        Ok(completion)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl OperationBatch {
    /// Submit the batch against `object` through `ctx`.
    ///
    /// Local validation errors are returned here; remote failures arrive
    /// through the completion.
    pub fn submit(self, ctx: &IoContext, object: &str, mode: SubmitMode) -> ClientResult<Completion> {
        self.submit_with_callbacks(ctx, object, mode, Callbacks::new())
    }

    pub fn submit_with_callbacks(
        self,
        ctx: &IoContext,
        object: &str,
        mode: SubmitMode,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        ctx.session
            .submit(ctx, object, self, mode, ReturnPolicy::Batch, callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionState;
    use crate::op::{BatchOutcome, SubOperation, WriteOp};
    use crate::testing::ScriptedCluster;
    use strata_types::ErrorKind;

    fn session() -> (Arc<ScriptedCluster>, Session) {
        let cluster = Arc::new(ScriptedCluster::new());
        cluster.add_pool("data");
        let session = Session::connect(cluster.clone());
        (cluster, session)
    }

    #[test]
    fn pool_management_goes_through_cluster() {
        let (_cluster, session) = session();
        session.create_pool("logs").unwrap();
        assert_eq!(session.list_pools().unwrap(), vec!["data", "logs"]);
        session.delete_pool("logs").unwrap();
        assert!(matches!(
            session.lookup_pool("logs"),
            Err(ClientError::PoolNotFound(_))
        ));
        assert!(session.io_context("logs").is_err());
    }

    #[test]
    fn empty_batch_rejected_locally() {
        let (cluster, session) = session();
        let ctx = session.io_context("data").unwrap();
        let err = OperationBatch::new(BatchKind::Write)
            .submit(&ctx, "obj", SubmitMode::Async)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(cluster.submitted(), 0);
    }

    #[test]
    fn empty_object_name_rejected_locally() {
        let (cluster, session) = session();
        let ctx = session.io_context("data").unwrap();
        let mut op = WriteOp::new();
        op.write_full(b"x");
        assert!(op.into_batch().submit(&ctx, "", SubmitMode::Async).is_err());
        assert_eq!(cluster.submitted(), 0);
    }

    #[test]
    fn write_on_snapshot_context_rejected() {
        let (_cluster, session) = session();
        let mut ctx = session.io_context("data").unwrap();
        ctx.set_read_snapshot(SnapId::new(3));
        let mut op = WriteOp::new();
        op.write_full(b"x");
        let err = op
            .into_batch()
            .submit(&ctx, "obj", SubmitMode::Async)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn oversized_batch_rejected() {
        let cluster = Arc::new(ScriptedCluster::new());
        cluster.add_pool("data");
        let config = ClientConfig {
            max_batch_bytes: 32,
            ..ClientConfig::default()
        };
        let session = Session::connect_with_config(cluster, config);
        let ctx = session.io_context("data").unwrap();
        let mut op = WriteOp::new();
        op.write_full(&[1u8; 128]);
        let err = op.into_batch().submit(&ctx, "obj", SubmitMode::Async).unwrap_err();
        assert!(matches!(err, ClientError::BatchTooLarge { .. }));
    }

    #[test]
    fn submission_captures_context_snapshot() {
        let (cluster, session) = session();
        let mut ctx = session.io_context("data").unwrap();
        ctx.set_locator_key(Some("loc-a"));
        let mut op = WriteOp::new();
        op.write_full(b"x");
        let completion = op
            .into_batch()
            .submit(&ctx, "obj", SubmitMode::Async)
            .unwrap();
        ctx.set_locator_key(Some("loc-b"));

        let pending = cluster.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].snapshot.locator.as_deref(), Some("loc-a"));
        assert_eq!(pending[0].key.locator(), Some("loc-a"));
        assert_eq!(completion.state(), CompletionState::Pending);
        assert_eq!(ctx.outstanding_writes(), 1);

        pending[0].notifier.acknowledge(BatchOutcome::success(vec![]));
        pending[0].notifier.durable();
        assert!(completion.is_durable());
        assert_eq!(ctx.outstanding_writes(), 0);
    }

    #[test]
    fn monitor_log_replaces_and_deregisters() {
        use chrono::Utc;
        use std::sync::Mutex;
        use strata_types::LogEntry;

        let (cluster, session) = session();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&first);
        session
            .monitor_log(
                LogLevel::Info,
                Some(Box::new(move |e: &LogEntry| sink.lock().unwrap().push(e.seq))),
            )
            .unwrap();
        let entry = |seq, level| LogEntry {
            seq,
            stamp: Utc::now(),
            who: "test".into(),
            level,
            msg: "m".into(),
        };
        cluster.emit(&entry(1, LogLevel::Info));
        cluster.emit(&entry(2, LogLevel::Debug));

        let sink = Arc::clone(&second);
        session
            .monitor_log(
                LogLevel::Debug,
                Some(Box::new(move |e: &LogEntry| sink.lock().unwrap().push(e.seq))),
            )
            .unwrap();
        cluster.emit(&entry(3, LogLevel::Debug));
        session.monitor_log(LogLevel::Debug, None).unwrap();
        cluster.emit(&entry(4, LogLevel::Error));

        assert_eq!(*first.lock().unwrap(), vec![1]);
        assert_eq!(*second.lock().unwrap(), vec![3]);
    }

    #[test]
    fn snapshots_and_stats_go_through_cluster() {
        let (_cluster, session) = session();
        assert_eq!(session.create_snapshot("data").unwrap(), SnapId::new(1));
        assert_eq!(session.create_snapshot("data").unwrap(), SnapId::new(2));
        assert!(session.create_snapshot("missing").is_err());
        assert_eq!(session.pool_stat("data").unwrap(), PoolStat::default());
        assert_eq!(session.cluster_stat().unwrap(), ClusterStat::default());
    }

    #[test]
    fn wait_durable_mode_blocks_until_delivery() {
        let (cluster, session) = session();
        cluster.auto_complete(true);
        let ctx = session.io_context("data").unwrap();
        let mut batch = OperationBatch::new(BatchKind::Write);
        batch.append(SubOperation::WriteFull { data: b"x".to_vec() }).unwrap();
        let completion = batch.submit(&ctx, "obj", SubmitMode::WaitDurable).unwrap();
        assert!(completion.is_durable());
        completion.release().unwrap();
    }
}
