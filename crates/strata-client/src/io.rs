//! Single-operation calls and whole-batch helpers on [`IoContext`].
//!
//! Synchronous calls block until the batch is durable (or failed) and turn
//! a remote failure into [`ClientError::Remote`]. `aio_*` calls return the
//! [`Completion`] immediately.

use bytes::Bytes;
use strata_types::ObjectStat;
use tracing::debug;

use crate::completion::{Callbacks, Completion, ReturnPolicy};
use crate::context::IoContext;
use crate::cursor::{ObjectCursor, OmapIter, XattrIter};
use crate::dispatch::ListPosition;
use crate::error::ClientResult;
use crate::op::{
    BatchKind, BatchOutcome, OpFlags, OpIndex, OperationBatch, ReadOp, SubOperation, WriteOp,
};
use crate::session::SubmitMode;

const FIRST: OpIndex = OpIndex(0);

impl IoContext {
    fn single(kind: BatchKind, op: SubOperation) -> OperationBatch {
        let mut batch = OperationBatch::new(kind);
        batch.push(op, OpFlags::default());
        batch
    }

    fn run(&self, object: &str, batch: OperationBatch) -> ClientResult<BatchOutcome> {
        self.session
            .submit(
                self,
                object,
                batch,
                SubmitMode::WaitDurable,
                ReturnPolicy::Batch,
                Callbacks::new(),
            )?
            .result()
    }

    fn run_write(&self, object: &str, op: SubOperation) -> ClientResult<()> {
        self.run(object, Self::single(BatchKind::Write, op)).map(|_| ())
    }

    fn run_read(&self, object: &str, op: SubOperation) -> ClientResult<BatchOutcome> {
        self.run(object, Self::single(BatchKind::Read, op))
    }

    fn submit_async(
        &self,
        object: &str,
        batch: OperationBatch,
        policy: ReturnPolicy,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        self.session
            .submit(self, object, batch, SubmitMode::Async, policy, callbacks)
    }

    // -----------------------------------------------------------------------
    // Synchronous calls
    // -----------------------------------------------------------------------

    /// Write `data` at `offset`, extending the object if needed.
    pub fn write(&self, object: &str, data: &[u8], offset: u64) -> ClientResult<()> {
        let op = SubOperation::Write {
            offset,
            data: data.to_vec(),
        };
        self.run_write(object, op)
    }

    /// Replace the object's contents with `data`.
    pub fn write_full(&self, object: &str, data: &[u8]) -> ClientResult<()> {
        self.run_write(object, SubOperation::WriteFull { data: data.to_vec() })
    }

    pub fn append(&self, object: &str, data: &[u8]) -> ClientResult<()> {
        self.run_write(object, SubOperation::Append { data: data.to_vec() })
    }

    /// Read up to `len` bytes at `offset`; `len == 0` reads to the end.
    pub fn read(&self, object: &str, offset: u64, len: u64) -> ClientResult<Bytes> {
        self.run_read(object, SubOperation::Read { offset, len })?
            .data(FIRST)
    }

    pub fn remove(&self, object: &str) -> ClientResult<()> {
        self.run_write(object, SubOperation::Remove)
    }

    pub fn truncate(&self, object: &str, size: u64) -> ClientResult<()> {
        self.run_write(object, SubOperation::Truncate { size })
    }

    pub fn stat(&self, object: &str) -> ClientResult<ObjectStat> {
        self.run_read(object, SubOperation::Stat)?.stat(FIRST)
    }

    pub fn get_xattr(&self, object: &str, name: &str) -> ClientResult<Bytes> {
        let op = SubOperation::GetXattr { name: name.to_string() };
        self.run_read(object, op)?.data(FIRST)
    }

    pub fn set_xattr(&self, object: &str, name: &str, value: &[u8]) -> ClientResult<()> {
        let op = SubOperation::SetXattr {
            name: name.to_string(),
            value: value.to_vec(),
        };
        self.run_write(object, op)
    }

    pub fn remove_xattr(&self, object: &str, name: &str) -> ClientResult<()> {
        self.run_write(object, SubOperation::RemoveXattr { name: name.to_string() })
    }

    /// All extended attributes of the object.
    pub fn xattrs(&self, object: &str) -> ClientResult<XattrIter> {
        self.run_read(object, SubOperation::GetXattrs)?.xattrs(FIRST)
    }

    pub fn omap_set<I, K, V>(&self, object: &str, entries: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let mut op = WriteOp::new();
        op.omap_set(entries);
        self.run(object, op.into_batch()).map(|_| ())
    }

    /// Up to `max` omap entries after `start_after`.
    pub fn omap_get_vals(
        &self,
        object: &str,
        start_after: Option<&str>,
        max: u64,
    ) -> ClientResult<OmapIter> {
        let mut op = ReadOp::new();
        let index = op.omap_get_vals(start_after, None, max);
        self.run(object, op.into_batch())?.omap(index)
    }

    pub fn omap_remove_keys<I, K>(&self, object: &str, keys: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut op = WriteOp::new();
        op.omap_remove_keys(keys);
        self.run(object, op.into_batch()).map(|_| ())
    }

    /// Run an object class method and return its output.
    pub fn exec(&self, object: &str, class: &str, method: &str, input: &[u8]) -> ClientResult<Bytes> {
        let op = SubOperation::Exec {
            class: class.to_string(),
            method: method.to_string(),
            input: input.to_vec(),
        };
        self.run(object, Self::single(BatchKind::Write, op))?
            .data(FIRST)
    }

    /// Execute a write batch and wait until it is durable.
    pub fn operate_write(&self, object: &str, op: WriteOp) -> ClientResult<BatchOutcome> {
        self.run(object, op.into_batch())
    }

    /// Execute a read batch and wait for its results.
    pub fn operate_read(&self, object: &str, op: ReadOp) -> ClientResult<BatchOutcome> {
        self.run(object, op.into_batch())
    }

    // -----------------------------------------------------------------------
    // Asynchronous calls
    // -----------------------------------------------------------------------

    pub fn aio_write(
        &self,
        object: &str,
        data: &[u8],
        offset: u64,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        let op = SubOperation::Write {
            offset,
            data: data.to_vec(),
        };
        let batch = Self::single(BatchKind::Write, op);
        self.submit_async(object, batch, ReturnPolicy::Batch, callbacks)
    }

    pub fn aio_write_full(
        &self,
        object: &str,
        data: &[u8],
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        let batch = Self::single(BatchKind::Write, SubOperation::WriteFull { data: data.to_vec() });
        self.submit_async(object, batch, ReturnPolicy::Batch, callbacks)
    }

    pub fn aio_append(
        &self,
        object: &str,
        data: &[u8],
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        let batch = Self::single(BatchKind::Write, SubOperation::Append { data: data.to_vec() });
        self.submit_async(object, batch, ReturnPolicy::Batch, callbacks)
    }

    /// Asynchronous read. The completion's return value is the number of
    /// bytes read; the bytes are the outcome's data at [`OpIndex`] 0.
    pub fn aio_read(
        &self,
        object: &str,
        offset: u64,
        len: u64,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        let batch = Self::single(BatchKind::Read, SubOperation::Read { offset, len });
        self.submit_async(object, batch, ReturnPolicy::FirstResult, callbacks)
    }

    pub fn aio_remove(&self, object: &str, callbacks: Callbacks) -> ClientResult<Completion> {
        let batch = Self::single(BatchKind::Write, SubOperation::Remove);
        self.submit_async(object, batch, ReturnPolicy::Batch, callbacks)
    }

    /// Asynchronous stat; the result is the outcome's stat at [`OpIndex`] 0.
    pub fn aio_stat(&self, object: &str, callbacks: Callbacks) -> ClientResult<Completion> {
        let batch = Self::single(BatchKind::Read, SubOperation::Stat);
        self.submit_async(object, batch, ReturnPolicy::Batch, callbacks)
    }

    pub fn aio_operate_write(
        &self,
        object: &str,
        op: WriteOp,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        self.submit_async(object, op.into_batch(), ReturnPolicy::Batch, callbacks)
    }

    pub fn aio_operate_read(
        &self,
        object: &str,
        op: ReadOp,
        callbacks: Callbacks,
    ) -> ClientResult<Completion> {
        self.submit_async(object, op.into_batch(), ReturnPolicy::Batch, callbacks)
    }

    // -----------------------------------------------------------------------
    // Flush and listing
    // -----------------------------------------------------------------------

    /// Block until every write submitted through this context is terminal.
    pub fn flush(&self) {
        debug!(pool = %self.pool(), outstanding = self.outstanding_writes(), "flush");
        self.tracker.wait_idle();
    }

    /// Resolves once every write submitted through this context is terminal.
    pub async fn flush_async(&self) {
        self.tracker.idle().await;
    }

    /// List the objects of this context's pool.
    pub fn list_objects(&self) -> ObjectCursor {
        self.session.open_cursor(self.pool(), ListPosition::start())
    }

    pub fn list_objects_from(&self, from: ListPosition) -> ObjectCursor {
        self.session.open_cursor(self.pool(), from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionState;
    use crate::error::ClientError;
    use crate::op::{OpOutput, SubOpResult};
    use crate::session::Session;
    use crate::testing::ScriptedCluster;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;
    use strata_types::ErrorKind;

    fn context() -> (Arc<ScriptedCluster>, IoContext) {
        let cluster = Arc::new(ScriptedCluster::new());
        cluster.add_pool("data");
        let ctx = Session::connect(cluster.clone()).io_context("data").unwrap();
        (cluster, ctx)
    }

    #[test]
    fn sync_read_returns_output_bytes() {
        let (cluster, ctx) = context();
        cluster.auto_complete(true);
        cluster.respond_with(BatchOutcome::success(vec![SubOpResult {
            rval: 5,
            output: OpOutput::Data(Bytes::from_static(b"hello")),
        }]));
        assert_eq!(ctx.read("obj", 0, 5).unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn sync_write_surfaces_remote_failure() {
        let (cluster, ctx) = context();
        cluster.auto_complete(true);
        cluster.respond_with(BatchOutcome::failure(ErrorKind::NotFound));
        let err = ctx.remove("missing").unwrap_err();
        assert!(matches!(err, ClientError::Remote(ErrorKind::NotFound)));
    }

    #[test]
    fn aio_read_return_value_is_bytes_read() {
        let (cluster, ctx) = context();
        let completion = ctx.aio_read("obj", 0, 0, Callbacks::new()).unwrap();
        let pending = cluster.take_pending();
        pending[0].notifier.acknowledge(BatchOutcome::success(vec![SubOpResult {
            rval: 3,
            output: OpOutput::Data(Bytes::from_static(b"abc")),
        }]));
        assert_eq!(completion.state(), CompletionState::Durable);
        assert_eq!(completion.return_value(), Ok(3));
        assert_eq!(completion.result().unwrap().data(OpIndex(0)).unwrap().len(), 3);
    }

    #[test]
    fn aio_write_fires_callbacks_in_order() {
        let (cluster, ctx) = context();
        let seen = Arc::new(AtomicI32::new(0));
        let (ack, durable) = (Arc::clone(&seen), Arc::clone(&seen));
        let callbacks = Callbacks::new()
            .on_acknowledged(move |_| {
                ack.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .unwrap();
            })
            .on_durable(move |_| {
                durable
                    .compare_exchange(1, 2, Ordering::SeqCst, Ordering::SeqCst)
                    .unwrap();
            });
        let completion = ctx.aio_write("obj", b"data", 0, callbacks).unwrap();
        let pending = cluster.take_pending();
        pending[0].notifier.acknowledge(BatchOutcome::success(vec![]));
        pending[0].notifier.durable();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        completion.release().unwrap();
    }

    #[test]
    fn flush_waits_for_outstanding_writes() {
        let (cluster, ctx) = context();
        let first = ctx.aio_append("log", b"a", Callbacks::new()).unwrap();
        let second = ctx.aio_append("log", b"b", Callbacks::new()).unwrap();
        assert_eq!(ctx.outstanding_writes(), 2);

        let pending = cluster.take_pending();
        let driver = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            for submission in pending {
                submission.notifier.acknowledge(BatchOutcome::success(vec![]));
                submission.notifier.durable();
            }
        });
        ctx.flush();
        assert!(first.is_durable());
        assert!(second.is_durable());
        driver.join().unwrap();
    }

    #[test]
    fn reads_are_not_tracked_by_flush() {
        let (cluster, ctx) = context();
        let _completion = ctx.aio_stat("obj", Callbacks::new()).unwrap();
        assert_eq!(ctx.outstanding_writes(), 0);
        ctx.flush();
        assert_eq!(cluster.submitted(), 1);
    }

    #[tokio::test]
    async fn flush_async_resolves_after_delivery() {
        let (cluster, ctx) = context();
        let completion = ctx.aio_write_full("obj", b"x", Callbacks::new()).unwrap();
        let pending = cluster.take_pending();
        tokio::spawn(async move {
            for submission in pending {
                submission.notifier.durable();
            }
        });
        ctx.flush_async().await;
        assert!(completion.is_durable());
    }
}
