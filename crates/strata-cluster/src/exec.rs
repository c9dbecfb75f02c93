//! Batch execution against the object store.
//!
//! A batch runs against a working copy of one object. Sub-operations apply
//! in order; the first failure that is a compare, or that lacks `fail_ok`,
//! aborts the batch and the working copy is thrown away. Write batches
//! install the working copy through [`ObjectStore::update`], so concurrent
//! batches on the same placement group never interleave.
//!
//! [`Executor::execute_with`] runs a commit hook on the post-image while the
//! update is still open. A hook error aborts the batch, so a post-image that
//! could not be journaled is never installed.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use strata_client::{
    BatchKind, BatchOutcome, ContextSnapshot, CreateMode, OpEntry, OpOutput, OperationBatch,
    SubOpResult, SubOperation,
};
use strata_store::{AllocHint, ObjectRecord, ObjectState, ObjectStore};
use strata_types::{ErrorKind, ObjectKey};
use tracing::debug;

use crate::classes::{ClassRegistry, MethodKind};

/// Result of a batch that ran to completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub outcome: BatchOutcome,
    /// Post-image to journal. `Some(None)` when the object is gone; `None`
    /// when the batch changed nothing.
    pub post_image: Option<Option<ObjectRecord>>,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Called with the post-image of a dirty write batch before it is installed.
pub type CommitHook<'a> = dyn FnMut(&Option<ObjectRecord>) -> Result<(), ErrorKind> + 'a;

/// Runs decoded batches against an [`ObjectStore`].
#[derive(Clone, Debug)]
pub struct Executor {
    classes: Arc<ClassRegistry>,
    max_object_size: u64,
}

impl Executor {
    pub fn new(classes: Arc<ClassRegistry>, max_object_size: u64) -> Self {
        Self {
            classes,
            max_object_size,
        }
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Execute `batch` against `key` as addressed by `snapshot`.
    pub fn execute(
        &self,
        store: &dyn ObjectStore,
        key: &ObjectKey,
        snapshot: &ContextSnapshot,
        batch: &OperationBatch,
    ) -> Result<Execution, ErrorKind> {
        self.execute_with(store, key, snapshot, batch, &mut |_| Ok(()))
    }

    /// Like [`execute`](Self::execute), running `commit` on the post-image
    /// of a write batch that changed the object.
    pub fn execute_with(
        &self,
        store: &dyn ObjectStore,
        key: &ObjectKey,
        snapshot: &ContextSnapshot,
        batch: &OperationBatch,
        commit: &mut CommitHook<'_>,
    ) -> Result<Execution, ErrorKind> {
        if let Some(entry) = batch.ops().iter().find(|e| !e.op.allowed_in(batch.kind())) {
            debug!(op = entry.op.name(), kind = ?batch.kind(), "sub-operation not allowed");
            return Err(ErrorKind::InvalidOperation);
        }
        match batch.kind() {
            BatchKind::Read => self.execute_read(store, key, snapshot, batch),
            BatchKind::Write => self.execute_write(store, key, snapshot, batch, commit),
        }
    }

    fn execute_read(
        &self,
        store: &dyn ObjectStore,
        key: &ObjectKey,
        snapshot: &ContextSnapshot,
        batch: &OperationBatch,
    ) -> Result<Execution, ErrorKind> {
        let record = store.read(snapshot.pool, key).map_err(|e| e.kind())?;
        let state = record
            .as_ref()
            .and_then(|r| r.view(snapshot.read_snap))
            .cloned();
        let mut work = Working::new(state, batch.mtime().unwrap_or_else(Utc::now));
        let results = self.run(&mut work, batch, BatchKind::Read)?;
        Ok(Execution {
            outcome: BatchOutcome::success(results),
            post_image: None,
            read_bytes: work.read_bytes,
            write_bytes: 0,
        })
    }

    fn execute_write(
        &self,
        store: &dyn ObjectStore,
        key: &ObjectKey,
        snapshot: &ContextSnapshot,
        batch: &OperationBatch,
        commit: &mut CommitHook<'_>,
    ) -> Result<Execution, ErrorKind> {
        let mtime = batch.mtime().unwrap_or_else(Utc::now);
        let mut results = Vec::new();
        let mut changed = false;
        let mut write_bytes = 0;

        let post = store
            .update(snapshot.pool, key, &mut |record: &mut ObjectRecord| {
                let base_version = record.head.as_ref().map_or(0, |h| h.version);
                let mut work = Working::new(record.head.clone(), mtime);
                results = self.run(&mut work, batch, BatchKind::Write)?;
                write_bytes = work.write_bytes;
                changed = work.dirty;
                if work.dirty {
                    record.prepare_write(&snapshot.snapc);
                    if let Some(head) = work.state.as_mut() {
                        head.version = base_version + 1;
                        head.mtime = mtime;
                    }
                    record.head = work.state;
                    let post = (!record.is_vacant()).then(|| record.clone());
                    commit(&post)?;
                }
                Ok(())
            })
            .map_err(|e| e.kind())?;

        Ok(Execution {
            outcome: BatchOutcome::success(results),
            post_image: changed.then_some(post),
            read_bytes: 0,
            write_bytes,
        })
    }

    fn run(
        &self,
        work: &mut Working,
        batch: &OperationBatch,
        kind: BatchKind,
    ) -> Result<Vec<SubOpResult>, ErrorKind> {
        let mut results = Vec::with_capacity(batch.len());
        for (index, entry) in batch.ops().iter().enumerate() {
            match self.apply(work, entry, kind) {
                Ok(result) => results.push(result),
                Err(err) if entry.flags.fail_ok && !entry.op.is_compare() => {
                    debug!(index, op = entry.op.name(), error = %err, "sub-operation failed, continuing");
                    results.push(SubOpResult::failed(err));
                }
                Err(err) => {
                    debug!(index, op = entry.op.name(), error = %err, "batch aborted");
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    fn apply(
        &self,
        work: &mut Working,
        entry: &OpEntry,
        kind: BatchKind,
    ) -> Result<SubOpResult, ErrorKind> {
        let done = || Ok(SubOpResult::ok(OpOutput::None));
        match &entry.op {
            SubOperation::CmpXattr { name, op, value } => {
                let stored = work.existing()?.xattrs.get(name).map_or(&[][..], Vec::as_slice);
                if !op.holds(stored, value) {
                    return Err(ErrorKind::PreconditionFailed);
                }
                done()
            }
            SubOperation::OmapCmp { key, op, value } => {
                let stored = work
                    .existing()?
                    .omap
                    .get(key)
                    .ok_or(ErrorKind::PreconditionFailed)?;
                if !op.holds(stored, value) {
                    return Err(ErrorKind::PreconditionFailed);
                }
                done()
            }
            SubOperation::AssertExists { expected } => {
                if work.state.is_some() != *expected {
                    return Err(ErrorKind::PreconditionFailed);
                }
                done()
            }
            SubOperation::SetXattr { name, value } => {
                work.head_mut().xattrs.insert(name.clone(), value.clone());
                done()
            }
            SubOperation::RemoveXattr { name } => {
                if !work.existing()?.xattrs.contains_key(name) {
                    return Err(ErrorKind::NotFound);
                }
                work.existing_mut()?.xattrs.remove(name);
                done()
            }
            SubOperation::OmapSet { entries } => {
                let omap = &mut work.head_mut().omap;
                omap.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
                done()
            }
            SubOperation::OmapRemoveKeys { keys } => {
                let state = work.existing_mut()?;
                for key in keys {
                    state.omap.remove(key);
                }
                done()
            }
            SubOperation::OmapClear => {
                work.existing_mut()?.omap.clear();
                done()
            }
            SubOperation::Create { mode } => {
                if work.state.is_some() {
                    if *mode == CreateMode::Exclusive {
                        return Err(ErrorKind::Exists);
                    }
                    return done();
                }
                work.head_mut();
                done()
            }
            SubOperation::Append { data } => {
                let size = work.state.as_ref().map_or(0, ObjectState::size);
                self.check_size(size, data.len() as u64)?;
                work.head_mut().append(data);
                work.write_bytes += data.len() as u64;
                done()
            }
            SubOperation::Write { offset, data } => {
                self.check_size(*offset, data.len() as u64)?;
                work.head_mut().write(*offset, data);
                work.write_bytes += data.len() as u64;
                done()
            }
            SubOperation::WriteFull { data } => {
                self.check_size(0, data.len() as u64)?;
                work.head_mut().write_full(data);
                work.write_bytes += data.len() as u64;
                done()
            }
            SubOperation::Zero { offset, len } => {
                if let Some(state) = work.state.as_mut() {
                    state.zero(*offset, *len);
                    work.dirty = true;
                }
                done()
            }
            SubOperation::Truncate { size } => {
                self.check_size(*size, 0)?;
                work.head_mut().truncate(*size);
                done()
            }
            SubOperation::Remove => {
                work.existing()?;
                work.state = None;
                work.dirty = true;
                done()
            }
            SubOperation::SetAllocHint {
                expected_object_size,
                expected_write_size,
            } => {
                work.head_mut().alloc_hint = Some(AllocHint {
                    expected_object_size: *expected_object_size,
                    expected_write_size: *expected_write_size,
                });
                done()
            }
            SubOperation::Exec {
                class,
                method,
                input,
            } => {
                let method_kind = self.classes.kind(class, method)?;
                if kind == BatchKind::Read && method_kind == MethodKind::Write {
                    return Err(ErrorKind::InvalidOperation);
                }
                let (output, dirty) = match method_kind {
                    MethodKind::Read => {
                        self.classes
                            .call(class, method, &mut work.state, work.mtime, input)?
                    }
                    MethodKind::Write => {
                        // A failing method must not leave half its changes behind.
                        let mut scratch = work.state.clone();
                        let called =
                            self.classes
                                .call(class, method, &mut scratch, work.mtime, input)?;
                        if called.1 {
                            work.state = scratch;
                        }
                        called
                    }
                };
                work.dirty |= dirty;
                Ok(SubOpResult::ok(OpOutput::Data(Bytes::from(output))))
            }
            SubOperation::Read { offset, len } => {
                let bytes = work.existing()?.read(*offset, *len).to_vec();
                work.read_bytes += bytes.len() as u64;
                Ok(SubOpResult {
                    rval: i32::try_from(bytes.len()).unwrap_or(i32::MAX),
                    output: OpOutput::Data(Bytes::from(bytes)),
                })
            }
            SubOperation::Stat => Ok(SubOpResult::ok(OpOutput::Stat(work.existing()?.stat()))),
            SubOperation::GetXattr { name } => {
                let value = work.existing()?.xattrs.get(name).ok_or(ErrorKind::NotFound)?;
                Ok(SubOpResult::ok(OpOutput::Data(Bytes::from(value.clone()))))
            }
            SubOperation::GetXattrs => {
                let pairs = work
                    .existing()?
                    .xattrs
                    .iter()
                    .map(|(k, v)| (k.clone(), Bytes::from(v.clone())))
                    .collect();
                Ok(SubOpResult::ok(OpOutput::Xattrs(pairs)))
            }
            SubOperation::OmapGetVals {
                start_after,
                prefix,
                max,
            } => {
                let state = work.existing()?;
                let (entries, more) = omap_page(state, start_after.as_deref(), prefix.as_deref(), *max);
                let entries = entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), Bytes::from(v.clone())))
                    .collect();
                Ok(SubOpResult::ok(OpOutput::Omap { entries, more }))
            }
            SubOperation::OmapGetKeys { start_after, max } => {
                let state = work.existing()?;
                let (entries, more) = omap_page(state, start_after.as_deref(), None, *max);
                let keys = entries.into_iter().map(|(k, _)| k.clone()).collect();
                Ok(SubOpResult::ok(OpOutput::Keys { keys, more }))
            }
            SubOperation::OmapGetValsByKeys { keys } => {
                let state = work.existing()?;
                let entries = keys
                    .iter()
                    .filter_map(|k| state.omap.get(k).map(|v| (k.clone(), Bytes::from(v.clone()))))
                    .collect();
                Ok(SubOpResult::ok(OpOutput::Omap {
                    entries,
                    more: false,
                }))
            }
        }
    }

    fn check_size(&self, offset: u64, len: u64) -> Result<(), ErrorKind> {
        match offset.checked_add(len) {
            Some(end) if end <= self.max_object_size => Ok(()),
            _ => Err(ErrorKind::InvalidOperation),
        }
    }
}

/// Object state as seen by the sub-operations executed so far.
struct Working {
    state: Option<ObjectState>,
    mtime: DateTime<Utc>,
    dirty: bool,
    read_bytes: u64,
    write_bytes: u64,
}

impl Working {
    fn new(state: Option<ObjectState>, mtime: DateTime<Utc>) -> Self {
        Self {
            state,
            mtime,
            dirty: false,
            read_bytes: 0,
            write_bytes: 0,
        }
    }

    fn existing(&self) -> Result<&ObjectState, ErrorKind> {
        self.state.as_ref().ok_or(ErrorKind::NotFound)
    }

    fn existing_mut(&mut self) -> Result<&mut ObjectState, ErrorKind> {
        let state = self.state.as_mut().ok_or(ErrorKind::NotFound)?;
        self.dirty = true;
        Ok(state)
    }

    /// The head, created if missing.
    fn head_mut(&mut self) -> &mut ObjectState {
        self.dirty = true;
        let mtime = self.mtime;
        self.state.get_or_insert_with(|| ObjectState::new(mtime))
    }
}

/// Omap entries after `start_after` matching `prefix`, at most `max`.
/// The flag reports whether more matching entries follow.
fn omap_page<'a>(
    state: &'a ObjectState,
    start_after: Option<&str>,
    prefix: Option<&str>,
    max: u64,
) -> (Vec<(&'a String, &'a Vec<u8>)>, bool) {
    let max = usize::try_from(max).unwrap_or(usize::MAX);
    let mut matching = state
        .omap
        .iter()
        .filter(|(k, _)| start_after.map_or(true, |after| k.as_str() > after))
        .filter(|(k, _)| prefix.map_or(true, |p| k.starts_with(p)));
    let entries: Vec<_> = matching.by_ref().take(max).collect();
    let more = matching.next().is_some();
    (entries, more)
}
