use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_types::{ErrorKind, ObjectStat};

use crate::cursor::{OmapIter, XattrIter};
use crate::error::{ClientError, ClientResult};

/// Byte-string comparison used by compare sub-operations.
///
/// The stored value is the left operand: `Gt` holds when the stored value
/// sorts after the supplied one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn holds(self, stored: &[u8], supplied: &[u8]) -> bool {
        match self {
            Self::Eq => stored == supplied,
            Self::Ne => stored != supplied,
            Self::Gt => stored > supplied,
            Self::Gte => stored >= supplied,
            Self::Lt => stored < supplied,
            Self::Lte => stored <= supplied,
        }
    }
}

/// Behavior of a create sub-operation when the object already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Fail with `Exists`.
    Exclusive,
    /// Succeed without changing anything.
    Idempotent,
}

/// Per-sub-operation flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpFlags {
    /// Record a failure of this sub-operation in its own result code instead
    /// of aborting the batch. Compare and assert failures always abort.
    pub fail_ok: bool,
}

impl OpFlags {
    pub const FAIL_OK: OpFlags = OpFlags { fail_ok: true };
}

/// Read-only or mutating batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    Read,
    Write,
}

/// Which batch kinds accept a sub-operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpClass {
    /// Read batches only.
    Read,
    /// Write batches only.
    Mutation,
    /// Either kind.
    Any,
}

/// One step of an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubOperation {
    CmpXattr {
        name: String,
        op: CmpOp,
        value: Vec<u8>,
    },
    SetXattr {
        name: String,
        value: Vec<u8>,
    },
    RemoveXattr {
        name: String,
    },
    /// Compare one omap value. A missing key fails the comparison.
    OmapCmp {
        key: String,
        op: CmpOp,
        value: Vec<u8>,
    },
    OmapSet {
        entries: BTreeMap<String, Vec<u8>>,
    },
    OmapRemoveKeys {
        keys: Vec<String>,
    },
    OmapClear,
    Create {
        mode: CreateMode,
    },
    Append {
        data: Vec<u8>,
    },
    Write {
        offset: u64,
        data: Vec<u8>,
    },
    WriteFull {
        data: Vec<u8>,
    },
    Zero {
        offset: u64,
        len: u64,
    },
    Truncate {
        size: u64,
    },
    Remove,
    SetAllocHint {
        expected_object_size: u64,
        expected_write_size: u64,
    },
    /// Holds when the object's existence matches `expected`.
    AssertExists {
        expected: bool,
    },
    Exec {
        class: String,
        method: String,
        input: Vec<u8>,
    },
    /// `len == 0` reads through the end of the object.
    Read {
        offset: u64,
        len: u64,
    },
    Stat,
    GetXattr {
        name: String,
    },
    GetXattrs,
    OmapGetVals {
        start_after: Option<String>,
        prefix: Option<String>,
        max: u64,
    },
    OmapGetKeys {
        start_after: Option<String>,
        max: u64,
    },
    OmapGetValsByKeys {
        keys: Vec<String>,
    },
}

impl SubOperation {
    pub fn class(&self) -> OpClass {
        match self {
            Self::CmpXattr { .. }
            | Self::OmapCmp { .. }
            | Self::AssertExists { .. }
            | Self::Exec { .. } => OpClass::Any,
            Self::Read { .. }
            | Self::Stat
            | Self::GetXattr { .. }
            | Self::GetXattrs
            | Self::OmapGetVals { .. }
            | Self::OmapGetKeys { .. }
            | Self::OmapGetValsByKeys { .. } => OpClass::Read,
            Self::SetXattr { .. }
            | Self::RemoveXattr { .. }
            | Self::OmapSet { .. }
            | Self::OmapRemoveKeys { .. }
            | Self::OmapClear
            | Self::Create { .. }
            | Self::Append { .. }
            | Self::Write { .. }
            | Self::WriteFull { .. }
            | Self::Zero { .. }
            | Self::Truncate { .. }
            | Self::Remove
            | Self::SetAllocHint { .. } => OpClass::Mutation,
        }
    }

    pub fn allowed_in(&self, kind: BatchKind) -> bool {
        match (self.class(), kind) {
            (OpClass::Any, _) => true,
            (OpClass::Read, BatchKind::Read) => true,
            (OpClass::Mutation, BatchKind::Write) => true,
            _ => false,
        }
    }

    /// Compare and assert sub-operations: their failure always aborts the
    /// batch with `PreconditionFailed`.
    pub fn is_compare(&self) -> bool {
        matches!(
            self,
            Self::CmpXattr { .. } | Self::OmapCmp { .. } | Self::AssertExists { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CmpXattr { .. } => "cmpxattr",
            Self::SetXattr { .. } => "setxattr",
            Self::RemoveXattr { .. } => "rmxattr",
            Self::OmapCmp { .. } => "omap-cmp",
            Self::OmapSet { .. } => "omap-set",
            Self::OmapRemoveKeys { .. } => "omap-rm-keys",
            Self::OmapClear => "omap-clear",
            Self::Create { .. } => "create",
            Self::Append { .. } => "append",
            Self::Write { .. } => "write",
            Self::WriteFull { .. } => "write-full",
            Self::Zero { .. } => "zero",
            Self::Truncate { .. } => "truncate",
            Self::Remove => "remove",
            Self::SetAllocHint { .. } => "set-alloc-hint",
            Self::AssertExists { .. } => "assert-exists",
            Self::Exec { .. } => "exec",
            Self::Read { .. } => "read",
            Self::Stat => "stat",
            Self::GetXattr { .. } => "getxattr",
            Self::GetXattrs => "getxattrs",
            Self::OmapGetVals { .. } => "omap-get-vals",
            Self::OmapGetKeys { .. } => "omap-get-keys",
            Self::OmapGetValsByKeys { .. } => "omap-get-vals-by-keys",
        }
    }
}

/// A sub-operation and its flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEntry {
    pub op: SubOperation,
    pub flags: OpFlags,
}

/// Position of a sub-operation within its batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpIndex(pub usize);

/// Ordered sub-operations applied atomically to one object.
///
/// Built with [`append`](Self::append) (or the typed [`ReadOp`] and
/// [`WriteOp`] wrappers) and consumed by submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBatch {
    kind: BatchKind,
    ops: Vec<OpEntry>,
    mtime: Option<DateTime<Utc>>,
}

impl OperationBatch {
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            ops: Vec::new(),
            mtime: None,
        }
    }

    /// Append a sub-operation with default flags.
    pub fn append(&mut self, op: SubOperation) -> ClientResult<OpIndex> {
        self.append_with_flags(op, OpFlags::default())
    }

    /// Append a sub-operation, rejecting kinds the batch cannot carry.
    pub fn append_with_flags(&mut self, op: SubOperation, flags: OpFlags) -> ClientResult<OpIndex> {
        if !op.allowed_in(self.kind) {
            return Err(ClientError::InvalidOperation(format!(
                "{} is not allowed in a {:?} batch",
                op.name(),
                self.kind
            )));
        }
        Ok(self.push(op, flags))
    }

    pub(crate) fn push(&mut self, op: SubOperation, flags: OpFlags) -> OpIndex {
        self.ops.push(OpEntry { op, flags });
        OpIndex(self.ops.len() - 1)
    }

    pub(crate) fn set_last_flags(&mut self, flags: OpFlags) {
        if let Some(last) = self.ops.last_mut() {
            last.flags = flags;
        }
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn ops(&self) -> &[OpEntry] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Modification time stamped on mutated objects. Defaults to the
    /// cluster's clock at execution.
    pub fn mtime(&self) -> Option<DateTime<Utc>> {
        self.mtime
    }

    pub fn set_mtime(&mut self, mtime: DateTime<Utc>) {
        self.mtime = Some(mtime);
    }
}

/// Read batch builder.
///
/// Every method appends one sub-operation; methods that produce output
/// return the [`OpIndex`] to look it up in the [`BatchOutcome`].
#[derive(Clone, Debug)]
pub struct ReadOp {
    batch: OperationBatch,
}

impl ReadOp {
    pub fn new() -> Self {
        Self {
            batch: OperationBatch::new(BatchKind::Read),
        }
    }

    pub fn read(&mut self, offset: u64, len: u64) -> OpIndex {
        self.batch.push(SubOperation::Read { offset, len }, OpFlags::default())
    }

    pub fn stat(&mut self) -> OpIndex {
        self.batch.push(SubOperation::Stat, OpFlags::default())
    }

    pub fn get_xattr(&mut self, name: &str) -> OpIndex {
        let op = SubOperation::GetXattr { name: name.to_string() };
        self.batch.push(op, OpFlags::default())
    }

    pub fn get_xattrs(&mut self) -> OpIndex {
        self.batch.push(SubOperation::GetXattrs, OpFlags::default())
    }

    /// Up to `max` omap entries after `start_after` whose keys start with
    /// `prefix`.
    pub fn omap_get_vals(
        &mut self,
        start_after: Option<&str>,
        prefix: Option<&str>,
        max: u64,
    ) -> OpIndex {
        let op = SubOperation::OmapGetVals {
            start_after: start_after.map(str::to_string),
            prefix: prefix.map(str::to_string),
            max,
        };
        self.batch.push(op, OpFlags::default())
    }

    pub fn omap_get_keys(&mut self, start_after: Option<&str>, max: u64) -> OpIndex {
        let op = SubOperation::OmapGetKeys {
            start_after: start_after.map(str::to_string),
            max,
        };
        self.batch.push(op, OpFlags::default())
    }

    pub fn omap_get_vals_by_keys<I, K>(&mut self, keys: I) -> OpIndex
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let op = SubOperation::OmapGetValsByKeys {
            keys: keys.into_iter().map(Into::into).collect(),
        };
        self.batch.push(op, OpFlags::default())
    }

    pub fn cmp_xattr(&mut self, name: &str, op: CmpOp, value: &[u8]) -> &mut Self {
        let op = SubOperation::CmpXattr {
            name: name.to_string(),
            op,
            value: value.to_vec(),
        };
        self.batch.push(op, OpFlags::default());
        self
    }

    pub fn omap_cmp(&mut self, key: &str, op: CmpOp, value: &[u8]) -> &mut Self {
        let op = SubOperation::OmapCmp {
            key: key.to_string(),
            op,
            value: value.to_vec(),
        };
        self.batch.push(op, OpFlags::default());
        self
    }

    pub fn assert_exists(&mut self, expected: bool) -> &mut Self {
        self.batch
            .push(SubOperation::AssertExists { expected }, OpFlags::default());
        self
    }

    /// Run a read-only object class method.
    pub fn exec(&mut self, class: &str, method: &str, input: &[u8]) -> OpIndex {
        let op = SubOperation::Exec {
            class: class.to_string(),
            method: method.to_string(),
            input: input.to_vec(),
        };
        self.batch.push(op, OpFlags::default())
    }

    /// Replace the flags of the most recently added sub-operation.
    pub fn set_flags(&mut self, flags: OpFlags) -> &mut Self {
        self.batch.set_last_flags(flags);
        self
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn into_batch(self) -> OperationBatch {
        self.batch
    }
}

impl Default for ReadOp {
    fn default() -> Self {
        Self::new()
    }
}

/// Write batch builder.
#[derive(Clone, Debug)]
pub struct WriteOp {
    batch: OperationBatch,
}

impl WriteOp {
    pub fn new() -> Self {
        Self {
            batch: OperationBatch::new(BatchKind::Write),
        }
    }

    fn add(&mut self, op: SubOperation) -> &mut Self {
        self.batch.push(op, OpFlags::default());
        self
    }

    pub fn create(&mut self, mode: CreateMode) -> &mut Self {
        self.add(SubOperation::Create { mode })
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> &mut Self {
        self.add(SubOperation::Write {
            offset,
            data: data.to_vec(),
        })
    }

    pub fn write_full(&mut self, data: &[u8]) -> &mut Self {
        self.add(SubOperation::WriteFull { data: data.to_vec() })
    }

    pub fn append(&mut self, data: &[u8]) -> &mut Self {
        self.add(SubOperation::Append { data: data.to_vec() })
    }

    pub fn zero(&mut self, offset: u64, len: u64) -> &mut Self {
        self.add(SubOperation::Zero { offset, len })
    }

    pub fn truncate(&mut self, size: u64) -> &mut Self {
        self.add(SubOperation::Truncate { size })
    }

    pub fn remove(&mut self) -> &mut Self {
        self.add(SubOperation::Remove)
    }

    pub fn set_xattr(&mut self, name: &str, value: &[u8]) -> &mut Self {
        self.add(SubOperation::SetXattr {
            name: name.to_string(),
            value: value.to_vec(),
        })
    }

    pub fn remove_xattr(&mut self, name: &str) -> &mut Self {
        self.add(SubOperation::RemoveXattr { name: name.to_string() })
    }

    pub fn omap_set<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.as_ref().to_vec()))
            .collect();
        self.add(SubOperation::OmapSet { entries })
    }

    pub fn omap_remove_keys<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.add(SubOperation::OmapRemoveKeys { keys })
    }

    pub fn omap_clear(&mut self) -> &mut Self {
        self.add(SubOperation::OmapClear)
    }

    pub fn set_alloc_hint(&mut self, expected_object_size: u64, expected_write_size: u64) -> &mut Self {
        self.add(SubOperation::SetAllocHint {
            expected_object_size,
            expected_write_size,
        })
    }

    pub fn cmp_xattr(&mut self, name: &str, op: CmpOp, value: &[u8]) -> &mut Self {
        self.add(SubOperation::CmpXattr {
            name: name.to_string(),
            op,
            value: value.to_vec(),
        })
    }

    pub fn omap_cmp(&mut self, key: &str, op: CmpOp, value: &[u8]) -> &mut Self {
        self.add(SubOperation::OmapCmp {
            key: key.to_string(),
            op,
            value: value.to_vec(),
        })
    }

    pub fn assert_exists(&mut self, expected: bool) -> &mut Self {
        self.add(SubOperation::AssertExists { expected })
    }

    pub fn exec(&mut self, class: &str, method: &str, input: &[u8]) -> OpIndex {
        let op = SubOperation::Exec {
            class: class.to_string(),
            method: method.to_string(),
            input: input.to_vec(),
        };
        self.batch.push(op, OpFlags::default())
    }

    /// Replace the flags of the most recently added sub-operation.
    pub fn set_flags(&mut self, flags: OpFlags) -> &mut Self {
        self.batch.set_last_flags(flags);
        self
    }

    pub fn set_mtime(&mut self, mtime: DateTime<Utc>) -> &mut Self {
        self.batch.set_mtime(mtime);
        self
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn into_batch(self) -> OperationBatch {
        self.batch
    }
}

impl Default for WriteOp {
    fn default() -> Self {
        Self::new()
    }
}

/// Output produced by one sub-operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OpOutput {
    #[default]
    None,
    Data(Bytes),
    Stat(ObjectStat),
    Xattrs(Vec<(String, Bytes)>),
    Omap {
        entries: Vec<(String, Bytes)>,
        /// More entries exist past the returned ones.
        more: bool,
    },
    Keys {
        keys: Vec<String>,
        more: bool,
    },
}

/// Result of one executed sub-operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubOpResult {
    /// Zero or positive on success, a negative taxonomy code on failure.
    pub rval: i32,
    pub output: OpOutput,
}

impl SubOpResult {
    pub fn ok(output: OpOutput) -> Self {
        Self { rval: 0, output }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            rval: kind.code(),
            output: OpOutput::None,
        }
    }
}

/// Everything the cluster reports back for one executed batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Zero on success, a negative taxonomy code on failure.
    pub rval: i32,
    /// One entry per sub-operation, in append order.
    pub results: Vec<SubOpResult>,
}

impl BatchOutcome {
    pub fn success(results: Vec<SubOpResult>) -> Self {
        Self { rval: 0, results }
    }

    pub fn failure(kind: ErrorKind) -> Self {
        Self {
            rval: kind.code(),
            results: Vec::new(),
        }
    }

    pub fn result(&self, index: OpIndex) -> ClientResult<&SubOpResult> {
        self.results.get(index.0).ok_or_else(|| {
            ClientError::InvalidOperation(format!("no result for sub-operation {}", index.0))
        })
    }

    fn checked(&self, index: OpIndex) -> ClientResult<&OpOutput> {
        let result = self.result(index)?;
        match ErrorKind::from_code(result.rval) {
            Some(kind) if result.rval < 0 => Err(ClientError::Remote(kind)),
            None if result.rval < 0 => Err(ClientError::Remote(ErrorKind::Internal)),
            _ => Ok(&result.output),
        }
    }

    /// Bytes returned by a read, get-xattr or exec sub-operation.
    pub fn data(&self, index: OpIndex) -> ClientResult<Bytes> {
        match self.checked(index)? {
            OpOutput::Data(bytes) => Ok(bytes.clone()),
            OpOutput::None => Ok(Bytes::new()),
            other => Err(mismatch(index, "data", other)),
        }
    }

    pub fn stat(&self, index: OpIndex) -> ClientResult<ObjectStat> {
        match self.checked(index)? {
            OpOutput::Stat(stat) => Ok(*stat),
            other => Err(mismatch(index, "stat", other)),
        }
    }

    pub fn xattrs(&self, index: OpIndex) -> ClientResult<XattrIter> {
        match self.checked(index)? {
            OpOutput::Xattrs(pairs) => Ok(XattrIter::new(pairs.clone())),
            other => Err(mismatch(index, "xattrs", other)),
        }
    }

    pub fn omap(&self, index: OpIndex) -> ClientResult<OmapIter> {
        match self.checked(index)? {
            OpOutput::Omap { entries, more } => Ok(OmapIter::new(entries.clone(), *more)),
            other => Err(mismatch(index, "omap", other)),
        }
    }

    /// Keys returned by an omap get-keys sub-operation, and whether more exist.
    pub fn omap_keys(&self, index: OpIndex) -> ClientResult<(Vec<String>, bool)> {
        match self.checked(index)? {
            OpOutput::Keys { keys, more } => Ok((keys.clone(), *more)),
            other => Err(mismatch(index, "keys", other)),
        }
    }
}

fn mismatch(index: OpIndex, wanted: &str, got: &OpOutput) -> ClientError {
    ClientError::InvalidOperation(format!(
        "sub-operation {} produced {got:?}, not {wanted}",
        index.0
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_ops_compare_stored_against_supplied() {
        assert!(CmpOp::Eq.holds(b"v1", b"v1"));
        assert!(CmpOp::Ne.holds(b"v1", b"v0"));
        assert!(CmpOp::Gt.holds(b"b", b"a"));
        assert!(!CmpOp::Gt.holds(b"a", b"a"));
        assert!(CmpOp::Gte.holds(b"a", b"a"));
        assert!(CmpOp::Lt.holds(b"ab", b"b"));
        assert!(CmpOp::Lte.holds(b"", b""));
    }

    #[test]
    fn append_rejects_incompatible_kinds() {
        let mut read = OperationBatch::new(BatchKind::Read);
        let err = read
            .append(SubOperation::Write {
                offset: 0,
                data: b"x".to_vec(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(read.is_empty());

        let mut write = OperationBatch::new(BatchKind::Write);
        assert!(write.append(SubOperation::Stat).is_err());
    }

    #[test]
    fn compares_and_exec_fit_both_kinds() {
        for kind in [BatchKind::Read, BatchKind::Write] {
            let mut batch = OperationBatch::new(kind);
            batch
                .append(SubOperation::AssertExists { expected: true })
                .unwrap();
            batch
                .append(SubOperation::CmpXattr {
                    name: "a".into(),
                    op: CmpOp::Eq,
                    value: vec![],
                })
                .unwrap();
            batch
                .append(SubOperation::Exec {
                    class: "c".into(),
                    method: "m".into(),
                    input: vec![],
                })
                .unwrap();
            assert_eq!(batch.len(), 3);
        }
    }

    #[test]
    fn append_preserves_order_and_returns_indices() {
        let mut batch = OperationBatch::new(BatchKind::Write);
        let first = batch.append(SubOperation::Create { mode: CreateMode::Exclusive }).unwrap();
        let second = batch
            .append_with_flags(SubOperation::Remove, OpFlags::FAIL_OK)
            .unwrap();
        assert_eq!(first, OpIndex(0));
        assert_eq!(second, OpIndex(1));
        assert_eq!(batch.ops()[0].op.name(), "create");
        assert!(batch.ops()[1].flags.fail_ok);
    }

    #[test]
    fn typed_builders_produce_valid_batches() {
        let mut write = WriteOp::new();
        write
            .create(CreateMode::Exclusive)
            .write(0, b"hello")
            .omap_set([("k", b"v")])
            .set_xattr("owner", b"me")
            .remove_xattr("gone")
            .set_flags(OpFlags::FAIL_OK);
        let batch = write.into_batch();
        assert_eq!(batch.kind(), BatchKind::Write);
        assert!(batch.ops().iter().all(|e| e.op.allowed_in(BatchKind::Write)));
        assert!(batch.ops()[4].flags.fail_ok);
        assert!(!batch.ops()[3].flags.fail_ok);

        let mut read = ReadOp::new();
        read.assert_exists(true);
        let data = read.read(0, 5);
        let stat = read.stat();
        assert_eq!(data, OpIndex(1));
        assert_eq!(stat, OpIndex(2));
        let batch = read.into_batch();
        assert!(batch.ops().iter().all(|e| e.op.allowed_in(BatchKind::Read)));
    }

    #[test]
    fn outcome_accessors_check_rval_and_shape() {
        let outcome = BatchOutcome::success(vec![
            SubOpResult::ok(OpOutput::Data(Bytes::from_static(b"hello"))),
            SubOpResult::failed(ErrorKind::NotFound),
            SubOpResult::ok(OpOutput::Omap {
                entries: vec![("k".into(), Bytes::from_static(b"v"))],
                more: true,
            }),
        ]);
        assert_eq!(outcome.data(OpIndex(0)).unwrap(), Bytes::from_static(b"hello"));
        assert!(matches!(
            outcome.data(OpIndex(1)),
            Err(ClientError::Remote(ErrorKind::NotFound))
        ));
        assert!(outcome.stat(OpIndex(0)).is_err());
        let omap = outcome.omap(OpIndex(2)).unwrap();
        assert!(omap.more());
        assert!(outcome.result(OpIndex(9)).is_err());
    }
}
