use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_types::{ObjectStat, SnapContext, SnapId};

/// Expected sizes recorded by a set-allocation-hint sub-operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocHint {
    pub expected_object_size: u64,
    pub expected_write_size: u64,
}

/// Contents of one version of an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    pub data: Vec<u8>,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    pub omap: BTreeMap<String, Vec<u8>>,
    pub mtime: DateTime<Utc>,
    /// Bumped once per committed batch that mutated the object.
    pub version: u64,
    pub alloc_hint: Option<AllocHint>,
}

impl ObjectState {
    /// An empty object created at `mtime`.
    pub fn new(mtime: DateTime<Utc>) -> Self {
        Self {
            data: Vec::new(),
            xattrs: BTreeMap::new(),
            omap: BTreeMap::new(),
            mtime,
            version: 0,
            alloc_hint: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn stat(&self) -> ObjectStat {
        ObjectStat {
            size: self.size(),
            mtime: self.mtime,
        }
    }

    /// Bytes in `[offset, offset + len)`, clamped to the object size.
    ///
    /// A `len` of zero reads through the end of the object.
    pub fn read(&self, offset: u64, len: u64) -> &[u8] {
        let size = self.data.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(size);
        let end = if len == 0 {
            size
        } else {
            start.saturating_add(usize::try_from(len).unwrap_or(usize::MAX)).min(size)
        };
        &self.data[start..end]
    }

    /// Write `bytes` at `offset`, zero-filling any gap past the current end.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        let end = start + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }

    /// Replace the whole contents.
    pub fn write_full(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Zero `[offset, offset + len)`. Never extends the object.
    pub fn zero(&mut self, offset: u64, len: u64) {
        let size = self.data.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(size);
        let end = start.saturating_add(usize::try_from(len).unwrap_or(usize::MAX)).min(size);
        self.data[start..end].fill(0);
    }

    /// Shrink or zero-extend to exactly `size` bytes.
    pub fn truncate(&mut self, size: u64) {
        self.data.resize(size as usize, 0);
    }
}

/// Contents preserved for snapshots taken before a write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapClone {
    pub state: ObjectState,
    /// Snapshots this clone serves, newest first.
    pub snaps: Vec<SnapId>,
}

/// Everything the store keeps for one object key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// The live object, absent if it was never created or has been removed.
    pub head: Option<ObjectState>,
    /// Newest snapshot sequence any write to this object has carried.
    pub snap_seq: u64,
    /// Clones keyed by the sequence of the write that created them.
    pub clones: BTreeMap<SnapId, SnapClone>,
}

impl ObjectRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self) -> bool {
        self.head.is_some()
    }

    /// `true` when nothing is left to keep: no head and no clones.
    pub fn is_vacant(&self) -> bool {
        self.head.is_none() && self.clones.is_empty()
    }

    /// The object as seen from `snap`.
    ///
    /// The oldest clone created at or after `snap` serves it if the clone
    /// covers `snap`. Without such a clone the head serves reads for
    /// snapshots newer than every write that touched it.
    pub fn view(&self, snap: SnapId) -> Option<&ObjectState> {
        if snap.is_head() {
            return self.head.as_ref();
        }
        if let Some((_, clone)) = self.clones.range(snap..).next() {
            return clone.snaps.contains(&snap).then_some(&clone.state);
        }
        if snap.get() > self.snap_seq {
            self.head.as_ref()
        } else {
            None
        }
    }

    /// Preserve the head for snapshots this object has not seen yet.
    ///
    /// Called once before the first mutation of a write batch.
    pub fn prepare_write(&mut self, snapc: &SnapContext) {
        if snapc.seq() <= self.snap_seq {
            return;
        }
        let newer = snapc.snaps_after(self.snap_seq);
        if !newer.is_empty() {
            if let Some(head) = &self.head {
                self.clones.insert(
                    SnapId::new(snapc.seq()),
                    SnapClone {
                        state: head.clone(),
                        snaps: newer,
                    },
                );
            }
        }
        self.snap_seq = snapc.seq();
    }

    /// Bytes held by the head and every clone.
    pub fn footprint(&self) -> u64 {
        let head = self.head.as_ref().map_or(0, ObjectState::size);
        head + self.clones.values().map(|c| c.state.size()).sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(bytes: &[u8]) -> ObjectState {
        let mut s = ObjectState::new(DateTime::<Utc>::UNIX_EPOCH);
        s.write_full(bytes);
        s
    }

    fn snapc(seq: u64, snaps: &[u64]) -> SnapContext {
        SnapContext::new(seq, snaps.iter().copied().map(SnapId::new).collect()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Byte-range operations
    // -----------------------------------------------------------------------

    #[test]
    fn write_past_end_zero_fills() {
        let mut s = state(b"ab");
        s.write(4, b"cd");
        assert_eq!(s.data, b"ab\0\0cd");
    }

    #[test]
    fn read_clamps_and_reads_to_end() {
        let s = state(b"hello world");
        assert_eq!(s.read(6, 100), b"world");
        assert_eq!(s.read(6, 0), b"world");
        assert_eq!(s.read(50, 3), b"");
        assert_eq!(s.read(0, 5), b"hello");
    }

    #[test]
    fn zero_never_extends() {
        let mut s = state(b"abcdef");
        s.zero(4, 10);
        assert_eq!(s.data, b"abcd\0\0");
        s.zero(10, 2);
        assert_eq!(s.size(), 6);
    }

    #[test]
    fn truncate_shrinks_and_extends() {
        let mut s = state(b"abcdef");
        s.truncate(2);
        assert_eq!(s.data, b"ab");
        s.truncate(4);
        assert_eq!(s.data, b"ab\0\0");
    }

    #[test]
    fn append_and_write_full() {
        let mut s = state(b"one");
        s.append(b"two");
        assert_eq!(s.data, b"onetwo");
        s.write_full(b"x");
        assert_eq!(s.data, b"x");
        assert_eq!(s.stat().size, 1);
    }

    proptest! {
        #[test]
        fn write_then_read_returns_same_bytes(
            prefix in proptest::collection::vec(any::<u8>(), 0..64),
            offset in 0u64..128,
            bytes in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let mut s = state(&prefix);
            s.write(offset, &bytes);
            prop_assert_eq!(s.read(offset, bytes.len() as u64), &bytes[..]);
        }

        #[test]
        fn write_zero_read_is_all_zero(
            offset in 0u64..128,
            bytes in proptest::collection::vec(1u8..=255, 1..64),
        ) {
            let mut s = ObjectState::new(DateTime::<Utc>::UNIX_EPOCH);
            s.write(offset, &bytes);
            s.zero(offset, bytes.len() as u64);
            let read = s.read(offset, bytes.len() as u64);
            prop_assert_eq!(read.len(), bytes.len());
            prop_assert!(read.iter().all(|b| *b == 0));
        }
    }

    // -----------------------------------------------------------------------
    // Snapshot views
    // -----------------------------------------------------------------------

    #[test]
    fn head_view_ignores_clones() {
        let record = ObjectRecord {
            head: Some(state(b"live")),
            ..Default::default()
        };
        assert_eq!(record.view(SnapId::HEAD).unwrap().data, b"live");
    }

    #[test]
    fn write_after_snapshot_preserves_old_contents() {
        let mut record = ObjectRecord {
            head: Some(state(b"v1")),
            ..Default::default()
        };
        // Snapshot 3 taken, then a write arrives carrying it.
        record.prepare_write(&snapc(3, &[3]));
        record.head.as_mut().unwrap().write_full(b"v2");

        assert_eq!(record.view(SnapId::new(3)).unwrap().data, b"v1");
        assert_eq!(record.view(SnapId::HEAD).unwrap().data, b"v2");
        assert_eq!(record.clones.len(), 1);
        assert_eq!(record.snap_seq, 3);
    }

    #[test]
    fn second_write_with_same_context_does_not_clone_again() {
        let mut record = ObjectRecord {
            head: Some(state(b"v1")),
            ..Default::default()
        };
        record.prepare_write(&snapc(3, &[3]));
        record.head.as_mut().unwrap().write_full(b"v2");
        record.prepare_write(&snapc(3, &[3]));
        record.head.as_mut().unwrap().write_full(b"v3");

        assert_eq!(record.clones.len(), 1);
        assert_eq!(record.view(SnapId::new(3)).unwrap().data, b"v1");
    }

    #[test]
    fn object_created_after_snapshot_is_absent_in_it() {
        let mut record = ObjectRecord::new();
        record.prepare_write(&snapc(5, &[5]));
        record.head = Some(state(b"new"));

        assert!(record.view(SnapId::new(5)).is_none());
        assert!(record.clones.is_empty());
    }

    #[test]
    fn untouched_object_is_served_by_head_for_newer_snapshot() {
        let record = ObjectRecord {
            head: Some(state(b"v1")),
            snap_seq: 2,
            ..Default::default()
        };
        assert_eq!(record.view(SnapId::new(7)).unwrap().data, b"v1");
        assert!(record.view(SnapId::new(1)).is_none());
    }

    #[test]
    fn removed_head_keeps_clone_and_record() {
        let mut record = ObjectRecord {
            head: Some(state(b"v1")),
            ..Default::default()
        };
        record.prepare_write(&snapc(4, &[4]));
        record.head = None;

        assert!(!record.exists());
        assert!(!record.is_vacant());
        assert_eq!(record.view(SnapId::new(4)).unwrap().data, b"v1");
        assert_eq!(record.footprint(), 2);
    }
}
