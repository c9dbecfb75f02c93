use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of a pool snapshot.
///
/// [`SnapId::HEAD`] names the live view of an object rather than a snapshot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapId(u64);

impl SnapId {
    /// The live (non-snapshot) view.
    pub const HEAD: SnapId = SnapId(u64::MAX - 1);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn is_head(self) -> bool {
        self == Self::HEAD
    }
}

impl Default for SnapId {
    fn default() -> Self {
        Self::HEAD
    }
}

impl fmt::Debug for SnapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_head() {
            write!(f, "SnapId(head)")
        } else {
            write!(f, "SnapId({})", self.0)
        }
    }
}

impl fmt::Display for SnapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_head() {
            write!(f, "head")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The snapshot set a write must stay consistent with.
///
/// `seq` is the most recent snapshot sequence the writer knows about and
/// `snaps` lists the existing snapshots, newest first. A write carrying a
/// context whose `seq` is newer than the object's last-seen sequence
/// preserves the pre-write contents for the snapshots it has not seen yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapContext {
    seq: u64,
    snaps: Vec<SnapId>,
}

impl SnapContext {
    /// Build a validated context.
    ///
    /// Snapshots must be strictly descending and none may exceed `seq`.
    pub fn new(seq: u64, snaps: Vec<SnapId>) -> Result<Self, TypeError> {
        if let Some(first) = snaps.first() {
            if first.get() > seq {
                return Err(TypeError::InvalidSnapContext(format!(
                    "snapshot {first} is newer than seq {seq}"
                )));
            }
        }
        for pair in snaps.windows(2) {
            if pair[0] <= pair[1] {
                return Err(TypeError::InvalidSnapContext(format!(
                    "snapshots must be strictly descending: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        if snaps.iter().any(|s| s.is_head()) {
            return Err(TypeError::InvalidSnapContext(
                "head cannot be part of a snapshot set".into(),
            ));
        }
        Ok(Self { seq, snaps })
    }

    /// The empty context: no snapshots exist.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn snaps(&self) -> &[SnapId] {
        &self.snaps
    }

    /// Snapshots in this context that are newer than `last_seq`, newest first.
    pub fn snaps_after(&self, last_seq: u64) -> Vec<SnapId> {
        self.snaps
            .iter()
            .copied()
            .take_while(|s| s.get() > last_seq)
            .collect()
    }
}
