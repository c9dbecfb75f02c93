//! Foundation types for Strata.
//!
//! This crate provides the identity, snapshot, and error types shared by the
//! client engine, the object store, the journal, and the reference cluster.
//! Every other Strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`PoolId`]: numeric pool identifier
//! - [`ObjectKey`]: object name plus optional locator key
//! - [`SnapId`] / [`SnapContext`]: read snapshot and write snapshot set
//! - [`ObjectStat`], [`PoolStat`], [`ClusterStat`]: statistics records
//! - [`LogEntry`]: one structured cluster log line
//! - [`ErrorKind`]: the fixed error taxonomy with negative integer codes
//! - [`CompletionId`]: UUID v7 identifier for a submitted batch

pub mod error;
pub mod log;
pub mod object;
pub mod snapshot;
pub mod stat;

pub use error::{ErrorKind, TypeError};
pub use object::{CompletionId, ObjectKey, PoolId};
pub use snapshot::{SnapContext, SnapId};
pub use log::{LogEntry, LogLevel};
pub use stat::{bytes_to_kb, ClusterStat, ObjectStat, PoolStat};
