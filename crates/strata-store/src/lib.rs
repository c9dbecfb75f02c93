//! Object storage backend for Strata.
//!
//! Objects live in pools, sharded into placement groups by the hash of their
//! locator key (or name). Each object is an [`ObjectRecord`]: an optional
//! live head plus the snapshot clones preserved for older snapshots.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `BTreeMap`-per-placement-group store
//!
//! # Design Rules
//!
//! 1. Updates are all-or-nothing: [`ObjectStore::update`] mutates a copy and
//!    installs it only when the mutation succeeds.
//! 2. Updates to one placement group are serialized; groups proceed in parallel.
//! 3. A record with no head and no clones is removed from the store.
//! 4. The store never interprets sub-operations; batch execution lives above it.

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{AllocHint, ObjectRecord, ObjectState, SnapClone};
pub use traits::{ObjectStore, PoolInfo, PoolUsage, RecordUpdate};
