//! In-process reference cluster for Strata.
//!
//! [`LocalCluster`] implements the client's
//! [`Dispatcher`](strata_client::Dispatcher) and
//! [`ClusterControl`](strata_client::ClusterControl) traits on top of an
//! [`InMemoryObjectStore`](strata_store::InMemoryObjectStore), so a
//! [`Session`](strata_client::Session) can run end to end without a network.
//!
//! # Pieces
//!
//! - [`Executor`] -- applies a decoded batch to one object, all or nothing
//! - [`ClassRegistry`] -- object class methods reachable through exec
//! - [`ClusterLog`] -- numbered log entries fanned out to one monitor
//! - [`ClusterConfig`] -- TOML-loadable tuning and the data directory
//!
//! With a data directory the cluster journals every post-image and replays
//! the journal on open; the durability milestone waits for the journal sync.

pub mod classes;
pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod log;

pub use classes::{ClassRegistry, MethodContext, MethodFn, MethodKind};
pub use cluster::LocalCluster;
pub use config::{ClusterConfig, JOURNAL_FILE};
pub use error::{ClusterError, Result};
pub use exec::{Execution, Executor};
pub use log::ClusterLog;
