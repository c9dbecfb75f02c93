//! Write-ahead journal for the Strata reference cluster.
//!
//! Every committed change (pool lifecycle, snapshot allocation, object
//! post-image) is appended as a length- and CRC-framed record. Syncing the
//! journal is what turns an acknowledged batch into a durable one, and
//! replaying it rebuilds an [`ObjectStore`](strata_store::ObjectStore) after
//! a restart.

pub mod error;
pub mod journal;
pub mod record;
pub mod replay;

pub use error::{JournalError, Result};
pub use journal::{Journal, JournalConfig, SyncMode};
pub use record::JournalRecord;
pub use replay::{export_records, replay_into, ReplayStats};
