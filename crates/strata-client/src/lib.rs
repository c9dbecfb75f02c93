//! Client engine for Strata.
//!
//! Callers assemble sub-operations against a single object into an
//! [`OperationBatch`] (or the typed [`ReadOp`] / [`WriteOp`] builders),
//! submit it through an [`IoContext`], and observe the result through a
//! [`Completion`]. The cluster applies a batch all or nothing, in append
//! order.
//!
//! # Completion milestones
//!
//! Every completion passes two milestones: *acknowledged* (applied and
//! visible) and *durable* (persisted). Read batches reach both at once.
//! Callers can block ([`Completion::wait_for_durable`]), await
//! ([`Completion::durable`]), poll, or register [`Callbacks`].
//!
//! # Adapter boundary
//!
//! The engine never talks to the network itself. A [`Dispatcher`] receives
//! the encoded batch, the target key, an immutable [`ContextSnapshot`], and
//! a non-owning [`CompletionNotifier`] through which it reports results.
//! [`ClusterControl`] adds the request/response calls a [`Session`] needs.

pub mod codec;
pub mod completion;
pub mod config;
pub mod context;
pub mod cursor;
pub mod dispatch;
pub mod error;
mod inflight;
mod io;
pub mod op;
pub mod session;

#[cfg(test)]
mod testing;

pub use codec::{BatchCodec, EncodedBatch, MAX_BATCH_SIZE};
pub use completion::{
    Callback, Callbacks, Completion, CompletionEvent, CompletionNotifier, CompletionState,
    Milestone, ReturnPolicy,
};
pub use config::ClientConfig;
pub use context::{ContextSnapshot, IoContext};
pub use cursor::{ObjectCursor, OmapIter, XattrIter};
pub use dispatch::{ClusterControl, Dispatcher, ListEntry, ListPage, ListPosition, LogCallback};
pub use error::{ClientError, ClientResult};
pub use op::{
    BatchKind, BatchOutcome, CmpOp, CreateMode, OpClass, OpEntry, OpFlags, OpIndex, OpOutput,
    OperationBatch, ReadOp, SubOpResult, SubOperation, WriteOp,
};
pub use session::{Session, SubmitMode};
