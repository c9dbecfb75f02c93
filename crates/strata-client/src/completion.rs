use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use strata_types::{CompletionId, ErrorKind};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::inflight::InflightGuard;
use crate::op::{BatchKind, BatchOutcome};

/// Milestone callback. Receives the return value, or the failure kind.
///
/// Callbacks run on the adapter's thread. They must not block waiting for
/// a later milestone of the same completion.
pub type Callback = Box<dyn FnOnce(Result<i32, ErrorKind>) + Send + 'static>;

/// Callbacks registered at submission.
#[derive(Default)]
pub struct Callbacks {
    acknowledged: Option<Callback>,
    durable: Option<Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired once when the batch is applied (or fails first).
    pub fn on_acknowledged<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<i32, ErrorKind>) + Send + 'static,
    {
        self.acknowledged = Some(Box::new(f));
        self
    }

    /// Fired once when the batch is persisted (or fails first).
    pub fn on_durable<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<i32, ErrorKind>) + Send + 'static,
    {
        self.durable = Some(Box::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledged.is_none() && self.durable.is_none()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("acknowledged", &self.acknowledged.is_some())
            .field("durable", &self.durable.is_some())
            .finish()
    }
}

/// Lifecycle of a submitted batch.
///
/// ```text
/// Pending --ack(ok)--> Acknowledged --durable(ok)--> Durable --release--> Released
/// Pending --ack(err)--> Failed
/// Acknowledged --durable(err)--> Failed --release--> Released
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionState {
    Pending,
    Acknowledged,
    Durable,
    Failed(ErrorKind),
    Released,
}

impl CompletionState {
    /// `Durable` or `Failed`: no further event changes the outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Durable | Self::Failed(_))
    }

    /// Whether a wait for `milestone` is over in this state.
    pub fn reached(self, milestone: Milestone) -> bool {
        match milestone {
            Milestone::Acknowledged => !matches!(self, Self::Pending),
            Milestone::Durable => !matches!(self, Self::Pending | Self::Acknowledged),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Milestone {
    Acknowledged,
    Durable,
}

/// How the return value is derived from a successful outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReturnPolicy {
    /// The batch return code.
    #[default]
    Batch,
    /// The first sub-operation's return code (bytes read for a read).
    FirstResult,
}

/// What the adapter reports for a completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionEvent {
    /// The batch was applied. A negative `rval` is a failure.
    Acknowledged(BatchOutcome),
    /// The batch is persisted. Implies the acknowledgment.
    Durable,
    Failed {
        kind: ErrorKind,
        outcome: Option<BatchOutcome>,
    },
}

impl CompletionEvent {
    fn is_terminal_for(&self, kind: BatchKind) -> bool {
        match self {
            Self::Acknowledged(outcome) => kind == BatchKind::Read || outcome.rval < 0,
            Self::Durable | Self::Failed { .. } => true,
        }
    }
}

struct Slot {
    state: CompletionState,
    /// State whose callbacks have all run; waiters key off this.
    settled: CompletionState,
    outcome: Option<BatchOutcome>,
    callbacks: Callbacks,
}

struct Shared {
    id: CompletionId,
    kind: BatchKind,
    policy: ReturnPolicy,
    slot: Mutex<Slot>,
    changed: Condvar,
    notify: Notify,
    /// Serializes deliveries, callbacks included.
    delivery: Mutex<()>,
}

type Firing = (Callback, Result<i32, ErrorKind>);

impl Shared {
    fn value(&self, outcome: Option<&BatchOutcome>) -> i32 {
        match (self.policy, outcome) {
            (_, None) => 0,
            (ReturnPolicy::Batch, Some(o)) => o.rval,
            (ReturnPolicy::FirstResult, Some(o)) => {
                o.results.first().map_or(o.rval, |r| r.rval)
            }
        }
    }

    /// Apply `event` to the slot and collect the callbacks it releases.
    fn apply(&self, slot: &mut Slot, event: CompletionEvent) -> Vec<Firing> {
        let mut firing = Vec::new();
        match (slot.state, event) {
            (CompletionState::Pending, CompletionEvent::Acknowledged(outcome)) if outcome.rval < 0 => {
                let kind = ErrorKind::from_code(outcome.rval).unwrap_or(ErrorKind::Internal);
                self.fail(slot, kind, Some(outcome), &mut firing);
            }
            (CompletionState::Pending, CompletionEvent::Acknowledged(outcome)) => {
                slot.outcome = Some(outcome);
                let value = self.value(slot.outcome.as_ref());
                take(&mut slot.callbacks.acknowledged, Ok(value), &mut firing);
                if self.kind == BatchKind::Read {
                    slot.state = CompletionState::Durable;
                    take(&mut slot.callbacks.durable, Ok(value), &mut firing);
                } else {
                    slot.state = CompletionState::Acknowledged;
                }
            }
            (CompletionState::Pending | CompletionState::Acknowledged, CompletionEvent::Durable) => {
                let value = self.value(slot.outcome.as_ref());
                take(&mut slot.callbacks.acknowledged, Ok(value), &mut firing);
                take(&mut slot.callbacks.durable, Ok(value), &mut firing);
                slot.state = CompletionState::Durable;
            }
            (
                CompletionState::Pending | CompletionState::Acknowledged,
                CompletionEvent::Failed { kind, outcome },
            ) => {
                self.fail(slot, kind, outcome, &mut firing);
            }
            (state, event) => {
                warn!(completion = %self.id, ?state, ?event, "ignoring completion event");
            }
        }
        firing
    }

    fn fail(
        &self,
        slot: &mut Slot,
        kind: ErrorKind,
        outcome: Option<BatchOutcome>,
        firing: &mut Vec<Firing>,
    ) {
        if outcome.is_some() {
            slot.outcome = outcome;
        }
        slot.state = CompletionState::Failed(kind);
        take(&mut slot.callbacks.acknowledged, Err(kind), firing);
        take(&mut slot.callbacks.durable, Err(kind), firing);
    }

    fn deliver(&self, event: CompletionEvent) {
        let _serial = self.delivery.lock().expect("lock poisoned");
        let firing = {
            let mut slot = self.slot.lock().expect("lock poisoned");
            self.apply(&mut slot, event)
        };

        for (callback, arg) in firing {
            if panic::catch_unwind(AssertUnwindSafe(move || callback(arg))).is_err() {
                warn!(completion = %self.id, "completion callback panicked");
            }
        }

        let mut slot = self.slot.lock().expect("lock poisoned");
        slot.settled = slot.state;
        drop(slot);
        self.changed.notify_all();
        self.notify.notify_waiters();
    }
}

fn take(callback: &mut Option<Callback>, arg: Result<i32, ErrorKind>, firing: &mut Vec<Firing>) {
    if let Some(cb) = callback.take() {
        firing.push((cb, arg));
    }
}

/// Caller-owned handle on one submitted batch.
///
/// Dropping the handle discards interest: later events and callbacks are
/// dropped. [`release`](Self::release) ends the lifecycle explicitly once the
/// completion is terminal.
pub struct Completion {
    shared: Arc<Shared>,
}

impl Completion {
    /// A new pending completion and the notifier that drives it.
    pub fn new(kind: BatchKind, callbacks: Callbacks) -> (Self, CompletionNotifier) {
        Self::with_policy(kind, ReturnPolicy::default(), callbacks, None)
    }

    pub(crate) fn with_policy(
        kind: BatchKind,
        policy: ReturnPolicy,
        callbacks: Callbacks,
        guard: Option<InflightGuard>,
    ) -> (Self, CompletionNotifier) {
        let shared = Arc::new(Shared {
            id: CompletionId::new(),
            kind,
            policy,
            slot: Mutex::new(Slot {
                state: CompletionState::Pending,
                settled: CompletionState::Pending,
                outcome: None,
                callbacks,
            }),
            changed: Condvar::new(),
            notify: Notify::new(),
            delivery: Mutex::new(()),
        });
        let notifier = CompletionNotifier {
            shared: Arc::downgrade(&shared),
            id: shared.id,
            kind,
            terminal: AtomicBool::new(false),
            guard: Mutex::new(guard),
        };
        (Self { shared }, notifier)
    }

    pub fn id(&self) -> CompletionId {
        self.shared.id
    }

    pub fn kind(&self) -> BatchKind {
        self.shared.kind
    }

    pub fn state(&self) -> CompletionState {
        self.shared.slot.lock().expect("lock poisoned").state
    }

    /// Acknowledged, durable, or failed.
    pub fn is_complete(&self) -> bool {
        self.state().reached(Milestone::Acknowledged)
    }

    pub fn is_durable(&self) -> bool {
        self.state() == CompletionState::Durable
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Block until acknowledged or failed.
    pub fn wait_for_acknowledged(&self) -> CompletionState {
        self.wait(Milestone::Acknowledged)
    }

    /// Block until durable or failed.
    pub fn wait_for_durable(&self) -> CompletionState {
        self.wait(Milestone::Durable)
    }

    fn wait(&self, milestone: Milestone) -> CompletionState {
        let slot = self.shared.slot.lock().expect("lock poisoned");
        let slot = self
            .shared
            .changed
            .wait_while(slot, |s| !s.settled.reached(milestone))
            .expect("lock poisoned");
        slot.settled
    }

    /// Resolves once acknowledged or failed.
    pub async fn acknowledged(&self) -> CompletionState {
        self.wait_async(Milestone::Acknowledged).await
    }

    /// Resolves once durable or failed.
    pub async fn durable(&self) -> CompletionState {
        self.wait_async(Milestone::Durable).await
    }

    async fn wait_async(&self, milestone: Milestone) -> CompletionState {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let settled = self.shared.slot.lock().expect("lock poisoned").settled;
            if settled.reached(milestone) {
                return settled;
            }
            notified.await;
        }
    }

    /// The return value once acknowledged.
    ///
    /// `InvalidOperation` while pending; the failure kind once failed.
    pub fn return_value(&self) -> Result<i32, ErrorKind> {
        let slot = self.shared.slot.lock().expect("lock poisoned");
        match slot.state {
            CompletionState::Pending => Err(ErrorKind::InvalidOperation),
            CompletionState::Failed(kind) => Err(kind),
            _ => Ok(self.shared.value(slot.outcome.as_ref())),
        }
    }

    /// [`return_value`](Self::return_value) as a raw integer.
    pub fn return_code(&self) -> i32 {
        match self.return_value() {
            Ok(value) => value,
            Err(kind) => kind.code(),
        }
    }

    /// Per-sub-operation results reported so far, if any.
    pub fn outcome(&self) -> Option<BatchOutcome> {
        self.shared.slot.lock().expect("lock poisoned").outcome.clone()
    }

    /// The outcome of a successfully acknowledged batch.
    pub fn result(&self) -> ClientResult<BatchOutcome> {
        let slot = self.shared.slot.lock().expect("lock poisoned");
        match slot.state {
            CompletionState::Pending => Err(ClientError::NotComplete),
            CompletionState::Failed(kind) => Err(ClientError::Remote(kind)),
            _ => Ok(slot.outcome.clone().unwrap_or_default()),
        }
    }

    /// End the lifecycle. Only terminal completions can be released; any
    /// other is handed back.
    pub fn release(self) -> Result<(), Completion> {
        let released = {
            let mut slot = self.shared.slot.lock().expect("lock poisoned");
            if slot.state.is_terminal() {
                slot.state = CompletionState::Released;
                slot.settled = CompletionState::Released;
                slot.callbacks = Callbacks::default();
                true
            } else {
                false
            }
        };
        if released {
            debug!(completion = %self.shared.id, "completion released");
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("state", &self.state())
            .finish()
    }
}

/// Non-owning delivery handle given to the dispatcher.
///
/// A notifier dropped before delivering a terminal event fails its
/// completion with `Cancelled`.
pub struct CompletionNotifier {
    shared: Weak<Shared>,
    id: CompletionId,
    kind: BatchKind,
    terminal: AtomicBool,
    guard: Mutex<Option<InflightGuard>>,
}

impl CompletionNotifier {
    pub fn id(&self) -> CompletionId {
        self.id
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// `false` once the caller dropped or released the completion.
    pub fn is_interested(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            shared.slot.lock().expect("lock poisoned").state != CompletionState::Released
        })
    }

    pub fn acknowledge(&self, outcome: BatchOutcome) {
        self.deliver(CompletionEvent::Acknowledged(outcome));
    }

    pub fn durable(&self) {
        self.deliver(CompletionEvent::Durable);
    }

    pub fn fail(&self, kind: ErrorKind) {
        self.deliver(CompletionEvent::Failed { kind, outcome: None });
    }

    pub fn fail_with(&self, kind: ErrorKind, outcome: BatchOutcome) {
        self.deliver(CompletionEvent::Failed {
            kind,
            outcome: Some(outcome),
        });
    }

    pub fn deliver(&self, event: CompletionEvent) {
        let terminal = event.is_terminal_for(self.kind);
        match self.shared.upgrade() {
            Some(shared) => shared.deliver(event),
            None => debug!(completion = %self.id, "completion dropped; discarding event"),
        }
        if terminal {
            self.terminal.store(true, Ordering::Release);
            self.guard.lock().expect("lock poisoned").take();
        }
    }
}

impl Drop for CompletionNotifier {
    fn drop(&mut self) {
        if !self.terminal.load(Ordering::Acquire) {
            warn!(completion = %self.id, "notifier dropped before a terminal event");
            self.deliver(CompletionEvent::Failed {
                kind: ErrorKind::Cancelled,
                outcome: None,
            });
        }
    }
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("terminal", &self.terminal.load(Ordering::Relaxed))
            .finish()
    }
}
