use std::sync::{Arc, Condvar, Mutex};

use tokio::sync::Notify;

/// Counts writes submitted through one context that have not reached a
/// terminal state.
#[derive(Debug, Default)]
pub(crate) struct InflightTracker {
    count: Mutex<u64>,
    idle: Condvar,
    notify: Notify,
}

impl InflightTracker {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one outstanding write. Dropping the guard retires it.
    pub(crate) fn begin(self: &Arc<Self>) -> InflightGuard {
        *self.count.lock().expect("lock poisoned") += 1;
        InflightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn outstanding(&self) -> u64 {
        *self.count.lock().expect("lock poisoned")
    }

    /// Block until nothing is outstanding.
    pub(crate) fn wait_idle(&self) {
        let count = self.count.lock().expect("lock poisoned");
        let _idle = self
            .idle
            .wait_while(count, |n| *n > 0)
            .expect("lock poisoned");
    }

    pub(crate) async fn idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn retire(&self) {
        let mut count = self.count.lock().expect("lock poisoned");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
            self.notify.notify_waiters();
        }
    }
}

/// One outstanding write.
#[derive(Debug)]
pub(crate) struct InflightGuard {
    tracker: Arc<InflightTracker>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.tracker.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guards_count_outstanding_writes() {
        let tracker = InflightTracker::new();
        let a = tracker.begin();
        let b = tracker.begin();
        assert_eq!(tracker.outstanding(), 2);
        drop(a);
        drop(b);
        assert_eq!(tracker.outstanding(), 0);
        tracker.wait_idle();
    }

    #[test]
    fn wait_idle_blocks_until_last_guard_drops() {
        let tracker = InflightTracker::new();
        let guard = tracker.begin();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(guard);
        });
        tracker.wait_idle();
        assert_eq!(tracker.outstanding(), 0);
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn idle_future_resolves() {
        let tracker = InflightTracker::new();
        let guard = tracker.begin();
        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.idle().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);
        waiter.await.unwrap();
    }
}
