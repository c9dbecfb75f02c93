//! The cluster log and its single monitor registration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use strata_client::LogCallback;
use strata_types::{LogEntry, LogLevel};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Active monitor: a delivery task and the flag that retires it.
struct Monitor {
    level: LogLevel,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Monitor {
    fn retire(self) {
        self.active.store(false, Ordering::Release);
        self.task.abort();
    }
}

/// Fan-out of cluster log entries to the registered monitor.
///
/// Entries are numbered in emission order. At most one monitor is
/// registered at a time; registering again replaces it, and entries emitted
/// after the replacement returns never reach the old callback.
pub struct ClusterLog {
    seq: AtomicU64,
    sender: broadcast::Sender<LogEntry>,
    monitor: Mutex<Option<Monitor>>,
}

impl ClusterLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            seq: AtomicU64::new(0),
            sender,
            monitor: Mutex::new(None),
        }
    }

    /// Record an entry and hand it to the monitor, if any.
    pub fn emit(&self, level: LogLevel, who: &str, msg: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            seq: self.seq.fetch_add(1, Ordering::AcqRel) + 1,
            stamp: Utc::now(),
            who: who.to_string(),
            level,
            msg: msg.into(),
        };
        debug!(seq = entry.seq, who, level = %level, msg = %entry.msg, "cluster log");
        // No receivers just means nobody is monitoring.
        let _ = self.sender.send(entry.clone());
        entry
    }

    /// Replace the monitor registration. `None` deregisters.
    ///
    /// The callback runs on a task spawned onto `runtime`, one entry at a
    /// time, for entries at `level` or above.
    pub fn monitor(&self, runtime: &Handle, level: LogLevel, callback: Option<LogCallback>) {
        let mut slot = self.monitor.lock().expect("lock poisoned");
        if let Some(old) = slot.take() {
            debug!(level = %old.level, "log monitor replaced");
            old.retire();
        }
        let Some(callback) = callback else {
            return;
        };

        let mut receiver = self.sender.subscribe();
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(entry) => {
                        if !flag.load(Ordering::Acquire) {
                            break;
                        }
                        if entry.level >= level {
                            callback(&entry);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "log monitor lagged; entries dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *slot = Some(Monitor {
            level,
            active,
            task,
        });
    }

    pub fn is_monitored(&self) -> bool {
        self.monitor.lock().expect("lock poisoned").is_some()
    }

    /// Sequence number of the last emitted entry.
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }
}

impl Drop for ClusterLog {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(monitor) = slot.take() {
                monitor.retire();
            }
        }
    }
}

impl std::fmt::Debug for ClusterLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterLog")
            .field("last_seq", &self.last_seq())
            .field("monitored", &self.is_monitored())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_callback() -> (LogCallback, mpsc::UnboundedReceiver<LogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: LogCallback = Box::new(move |entry: &LogEntry| {
            let _ = tx.send(entry.clone());
        });
        (callback, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<LogEntry>) -> LogEntry {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for log entry")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn filters_by_level() {
        let log = ClusterLog::new(16);
        let (callback, mut rx) = channel_callback();
        log.monitor(&Handle::current(), LogLevel::Warn, Some(callback));

        log.emit(LogLevel::Info, "mon", "ignored");
        log.emit(LogLevel::Error, "osd.1", "disk failing");

        let entry = next(&mut rx).await;
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.seq, 2);
        assert_eq!(entry.who, "osd.1");
    }

    #[tokio::test]
    async fn replacement_stops_old_callback() {
        let log = ClusterLog::new(16);
        let (first, mut first_rx) = channel_callback();
        log.monitor(&Handle::current(), LogLevel::Debug, Some(first));
        log.emit(LogLevel::Info, "mon", "one");
        assert_eq!(next(&mut first_rx).await.msg, "one");

        let (second, mut second_rx) = channel_callback();
        log.monitor(&Handle::current(), LogLevel::Debug, Some(second));
        log.emit(LogLevel::Info, "mon", "two");
        assert_eq!(next(&mut second_rx).await.msg, "two");

        // The old task is gone, so its sender is dropped.
        assert!(tokio::time::timeout(Duration::from_secs(5), first_rx.recv())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deregister_with_none() {
        let log = ClusterLog::new(16);
        let (callback, mut rx) = channel_callback();
        log.monitor(&Handle::current(), LogLevel::Debug, Some(callback));
        assert!(log.is_monitored());

        log.monitor(&Handle::current(), LogLevel::Debug, None);
        assert!(!log.is_monitored());
        log.emit(LogLevel::Error, "mon", "unheard");
        assert!(tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn emit_without_monitor_numbers_entries() {
        let log = ClusterLog::new(4);
        let a = log.emit(LogLevel::Info, "mon", "a");
        let b = log.emit(LogLevel::Info, "mon", "b");
        assert_eq!((a.seq, b.seq), (1, 2));
        assert_eq!(log.last_seq(), 2);
    }
}
