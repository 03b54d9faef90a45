//! Entry Supervisor
//!
//! Per-entry runtime state: current status, the pending retry task, the
//! subscriber list, and diagnostics. Owned by the manager and only mutated
//! under its lock.

use crate::connection::{ConnectionEntry, ConnectionSnapshot, ConnectionStatus};
use crate::constants::{RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Capped exponential backoff: `min(base * 2^exponent, max)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// `base` is raised to at least 1ms, `max` to at least `base`
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay for the given exponent, always within `[base, max]`
    pub fn delay_for(&self, exponent: u32) -> Duration {
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RETRY_BASE_DELAY_MS),
            Duration::from_millis(RETRY_MAX_DELAY_MS),
        )
    }
}

/// A one-shot retry timer owned by exactly one entry
pub(crate) struct ScheduledTask {
    id: u64,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn new(id: u64, handle: JoinHandle<()>) -> Self {
        Self { id, handle }
    }

    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

pub(crate) type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Registered callback; `active` is cleared on unsubscribe so a callback
/// already handed to a notifier is skipped
#[derive(Clone)]
pub(crate) struct Subscriber {
    key: u64,
    active: Arc<AtomicBool>,
    callback: StatusCallback,
}

impl Subscriber {
    pub(crate) fn notify(&self, status: ConnectionStatus) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        (self.callback)(status);
        true
    }
}

/// Runtime state of one entry
pub(crate) struct EntrySupervisor {
    entry: ConnectionEntry,
    snapshot: ConnectionSnapshot,
    retry: Option<ScheduledTask>,
    subscribers: Vec<Subscriber>,
    /// Bumped on every status change
    revision: u64,
}

impl EntrySupervisor {
    pub(crate) fn new(entry: ConnectionEntry) -> Self {
        let snapshot = ConnectionSnapshot::new(&entry);
        Self {
            entry,
            snapshot,
            retry: None,
            subscribers: Vec::new(),
            revision: 0,
        }
    }

    pub(crate) fn entry(&self) -> &ConnectionEntry {
        &self.entry
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.snapshot.status
    }

    pub(crate) fn snapshot(&self) -> &ConnectionSnapshot {
        &self.snapshot
    }

    /// Set the status; returns whether it changed
    pub(crate) fn set_status(&mut self, status: ConnectionStatus) -> bool {
        let changed = self.snapshot.status != status;
        self.snapshot.status = status;
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn record_success(&mut self) {
        self.snapshot.last_error = None;
        self.snapshot.last_checked = Some(chrono::Utc::now());
        self.snapshot.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self, error: String) {
        self.snapshot.last_error = Some(error);
        self.snapshot.last_checked = Some(chrono::Utc::now());
        self.snapshot.consecutive_failures = self.snapshot.consecutive_failures.saturating_add(1);
    }

    // ==================== Retry Task ====================

    pub(crate) fn has_pending_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// Abort the pending retry, if any
    pub(crate) fn cancel_pending(&mut self) -> bool {
        match self.retry.take() {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Install a new retry task, cancelling the previous one
    pub(crate) fn replace_retry(&mut self, task: ScheduledTask) {
        self.cancel_pending();
        self.retry = Some(task);
    }

    /// Called by a firing retry task: drops its own handle (without aborting
    /// itself). Returns false if the task was superseded.
    pub(crate) fn release_retry(&mut self, task_id: u64) -> bool {
        if self.retry.as_ref().is_some_and(|t| t.id == task_id) {
            self.retry = None;
            true
        } else {
            false
        }
    }

    // ==================== Subscribers ====================

    pub(crate) fn subscribe(&mut self, key: u64, callback: StatusCallback) {
        self.subscribers.push(Subscriber {
            key,
            active: Arc::new(AtomicBool::new(true)),
            callback,
        });
    }

    pub(crate) fn unsubscribe(&mut self, key: u64) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| {
            if s.key == key {
                s.active.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
        self.subscribers.len() != before
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Subscribers in registration order
    pub(crate) fn subscribers(&self) -> Vec<Subscriber> {
        self.subscribers.clone()
    }
}

impl Drop for EntrySupervisor {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl std::fmt::Debug for EntrySupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrySupervisor")
            .field("id", &self.entry.id)
            .field("status", &self.snapshot.status)
            .field("pending_retry", &self.has_pending_retry())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportKind;
    use std::sync::atomic::AtomicUsize;

    fn supervisor() -> EntrySupervisor {
        EntrySupervisor::new(ConnectionEntry::new(
            "api",
            "API",
            TransportKind::HttpApi,
        ))
    }

    #[test]
    fn test_backoff_default_values() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(4000));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(16_000));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_bounds_for_any_exponent() {
        let backoff = BackoffPolicy::default();
        for exponent in [0, 1, 2, 5, 10, 31, 32, 64, u32::MAX] {
            let delay = backoff.delay_for(exponent);
            assert!(delay >= backoff.base(), "exponent {exponent}: {delay:?}");
            assert!(delay <= backoff.max(), "exponent {exponent}: {delay:?}");
        }
    }

    #[test]
    fn test_backoff_normalizes_inputs() {
        let backoff = BackoffPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(backoff.base(), Duration::from_millis(1));
        assert_eq!(backoff.max(), Duration::from_millis(1));

        let backoff = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(5));
    }

    #[test]
    fn test_status_change_detection() {
        let mut sup = supervisor();
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
        assert!(sup.set_status(ConnectionStatus::Connecting));
        assert!(!sup.set_status(ConnectionStatus::Connecting));
        assert_eq!(sup.revision(), 1);
        assert!(sup.set_status(ConnectionStatus::Connected));
        assert_eq!(sup.revision(), 2);
    }

    #[test]
    fn test_failure_bookkeeping() {
        let mut sup = supervisor();
        sup.record_failure("refused".to_string());
        sup.record_failure("refused again".to_string());
        assert_eq!(sup.snapshot().consecutive_failures, 2);
        assert_eq!(sup.snapshot().last_error.as_deref(), Some("refused again"));

        sup.record_success();
        assert_eq!(sup.snapshot().consecutive_failures, 0);
        assert!(sup.snapshot().last_error.is_none());
        assert!(sup.snapshot().last_checked.is_some());
    }

    #[tokio::test]
    async fn test_replace_retry_cancels_previous() {
        let mut sup = supervisor();
        let first = tokio::spawn(std::future::pending::<()>());
        let abort_probe = first.abort_handle();
        sup.replace_retry(ScheduledTask::new(1, first));

        sup.replace_retry(ScheduledTask::new(2, tokio::spawn(std::future::pending::<()>())));
        tokio::task::yield_now().await;
        assert!(abort_probe.is_finished());

        // A superseded task cannot release the current one
        assert!(!sup.release_retry(1));
        assert!(sup.has_pending_retry());
        assert!(sup.release_retry(2));
        assert!(!sup.has_pending_retry());
        assert!(!sup.cancel_pending());
    }

    #[test]
    fn test_unsubscribe_deactivates_handed_out_copies() {
        let mut sup = supervisor();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        sup.subscribe(
            7,
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let handed_out = sup.subscribers();
        assert!(sup.unsubscribe(7));
        assert!(!sup.unsubscribe(7));
        assert_eq!(sup.subscriber_count(), 0);

        assert!(!handed_out[0].notify(ConnectionStatus::Connected));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
