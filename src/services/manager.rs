//! Connection Manager
//!
//! Owns the fixed registry of connection entries, probes them, retries
//! failures with capped backoff, and publishes status changes to callbacks
//! and to an event channel.
//!
//! ```text
//!   start() ──► staggered first attempts ─┐
//!   sweep  ──► health_check() ───────────┤
//!   retry  ──► scheduled attempt ────────┤ (skipped while `connecting`)
//!   handle(Online) / force_reconnect ────┴──► attempt(id)
//!                                                │
//!            cancel retry, status = connecting ◄─┘
//!                        │
//!            Prober::probe under entry timeout
//!               ok │                 │ err
//!      connected ◄─┘                 └─► error + retry after backoff
//! ```
//!
//! State sits behind one `parking_lot::Mutex`. It is never held across an
//! await or while callbacks run; callbacks may call back into the manager.
//!
//! Each entry also has a reentrant delivery gate, taken before the state lock
//! and held until a status change has reached every subscriber. Changes of
//! one entry are therefore delivered one at a time and in the order they
//! were applied, on any runtime flavor.

use super::events::{ConnectionEvent, ManagerEvent};
use super::probe::{ProbeError, ProberRegistry};
use super::runtime::runtime_handle;
use super::supervisor::{BackoffPolicy, EntrySupervisor, ScheduledTask, Subscriber};
use crate::connection::{ConnectionEntry, ConnectionSnapshot, ConnectionStatus};
use crate::constants::{EVENT_CHANNEL_CAPACITY, HEALTH_CHECK_INTERVAL_SECS, STARTUP_STAGGER_MS};
use crate::domain::ManagerSettings;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use futures::future::join_all;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Scheduling configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    pub backoff: BackoffPolicy,
    /// Period of the health-check sweep
    pub health_check_interval: Duration,
    /// Delay between the first attempts of consecutive entries
    pub startup_stagger: Duration,
}

impl ManagerConfig {
    pub fn from_settings(settings: &ManagerSettings) -> Self {
        Self {
            backoff: BackoffPolicy::new(
                Duration::from_millis(settings.base_delay_ms),
                Duration::from_millis(settings.max_delay_ms),
            ),
            health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
            startup_stagger: Duration::from_millis(settings.startup_stagger_ms),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            health_check_interval: Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS),
            startup_stagger: Duration::from_millis(STARTUP_STAGGER_MS),
        }
    }
}

/// Who asked for an attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    /// Explicit connect or reconnect; may race an attempt in flight
    Manual,
    /// Startup, sweep, or retry timer; skips entries already connecting
    Scheduled,
}

struct ManagerState {
    supervisors: HashMap<String, EntrySupervisor>,
    sweep: Option<JoinHandle<()>>,
    startup: Vec<JoinHandle<()>>,
    running: bool,
    /// Set by `stop()`; failures no longer schedule retries
    stopped: bool,
}

impl ManagerState {
    fn abort_tasks(&mut self) -> usize {
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
        for task in self.startup.drain(..) {
            task.abort();
        }
        self.supervisors
            .values_mut()
            .map(|sup| usize::from(sup.cancel_pending()))
            .sum()
    }
}

impl Drop for ManagerState {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Holds the revision most recently handed to subscribers
type DeliveryGate = ReentrantMutex<Cell<u64>>;

/// A status change waiting to be delivered
struct Notice {
    status: ConnectionStatus,
    revision: u64,
    subscribers: Vec<Subscriber>,
}

impl Notice {
    fn of(sup: &EntrySupervisor) -> Self {
        Self {
            status: sup.status(),
            revision: sup.revision(),
            subscribers: sup.subscribers(),
        }
    }
}

struct Inner {
    entries: Vec<ConnectionEntry>,
    gates: HashMap<String, DeliveryGate>,
    state: Mutex<ManagerState>,
    probers: ProberRegistry,
    config: ManagerConfig,
    runtime: Handle,
    events_tx: Sender<ConnectionEvent>,
    events_rx: Receiver<ConnectionEvent>,
    next_id: AtomicU64,
}

/// Reconnecting connection manager.
///
/// Cheap to clone; clones share the same registry and tasks.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// Handle for one status callback registration.
///
/// Dropping it keeps the callback registered; call [`Subscription::unsubscribe`].
#[must_use = "call unsubscribe() to remove the callback"]
pub struct Subscription {
    inner: Weak<Inner>,
    id: String,
    key: u64,
}

impl Subscription {
    /// Entry the callback is registered on
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remove the callback; it is never invoked afterwards
    pub fn unsubscribe(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        if let Some(sup) = state.supervisors.get_mut(&self.id) {
            sup.unsubscribe(self.key);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

impl ConnectionManager {
    /// Build a manager over a fixed registry. Entries with a duplicate id are
    /// ignored; the first registration wins.
    pub fn new(
        entries: impl IntoIterator<Item = ConnectionEntry>,
        probers: ProberRegistry,
        config: ManagerConfig,
    ) -> Self {
        let mut registered = Vec::new();
        let mut supervisors = HashMap::new();
        let mut gates = HashMap::new();
        for entry in entries {
            if supervisors.contains_key(&entry.id) {
                tracing::warn!("Ignoring duplicate connection '{}'", entry.id);
                continue;
            }
            if !probers.contains(entry.transport) {
                tracing::warn!(
                    "No prober for {} ({}), probes will fail",
                    entry.id,
                    entry.transport
                );
            }
            gates.insert(entry.id.clone(), ReentrantMutex::new(Cell::new(0)));
            supervisors.insert(entry.id.clone(), EntrySupervisor::new(entry.clone()));
            registered.push(entry);
        }

        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                entries: registered,
                gates,
                state: Mutex::new(ManagerState {
                    supervisors,
                    sweep: None,
                    startup: Vec::new(),
                    running: false,
                    stopped: false,
                }),
                probers,
                config,
                runtime: runtime_handle(),
                events_tx,
                events_rx,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    // ==================== Lifecycle ====================

    /// Issue staggered first attempts and start the periodic sweep
    pub fn start(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.running {
            tracing::debug!("Connection manager already running");
            return;
        }
        state.running = true;
        state.stopped = false;

        for (index, entry) in inner.entries.iter().enumerate() {
            let delay = inner
                .config
                .startup_stagger
                .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
            let weak = Arc::downgrade(inner);
            let id = entry.id.clone();
            state.startup.push(inner.runtime.spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Some(inner) = weak.upgrade() {
                    inner.spawn_attempt(id, Trigger::Scheduled);
                }
            }));
        }

        let period = inner.config.health_check_interval.max(Duration::from_millis(1));
        let weak = Arc::downgrade(inner);
        state.sweep = Some(inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                tracing::debug!("Running health-check sweep");
                let runtime = inner.runtime.clone();
                runtime.spawn(async move { inner.health_check().await });
            }
        }));

        tracing::info!(
            "Connection manager started ({} entries, sweep every {}s)",
            inner.entries.len(),
            period.as_secs()
        );
    }

    /// Cancel the sweep, pending startup attempts, and every retry task.
    ///
    /// Probes already in flight finish and still report their result.
    pub fn stop(&self) {
        let cancelled = {
            let mut state = self.inner.state.lock();
            state.running = false;
            state.stopped = true;
            state.abort_tasks()
        };
        tracing::info!(
            "Connection manager stopped ({} pending retries cancelled)",
            cancelled
        );
    }

    /// Whether `start()` ran and no `stop()` followed
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Single entry point for environment signals
    pub fn handle(&self, event: ManagerEvent) {
        tracing::debug!("Handling {:?}", event);
        match event {
            ManagerEvent::Offline => self.inner.mark_offline(),
            ManagerEvent::Online => {
                let ids = self.inner.entries.iter().map(|e| e.id.clone());
                for id in ids {
                    self.inner.spawn_attempt(id, Trigger::Manual);
                }
            }
            ManagerEvent::Visible => {
                let inner = self.inner.clone();
                self.inner
                    .runtime
                    .spawn(async move { inner.health_check().await });
            }
            ManagerEvent::Teardown => self.stop(),
        }
    }

    // ==================== Commands ====================

    /// Probe one entry now. Returns whether it ended up connected; an
    /// unknown id is logged and yields `false`.
    pub async fn connect(&self, id: &str) -> bool {
        self.inner.attempt(id, Trigger::Manual).await
    }

    /// Cancel the pending retry of an entry and probe it immediately
    pub async fn force_reconnect(&self, id: &str) -> bool {
        tracing::info!("Manual reconnect requested for '{}'", id);
        self.inner.attempt(id, Trigger::Manual).await
    }

    /// Cancel every pending retry and probe all entries concurrently
    pub async fn force_reconnect_all(&self) {
        tracing::info!("Manual reconnect requested for all connections");
        let attempts: Vec<_> = self
            .inner
            .entries
            .iter()
            .filter_map(|e| self.inner.begin_attempt(&e.id, Trigger::Manual))
            .collect();
        join_all(attempts.into_iter().map(|entry| self.inner.run_attempt(entry))).await;
    }

    /// Re-probe every entry that is not currently connecting
    pub async fn health_check(&self) {
        self.inner.health_check().await;
    }

    // ==================== Subscriptions ====================

    /// Register a callback invoked with every status change of `id`.
    ///
    /// Callbacks run in registration order; a panicking callback is logged
    /// and does not affect the others.
    #[must_use = "call unsubscribe() on the subscription to remove the callback"]
    pub fn on_connection_change(
        &self,
        id: &str,
        callback: impl Fn(ConnectionStatus) + Send + Sync + 'static,
    ) -> Option<Subscription> {
        let key = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.state.lock();
        let Some(sup) = state.supervisors.get_mut(id) else {
            tracing::warn!("Cannot subscribe to unknown connection '{}'", id);
            return None;
        };
        sup.subscribe(key, Arc::new(callback));
        Some(Subscription {
            inner: Arc::downgrade(&self.inner),
            id: id.to_string(),
            key,
        })
    }

    /// Every status change of every entry
    pub fn events(&self) -> Receiver<ConnectionEvent> {
        self.inner.events_rx.clone()
    }

    // ==================== Queries ====================

    /// Current status of `id`; `None` for an unknown id
    pub fn connection_status(&self, id: &str) -> Option<ConnectionStatus> {
        self.inner.state.lock().supervisors.get(id).map(|s| s.status())
    }

    /// Statuses in registration order
    pub fn all_connection_statuses(&self) -> Vec<(String, ConnectionStatus)> {
        let state = self.inner.state.lock();
        self.inner
            .entries
            .iter()
            .filter_map(|e| {
                state
                    .supervisors
                    .get(&e.id)
                    .map(|s| (e.id.clone(), s.status()))
            })
            .collect()
    }

    /// Whether `id` is `connected`; `false` for an unknown id
    pub fn is_connected(&self, id: &str) -> bool {
        self.connection_status(id)
            .is_some_and(|status| status.is_connected())
    }

    /// Whether at least one entry is `connected`
    pub fn is_any_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .supervisors
            .values()
            .any(|s| s.status().is_connected())
    }

    /// Status and diagnostics of `id`
    pub fn snapshot(&self, id: &str) -> Option<ConnectionSnapshot> {
        self.inner
            .state
            .lock()
            .supervisors
            .get(id)
            .map(|s| s.snapshot().clone())
    }

    /// Snapshots in registration order
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        let state = self.inner.state.lock();
        self.inner
            .entries
            .iter()
            .filter_map(|e| state.supervisors.get(&e.id).map(|s| s.snapshot().clone()))
            .collect()
    }

    /// Registered entries in registration order
    pub fn entries(&self) -> &[ConnectionEntry] {
        &self.inner.entries
    }

    /// Delay a failed attempt of `id` waits before its retry
    pub fn retry_delay(&self, id: &str) -> Option<Duration> {
        self.inner
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| self.inner.config.backoff.delay_for(e.max_retry_attempts))
    }

    /// Whether a retry timer is scheduled for `id`
    pub fn has_pending_retry(&self, id: &str) -> bool {
        self.inner
            .state
            .lock()
            .supervisors
            .get(id)
            .is_some_and(|s| s.has_pending_retry())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionManager")
            .field("running", &state.running)
            .field("supervisors", &state.supervisors)
            .field("probers", &self.inner.probers)
            .finish()
    }
}

impl Inner {
    async fn attempt(self: &Arc<Self>, id: &str, trigger: Trigger) -> bool {
        match self.begin_attempt(id, trigger) {
            Some(entry) => self.run_attempt(entry).await,
            None => false,
        }
    }

    /// Run an attempt on its own task so callers never wait on a probe
    fn spawn_attempt(self: &Arc<Self>, id: String, trigger: Trigger) {
        if let Some(entry) = self.begin_attempt(&id, trigger) {
            let inner = self.clone();
            self.runtime.spawn(async move {
                inner.run_attempt(entry).await;
            });
        }
    }

    /// Cancel the pending retry and mark the entry `connecting`
    fn begin_attempt(&self, id: &str, trigger: Trigger) -> Option<ConnectionEntry> {
        let Some(gate) = self.gates.get(id) else {
            tracing::warn!("Connect requested for unknown connection '{}'", id);
            return None;
        };
        let delivered = gate.lock();

        let (entry, notice) = {
            let mut state = self.state.lock();
            let sup = state.supervisors.get_mut(id)?;
            if trigger == Trigger::Scheduled && sup.status() == ConnectionStatus::Connecting {
                tracing::debug!("Skipping '{}', attempt already in flight", id);
                return None;
            }
            sup.cancel_pending();
            let changed = sup.set_status(ConnectionStatus::Connecting);
            (sup.entry().clone(), changed.then(|| Notice::of(sup)))
        };

        if let Some(notice) = notice {
            self.publish(id, &delivered, notice, "Connecting");
        }
        Some(entry)
    }

    async fn run_attempt(self: &Arc<Self>, entry: ConnectionEntry) -> bool {
        let result = match self.probers.get(entry.transport) {
            Some(prober) => {
                let timeout = entry.timeout();
                match tokio::time::timeout(timeout, prober.probe(&entry)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout { after: timeout }),
                }
            }
            None => Err(ProbeError::MissingProber {
                transport: entry.transport,
            }),
        };

        match result {
            Ok(()) => {
                self.on_success(&entry);
                true
            }
            Err(error) => {
                self.on_failure(&entry, error);
                false
            }
        }
    }

    fn on_success(&self, entry: &ConnectionEntry) {
        let Some(gate) = self.gates.get(&entry.id) else {
            return;
        };
        let delivered = gate.lock();

        let notice = {
            let mut state = self.state.lock();
            let Some(sup) = state.supervisors.get_mut(&entry.id) else {
                return;
            };
            sup.cancel_pending();
            sup.record_success();
            sup.set_status(ConnectionStatus::Connected)
                .then(|| Notice::of(sup))
        };

        match notice {
            Some(notice) => {
                tracing::info!("{}: Connected", entry.display_name);
                self.publish(&entry.id, &delivered, notice, "Connected");
            }
            None => tracing::debug!("{}: Still connected", entry.display_name),
        }
    }

    fn on_failure(self: &Arc<Self>, entry: &ConnectionEntry, error: ProbeError) {
        let message = error.to_string();
        let delay = self.config.backoff.delay_for(entry.max_retry_attempts);
        let Some(gate) = self.gates.get(&entry.id) else {
            return;
        };
        let delivered = gate.lock();

        let (notice, retrying) = {
            let mut state = self.state.lock();
            let retrying = !state.stopped;
            let Some(sup) = state.supervisors.get_mut(&entry.id) else {
                return;
            };
            sup.record_failure(message.clone());
            let changed = sup.set_status(ConnectionStatus::Error);
            if retrying {
                sup.replace_retry(self.schedule_retry(&entry.id, delay));
            }
            (changed.then(|| Notice::of(sup)), retrying)
        };

        let detail = if retrying {
            tracing::warn!(
                "{}: {} (retrying in {}ms)",
                entry.display_name,
                message,
                delay.as_millis()
            );
            format!("{}; retrying in {}s", message, delay.as_secs())
        } else {
            tracing::warn!("{}: {}", entry.display_name, message);
            message
        };

        if let Some(notice) = notice {
            self.publish(&entry.id, &delivered, notice, &detail);
        }
    }

    /// One-shot retry timer. When it fires it drops its own handle, then
    /// runs a scheduled attempt.
    fn schedule_retry(self: &Arc<Self>, id: &str, delay: Duration) -> ScheduledTask {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);
        let id = id.to_string();
        tracing::debug!("Retry {} for '{}' in {}ms", task_id, id, delay.as_millis());

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            let current = inner
                .state
                .lock()
                .supervisors
                .get_mut(&id)
                .is_some_and(|sup| sup.release_retry(task_id));
            if current {
                inner.attempt(&id, Trigger::Scheduled).await;
            }
        });
        ScheduledTask::new(task_id, handle)
    }

    /// Networked entries become `disconnected` without waiting for probes
    /// in flight; their results still land afterwards
    fn mark_offline(&self) {
        let mut marked = 0;
        for entry in self.entries.iter().filter(|e| e.transport.is_networked()) {
            let Some(gate) = self.gates.get(&entry.id) else {
                continue;
            };
            let delivered = gate.lock();
            let notice = {
                let mut state = self.state.lock();
                state.supervisors.get_mut(&entry.id).and_then(|sup| {
                    sup.set_status(ConnectionStatus::Disconnected)
                        .then(|| Notice::of(sup))
                })
            };
            if let Some(notice) = notice {
                marked += 1;
                self.publish(&entry.id, &delivered, notice, "Offline");
            }
        }
        tracing::warn!("Network offline, {} connections marked disconnected", marked);
    }

    async fn health_check(self: &Arc<Self>) {
        let due: Vec<_> = self
            .entries
            .iter()
            .filter_map(|e| self.begin_attempt(&e.id, Trigger::Scheduled))
            .collect();
        join_all(due.into_iter().map(|entry| self.run_attempt(entry))).await;
    }

    /// Deliver a status change to the event channel, then to callbacks.
    ///
    /// Runs with the entry's gate held. A callback that changes the same
    /// entry again re-enters the gate; the newer change is delivered in full
    /// and the rest of this one is dropped as stale.
    fn publish(&self, id: &str, delivered: &Cell<u64>, notice: Notice, detail: &str) {
        let Notice {
            status,
            revision,
            subscribers,
        } = notice;
        delivered.set(revision);

        let event = ConnectionEvent {
            id: id.into(),
            status,
            detail: detail.into(),
        };
        if let Err(TrySendError::Full(event)) = self.events_tx.try_send(event) {
            tracing::trace!("Event channel full, dropping {:?}", event);
        }

        for subscriber in &subscribers {
            if delivered.get() != revision {
                tracing::debug!("'{}' changed again during delivery of {}", id, status);
                return;
            }
            if catch_unwind(AssertUnwindSafe(|| subscriber.notify(status))).is_err() {
                tracing::error!("Status callback for '{}' panicked on {}", id, status);
            }
        }
    }
}
