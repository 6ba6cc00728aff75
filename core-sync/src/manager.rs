//! # Sync Queue Manager
//!
//! Durable queue of mutations that could not reach the backend, replayed
//! when connectivity returns.
//!
//! ## Replay Rules
//!
//! - A drain works on a snapshot taken when it starts. Tasks enqueued while
//!   it runs are durable but wait for the next drain.
//! - Only one drain runs at a time. A second call while one is in flight
//!   returns immediately with [`DrainReport::skipped`] set.
//! - A success removes the task from durable storage before the next task
//!   is attempted.
//! - A failure increments `attempt_count`. At `max_attempts` the task moves
//!   to the dead-letter list; otherwise it stays queued.
//! - After a failure of kind K, the remaining snapshot tasks of kind K are
//!   deferred untouched, so a later operation never overtakes an earlier one
//!   of the same kind.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = SyncQueueManager::new(config, kv, backend, connectivity, event_bus, clock)?;
//! manager.load().await?;
//! let trigger = manager.start();
//!
//! match manager.submit(operation).await? {
//!     SubmitOutcome::Applied => {}
//!     SubmitOutcome::Queued(task_id) => show_pending_badge(manager.pending_count()),
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::{Clock, KeyValueStore};
use core_runtime::connectivity::ConnectivityMonitor;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{dispatch, ApplyError, SyncBackend};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::store::QueueStore;
use crate::task::{DeadLetter, SyncOperation, SyncTask, SyncTaskId, SyncTaskKind};

/// Summary of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Another drain was already running; nothing was attempted
    pub skipped: bool,
    pub snapshot_size: usize,
    pub applied: usize,
    /// Failed and left queued with an incremented attempt count
    pub retried: usize,
    /// Failed for the last allowed time and moved to the dead-letter list
    pub dropped: usize,
    /// Not attempted because an earlier task of the same kind failed
    pub deferred: usize,
    /// Queue length when the drain finished
    pub remaining: usize,
}

impl DrainReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Result of [`SyncQueueManager::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The backend accepted the operation right away
    Applied,
    /// The operation was durably queued for replay
    Queued(SyncTaskId),
}

enum FailureOutcome {
    Retry(SyncTask),
    Dropped(SyncTask),
    /// Removed concurrently (e.g. by `clear`)
    Gone,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<SyncTask>,
    dead_letters: Vec<DeadLetter>,
    /// Set once the mirror reflects durable storage
    loaded: bool,
}

/// Resets the in-progress flag when a drain ends, including on early return.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Inner {
    config: SyncConfig,
    store: QueueStore,
    backend: Arc<dyn SyncBackend>,
    connectivity: ConnectivityMonitor,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    /// Authoritative in-memory mirror; the lock also serializes durable writes.
    state: Mutex<QueueState>,
    pending_len: AtomicUsize,
    draining: AtomicBool,
}

/// Pending-operation queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct SyncQueueManager {
    inner: Arc<Inner>,
}

impl SyncQueueManager {
    pub fn new(
        config: SyncConfig,
        kv: Arc<dyn KeyValueStore>,
        backend: Arc<dyn SyncBackend>,
        connectivity: ConnectivityMonitor,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let store = QueueStore::new(kv, config.pending_key.clone(), config.dead_letter_key.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                backend,
                connectivity,
                event_bus,
                clock,
                state: Mutex::new(QueueState::default()),
                pending_len: AtomicUsize::new(0),
                draining: AtomicBool::new(false),
            }),
        })
    }

    /// Rehydrate the in-memory mirror from durable storage.
    ///
    /// Returns the number of pending tasks found.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<usize> {
        let mut state = self.inner.state.lock().await;
        self.rehydrate(&mut state).await?;
        Ok(state.pending.len())
    }

    /// Lock the mirror, rehydrating it first if nothing has loaded it yet.
    ///
    /// Every queue mutation goes through here so a write never replaces
    /// durable tasks the mirror has not seen.
    async fn state(&self) -> Result<MutexGuard<'_, QueueState>> {
        let mut state = self.inner.state.lock().await;
        if !state.loaded {
            self.rehydrate(&mut state).await?;
        }
        Ok(state)
    }

    async fn rehydrate(&self, state: &mut QueueState) -> Result<()> {
        let pending = self.inner.store.load_pending().await?;
        let dead_letters = match self.inner.store.load_dead_letters().await {
            Ok(letters) => letters,
            Err(e) => {
                warn!(error = %e, "Dead-letter list unreadable, starting empty");
                Vec::new()
            }
        };

        state.pending = pending;
        state.dead_letters = dead_letters;
        state.loaded = true;
        let count = self.publish_len(state);

        info!(pending = count, dead_letters = state.dead_letters.len(), "Loaded pending queue");
        Ok(())
    }

    /// Durably append an operation.
    ///
    /// When online, a drain is spawned in the background; the caller never
    /// waits on it.
    ///
    /// # Errors
    ///
    /// `SyncError::Storage` if the queue could not be persisted. The
    /// operation is not queued in that case.
    #[instrument(skip(self, operation), fields(kind = %operation.kind()))]
    pub async fn enqueue(&self, operation: SyncOperation) -> Result<SyncTaskId> {
        let task = SyncTask::new(operation, self.inner.clock.now());
        let task_id = task.id;
        let kind = task.kind();

        let pending = {
            let mut state = self.state().await?;
            let mut next = state.pending.clone();
            next.push(task);
            self.inner.store.save_pending(&next).await?;
            state.pending = next;
            self.publish_len(&state)
        };

        info!(task_id = %task_id, pending, "Operation queued");
        self.emit(SyncEvent::TaskEnqueued {
            task_id: task_id.to_string(),
            kind: kind.to_string(),
            pending,
        });

        if self.inner.connectivity.is_online() {
            self.spawn_drain();
        }

        Ok(task_id)
    }

    /// Try the backend now; queue on connectivity failure.
    ///
    /// Goes straight to the queue when offline, or when an earlier operation
    /// of the same kind is still pending (so this one cannot overtake it).
    ///
    /// # Errors
    ///
    /// - `SyncError::Rejected` when the backend refuses the operation; it is not queued
    /// - `SyncError::Storage` when queueing was needed but failed
    #[instrument(skip(self, operation), fields(kind = %operation.kind()))]
    pub async fn submit(&self, operation: SyncOperation) -> Result<SubmitOutcome> {
        if !self.inner.connectivity.is_online() || self.has_pending_kind(operation.kind()).await? {
            debug!("Submitting through the queue");
            return self.enqueue(operation).await.map(SubmitOutcome::Queued);
        }

        let attempt = tokio::time::timeout(
            self.inner.config.apply_timeout,
            dispatch(self.inner.backend.as_ref(), &operation),
        )
        .await;

        match attempt {
            Ok(Ok(())) => Ok(SubmitOutcome::Applied),
            Ok(Err(ApplyError::Rejected(message))) => {
                warn!(message = %message, "Backend rejected operation");
                Err(SyncError::Rejected(message))
            }
            Ok(Err(ApplyError::Network(message))) => {
                info!(message = %message, "Backend unreachable, queueing operation");
                self.enqueue(operation).await.map(SubmitOutcome::Queued)
            }
            Err(_) => {
                info!("Backend timed out, queueing operation");
                self.enqueue(operation).await.map(SubmitOutcome::Queued)
            }
        }
    }

    /// Replay a snapshot of the queue against the backend.
    ///
    /// # Errors
    ///
    /// `SyncError::Storage` if a queue mutation could not be persisted. The
    /// drain stops there; tasks already handled keep their new state.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport> {
        let Some(_guard) = DrainGuard::acquire(&self.inner.draining) else {
            debug!("Drain already in progress");
            return Ok(DrainReport::skipped());
        };

        let snapshot = self.state().await?.pending.clone();
        let mut report = DrainReport {
            snapshot_size: snapshot.len(),
            ..DrainReport::default()
        };

        if snapshot.is_empty() {
            return Ok(report);
        }

        info!(snapshot_size = snapshot.len(), "Draining pending queue");
        self.emit(SyncEvent::DrainStarted {
            snapshot_size: snapshot.len(),
        });

        let mut blocked: HashSet<SyncTaskKind> = HashSet::new();

        for task in snapshot {
            let kind = task.kind();
            if blocked.contains(&kind) {
                debug!(task_id = %task.id, kind = %kind, "Deferred behind earlier failure");
                report.deferred += 1;
                continue;
            }

            let attempt = tokio::time::timeout(
                self.inner.config.apply_timeout,
                dispatch(self.inner.backend.as_ref(), &task.operation),
            )
            .await;

            let failure = match attempt {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!(
                    "Apply timed out after {:?}",
                    self.inner.config.apply_timeout
                )),
            };

            match failure {
                None => {
                    self.remove_applied(task.id).await?;
                    report.applied += 1;
                    debug!(task_id = %task.id, kind = %kind, "Applied queued operation");
                    self.emit(SyncEvent::TaskApplied {
                        task_id: task.id.to_string(),
                        kind: kind.to_string(),
                    });
                }
                Some(message) => {
                    blocked.insert(kind);
                    match self.record_failure(task.id, message.clone()).await? {
                        FailureOutcome::Retry(updated) => {
                            report.retried += 1;
                            debug!(
                                task_id = %updated.id,
                                attempt_count = updated.attempt_count,
                                error = %message,
                                "Queued operation failed, will retry"
                            );
                            self.emit(SyncEvent::TaskRetryScheduled {
                                task_id: updated.id.to_string(),
                                kind: kind.to_string(),
                                attempt_count: updated.attempt_count,
                                message,
                            });
                        }
                        FailureOutcome::Dropped(dropped) => {
                            report.dropped += 1;
                            warn!(
                                task_id = %dropped.id,
                                kind = %kind,
                                attempt_count = dropped.attempt_count,
                                enqueued_at = %dropped.enqueued_at,
                                error = %message,
                                "Dropping queued operation after max retries"
                            );
                            self.emit(SyncEvent::TaskDropped {
                                task_id: dropped.id.to_string(),
                                kind: kind.to_string(),
                                attempt_count: dropped.attempt_count,
                                message,
                            });
                        }
                        FailureOutcome::Gone => {}
                    }
                }
            }
        }

        report.remaining = self.pending_count();
        info!(
            applied = report.applied,
            retried = report.retried,
            dropped = report.dropped,
            deferred = report.deferred,
            remaining = report.remaining,
            "Drain finished"
        );
        self.emit(SyncEvent::DrainCompleted {
            applied: report.applied,
            retried: report.retried,
            dropped: report.dropped,
            deferred: report.deferred,
            pending: report.remaining,
        });

        Ok(report)
    }

    /// Number of queued tasks, read without waiting on any lock.
    ///
    /// Reads 0 until the first `load` or queue operation has rehydrated the
    /// mirror from storage.
    pub fn pending_count(&self) -> usize {
        self.inner.pending_len.load(Ordering::SeqCst)
    }

    pub async fn pending_tasks(&self) -> Result<Vec<SyncTask>> {
        Ok(self.state().await?.pending.clone())
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.state().await?.dead_letters.clone())
    }

    /// Discard every pending task. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<usize> {
        let removed = {
            let mut state = self.state().await?;
            self.inner.store.save_pending(&[]).await?;
            let removed = state.pending.len();
            state.pending.clear();
            self.publish_len(&state);
            removed
        };

        info!(removed, "Cleared pending queue");
        self.emit(SyncEvent::QueueCleared { removed });
        Ok(removed)
    }

    pub async fn clear_dead_letters(&self) -> Result<usize> {
        let mut state = self.state().await?;
        self.inner.store.save_dead_letters(&[]).await?;
        let removed = state.dead_letters.len();
        state.dead_letters.clear();
        debug!(removed, "Cleared dead letters");
        Ok(removed)
    }

    /// Spawn the background drain triggers.
    ///
    /// - a drain on every offline→online transition
    /// - a drain right away if online with pending work (`drain_on_start`)
    /// - a periodic drain while online (`drain_interval`)
    ///
    /// Triggers stop when the returned handle is stopped or dropped.
    pub fn start(&self) -> SyncTrigger {
        let token = CancellationToken::new();
        let mut handles = Vec::new();

        let manager = self.clone();
        let cancel = token.clone();
        handles.push(tokio::spawn(async move {
            manager.follow_connectivity(cancel).await;
        }));

        if let Some(interval) = self.inner.config.drain_interval {
            let manager = self.clone();
            let cancel = token.clone();
            handles.push(tokio::spawn(async move {
                manager.drain_periodically(interval, cancel).await;
            }));
        }

        SyncTrigger { token, handles }
    }

    async fn follow_connectivity(&self, cancel: CancellationToken) {
        let mut changes = self.inner.connectivity.subscribe();
        let mut was_online = *changes.borrow_and_update();

        if was_online && self.inner.config.drain_on_start && self.pending_count() > 0 {
            self.drain_logged().await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *changes.borrow_and_update();
                    if online && !was_online {
                        info!(pending = self.pending_count(), "Connectivity restored, draining queue");
                        self.drain_logged().await;
                    }
                    was_online = online;
                }
            }
        }
        debug!("Connectivity drain trigger stopped");
    }

    async fn drain_periodically(&self, interval: std::time::Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.inner.connectivity.is_online() && self.pending_count() > 0 {
                        self.drain_logged().await;
                    }
                }
            }
        }
        debug!("Periodic drain trigger stopped");
    }

    async fn drain_logged(&self) {
        if let Err(e) = self.drain().await {
            error!(error = %e, "Queue drain failed");
        }
    }

    fn spawn_drain(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.drain_logged().await;
        });
    }

    async fn has_pending_kind(&self, kind: SyncTaskKind) -> Result<bool> {
        Ok(self
            .state()
            .await?
            .pending
            .iter()
            .any(|task| task.kind() == kind))
    }

    async fn remove_applied(&self, task_id: SyncTaskId) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.pending.iter().any(|t| t.id == task_id) {
            return Ok(());
        }

        let next: Vec<SyncTask> = state
            .pending
            .iter()
            .filter(|t| t.id != task_id)
            .cloned()
            .collect();
        self.inner.store.save_pending(&next).await?;
        state.pending = next;
        self.publish_len(&state);
        Ok(())
    }

    async fn record_failure(&self, task_id: SyncTaskId, message: String) -> Result<FailureOutcome> {
        let mut state = self.inner.state.lock().await;
        let Some(position) = state.pending.iter().position(|t| t.id == task_id) else {
            return Ok(FailureOutcome::Gone);
        };

        let mut next = state.pending.clone();
        next[position].attempt_count += 1;
        next[position].last_error = Some(message);

        if next[position].attempt_count < self.inner.config.max_attempts {
            self.inner.store.save_pending(&next).await?;
            let updated = next[position].clone();
            state.pending = next;
            return Ok(FailureOutcome::Retry(updated));
        }

        let dropped = next.remove(position);
        self.inner.store.save_pending(&next).await?;
        state.pending = next;
        self.publish_len(&state);

        let mut letters = state.dead_letters.clone();
        letters.push(DeadLetter {
            task: dropped.clone(),
            dropped_at: self.inner.clock.now(),
        });
        if let Err(e) = self.inner.store.save_dead_letters(&letters).await {
            error!(task_id = %dropped.id, error = %e, "Failed to persist dead letter");
        }
        state.dead_letters = letters;

        Ok(FailureOutcome::Dropped(dropped))
    }

    fn publish_len(&self, state: &QueueState) -> usize {
        let len = state.pending.len();
        self.inner.pending_len.store(len, Ordering::SeqCst);
        len
    }

    fn emit(&self, event: SyncEvent) {
        self.inner.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

/// Handle for the background drain triggers started by
/// [`SyncQueueManager::start`].
pub struct SyncTrigger {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SyncTrigger {
    /// Signal the triggers to stop without waiting for them.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop the triggers and wait for an in-flight drain to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Drain trigger task ended abnormally");
            }
        }
    }
}

impl Drop for SyncTrigger {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{FavoriteToggle, WatchProgressUpdate};
    use async_trait::async_trait;
    use bridge_traits::{MemoryKeyValueStore, SystemClock};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Backend that answers from a script and records call order.
    #[derive(Default)]
    struct ScriptedBackend {
        script: SyncMutex<VecDeque<std::result::Result<(), ApplyError>>>,
        calls: SyncMutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn with_script(results: Vec<std::result::Result<(), ApplyError>>) -> Self {
            Self {
                script: SyncMutex::new(results.into()),
                ..Self::default()
            }
        }

        async fn answer(&self, label: String) -> std::result::Result<(), ApplyError> {
            self.calls.lock().push(label);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    #[async_trait]
    impl SyncBackend for ScriptedBackend {
        async fn apply_favorite_toggle(
            &self,
            payload: &FavoriteToggle,
        ) -> std::result::Result<(), ApplyError> {
            self.answer(format!("fav:{}", payload.content_id)).await
        }

        async fn apply_watch_progress(
            &self,
            payload: &WatchProgressUpdate,
        ) -> std::result::Result<(), ApplyError> {
            self.answer(format!("progress:{}", payload.content_id)).await
        }

        async fn create_rental(
            &self,
            payload: &crate::task::RentalCreate,
        ) -> std::result::Result<(), ApplyError> {
            self.answer(format!("rental:{}", payload.content_id)).await
        }

        async fn record_wallet_transaction(
            &self,
            payload: &crate::task::WalletTransaction,
        ) -> std::result::Result<(), ApplyError> {
            self.answer(format!("wallet:{}", payload.idempotency_key)).await
        }
    }

    fn favorite(content_id: &str) -> SyncOperation {
        SyncOperation::FavoriteToggle(FavoriteToggle {
            user_id: "u1".to_string(),
            content_id: content_id.to_string(),
            favorited: true,
        })
    }

    fn progress(content_id: &str) -> SyncOperation {
        SyncOperation::WatchProgressUpdate(WatchProgressUpdate {
            user_id: "u1".to_string(),
            content_id: content_id.to_string(),
            position_seconds: 120,
            duration_seconds: Some(5400),
            completed: false,
        })
    }

    fn manager(
        backend: Arc<ScriptedBackend>,
        online: bool,
    ) -> (SyncQueueManager, Arc<MemoryKeyValueStore>, ConnectivityMonitor) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let connectivity = ConnectivityMonitor::new(online, EventBus::default());
        let manager = SyncQueueManager::new(
            SyncConfig::default().with_apply_timeout(Duration::from_millis(200)),
            kv.clone(),
            backend,
            connectivity.clone(),
            EventBus::default(),
            Arc::new(SystemClock),
        )
        .unwrap();
        (manager, kv, connectivity)
    }

    #[tokio::test]
    async fn test_enqueue_offline_persists_without_draining() {
        let backend = Arc::new(ScriptedBackend::default());
        let (manager, kv, _) = manager(backend.clone(), false);

        manager.enqueue(favorite("1")).await.unwrap();
        manager.enqueue(favorite("2")).await.unwrap();

        assert_eq!(manager.pending_count(), 2);
        assert!(kv.get("sync_queue.pending").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_storage_failure_is_error() {
        let backend = Arc::new(ScriptedBackend::default());
        let (manager, kv, _) = manager(backend, false);
        kv.set_fail_writes(true);

        assert!(matches!(
            manager.enqueue(favorite("1")).await,
            Err(SyncError::Storage(_))
        ));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_applies_and_removes() {
        let backend = Arc::new(ScriptedBackend::default());
        let (manager, kv, _) = manager(backend.clone(), false);

        manager.enqueue(favorite("1")).await.unwrap();
        manager.enqueue(progress("1")).await.unwrap();

        let report = manager.drain().await.unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.remaining, 0);
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(kv.get("sync_queue.pending").await.unwrap(), None);
        assert_eq!(*backend.calls.lock(), vec!["fav:1", "progress:1"]);
    }

    #[tokio::test]
    async fn test_failure_defers_later_tasks_of_same_kind() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![
            Err(ApplyError::Network("offline".into())),
            Ok(()),
        ]));
        let (manager, _, _) = manager(backend.clone(), false);

        manager.enqueue(favorite("A")).await.unwrap();
        manager.enqueue(favorite("B")).await.unwrap();
        manager.enqueue(progress("C")).await.unwrap();

        let report = manager.drain().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(*backend.calls.lock(), vec!["fav:A", "progress:C"]);

        let pending = manager.pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attempt_count, 1);
        assert_eq!(pending[1].attempt_count, 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedBackend::default()
        });
        let (manager, _, _) = manager(backend, false);
        manager.enqueue(favorite("1")).await.unwrap();

        let report = manager.drain().await.unwrap();
        assert_eq!(report.retried, 1);
        let task = &manager.pending_tasks().await.unwrap()[0];
        assert!(task.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_skipped() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_millis(100)),
            ..ScriptedBackend::default()
        });
        let (manager, _, _) = manager(backend.clone(), false);
        manager.enqueue(favorite("1")).await.unwrap();

        let (first, second) = tokio::join!(manager.drain(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            manager.drain().await
        });

        assert_eq!(first.unwrap().applied, 1);
        assert!(second.unwrap().skipped);
        assert_eq!(backend.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let backend = Arc::new(ScriptedBackend::default());
        let (manager, kv, _) = manager(backend, false);
        manager.enqueue(favorite("1")).await.unwrap();
        manager.enqueue(progress("2")).await.unwrap();

        assert_eq!(manager.clear().await.unwrap(), 2);
        assert_eq!(manager.pending_count(), 0);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejected_is_not_queued() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![Err(ApplyError::Rejected(
            "insufficient balance".into(),
        ))]));
        let (manager, _, _) = manager(backend, true);

        let result = manager.submit(favorite("1")).await;
        assert!(matches!(result, Err(SyncError::Rejected(_))));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_queues_behind_pending_same_kind() {
        let backend = Arc::new(ScriptedBackend::default());
        let (manager, _, connectivity) = manager(backend.clone(), false);
        manager.enqueue(favorite("old")).await.unwrap();

        connectivity.set_online(true);
        // Another drain may be spawned by enqueue below; the outcome must still be Queued.
        let outcome = manager.submit(favorite("new")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued(_)));
    }

    #[tokio::test]
    async fn test_load_rehydrates_mirror() {
        let backend = Arc::new(ScriptedBackend::default());
        let (first, kv, _) = manager(backend.clone(), false);
        first.enqueue(favorite("1")).await.unwrap();

        let second = SyncQueueManager::new(
            SyncConfig::default(),
            kv,
            backend,
            ConnectivityMonitor::new(false, EventBus::default()),
            EventBus::default(),
            Arc::new(SystemClock),
        )
        .unwrap();
        assert_eq!(second.pending_count(), 0);
        assert_eq!(second.load().await.unwrap(), 1);
        assert_eq!(second.pending_count(), 1);
    }
}
