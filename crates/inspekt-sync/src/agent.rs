//! # Sync Agent
//!
//! Drains the offline action queue against the remote and keeps the
//! foreground-visible [`SyncStatus`] projection current.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Run Loop                               │
//! │                                                                         │
//! │  TRIGGERS                                  drain()                      │
//! │  ────────                                  ───────                      │
//! │  WakeRequest (enqueue) ──┐                 1. offline? SYNC_ERROR, stop │
//! │    deferred while offline│                 2. staleness sweep, eligible │
//! │  SYNC_NOW ───────────────┼──► drain() ──►  3. SYNC_STARTED{count}       │
//! │  offline → online ───────┘                 4. per action, in order:     │
//! │                                               processing → replay →     │
//! │  housekeeping tick ──► clear completed,       completed / failed(+1)    │
//! │                        evict blobs,        5. clear completed           │
//! │                        recover stale       6. SYNC_COMPLETED, status    │
//! │                                                                         │
//! │  At most one drain runs at a time; an overlapping trigger returns      │
//! │  DrainOutcome::AlreadyRunning without touching the queue.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use inspekt_core::{ActionPatch, SyncSession, SyncStatus, WorkerEvent};
use inspekt_db::Database;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::engine::CacheEngine;
use crate::error::{SyncError, SyncResult};
use crate::network::Fetcher;
use crate::queue::WakeRequest;
use crate::replay::{ActionReplayer, HttpReplayer};

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives every event broadcast to foreground pages.
pub trait SyncEventEmitter: Send + Sync {
    fn emit(&self, event: &WorkerEvent);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit(&self, _event: &WorkerEvent) {}
}

// =============================================================================
// Drain Outcome
// =============================================================================

/// How a drain request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was running; nothing was done.
    AlreadyRunning,
    /// Offline at drain start; no network calls were made.
    Offline,
    Completed(SyncSession),
}

/// What one housekeeping pass removed or repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub cleared: u64,
    pub evicted_blobs: u64,
    pub recovered: u64,
}

/// Resets the drain flag however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Orchestrates queue drains.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Arc<Database>,
    engine: CacheEngine,
    replayer: Arc<dyn ActionReplayer>,
    connectivity: ConnectivityMonitor,
    emitter: Arc<dyn SyncEventEmitter>,
    status: Arc<RwLock<SyncStatus>>,
    draining: AtomicBool,
}

impl SyncAgent {
    /// Returns the current status projection.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    fn emit(&self, event: WorkerEvent) {
        debug!(event = event.type_name(), "Broadcasting");
        self.emitter.emit(&event);
    }

    async fn broadcast_status(&self) {
        let status = self.status().await;
        self.emit(WorkerEvent::StatusChanged(status));
    }

    /// Recomputes the queue-derived fields and broadcasts the projection.
    pub async fn refresh_status(&self) -> SyncResult<SyncStatus> {
        let pending = self
            .db
            .actions()
            .count_pending(self.config.queue.max_retries)
            .await?;

        let status = {
            let mut s = self.status.write().await;
            s.pending_actions_count = pending;
            s.is_online = self.connectivity.is_online();
            s.clone()
        };

        self.emit(WorkerEvent::StatusChanged(status.clone()));
        Ok(status)
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Replays every eligible action once, oldest first.
    ///
    /// ## Errors
    /// Only store failures abort a drain. Replay failures are recorded on the
    /// action and counted in the session.
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already running");
            return Ok(DrainOutcome::AlreadyRunning);
        }
        let _guard = DrainGuard(&self.draining);

        if !self.connectivity.is_online() {
            let message = SyncError::Offline.to_string();
            info!("Drain skipped, offline");
            {
                let mut s = self.status.write().await;
                s.is_online = false;
                s.last_sync_error = Some(message.clone());
            }
            self.emit(WorkerEvent::SyncError { error: message });
            self.broadcast_status().await;
            return Ok(DrainOutcome::Offline);
        }

        match self.run_drain().await {
            Ok(session) => Ok(DrainOutcome::Completed(session)),
            Err(e) => {
                error!(error = %e, "Drain aborted");
                {
                    let mut s = self.status.write().await;
                    s.is_syncing = false;
                    s.progress = 1.0;
                    s.last_sync_error = Some(e.to_string());
                }
                self.emit(WorkerEvent::SyncError {
                    error: e.to_string(),
                });
                self.broadcast_status().await;
                Err(e)
            }
        }
    }

    async fn run_drain(&self) -> SyncResult<SyncSession> {
        let actions = self.db.actions();
        let max_retries = self.config.queue.max_retries;

        actions
            .recover_stale_processing(self.config.queue.processing_grace())
            .await?;
        let eligible = actions.list_eligible(max_retries).await?;

        let mut session = SyncSession::start(eligible.len());
        {
            let mut s = self.status.write().await;
            s.is_syncing = true;
            s.is_online = true;
            s.progress = session.progress();
        }
        self.broadcast_status().await;

        if session.total > 0 {
            info!(count = session.total, "Sync started");
            self.emit(WorkerEvent::SyncStarted {
                count: session.total,
            });
        }

        for queued in &eligible {
            let id = queued.id;
            let current = match actions.update(id, &ActionPatch::processing()).await {
                Ok(action) => action,
                Err(e) if e.is_not_found() => {
                    // Discarded by the user after the eligibility scan
                    debug!(id, "Action vanished before replay");
                    session.total = session.total.saturating_sub(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match self.replayer.replay(&current).await {
                Ok(receipt) => {
                    actions.update(id, &ActionPatch::completed()).await?;
                    session.success_count += 1;
                    self.engine.invalidate_api(&receipt.invalidates).await;
                    if let Some(ref key) = receipt.uploaded_blob {
                        if let Err(e) = self.db.blobs().delete_blob(key).await {
                            warn!(id, key = %key, error = %e, "Failed to release uploaded blob");
                        }
                    }
                    info!(id, key = %receipt.key, "Action synced");
                    self.emit(WorkerEvent::FormSynced {
                        key: receipt.key,
                        remaining: session.remaining(),
                    });
                }
                Err(e) => {
                    warn!(
                        id,
                        action_type = %current.action_type,
                        retry_count = current.retry_count + 1,
                        error = %e,
                        "Replay failed"
                    );
                    actions
                        .update(id, &ActionPatch::failed(current.retry_count, e.to_string()))
                        .await?;
                    session.failure_count += 1;
                    if e.is_network() {
                        self.connectivity.set_online(false);
                    }
                }
            }

            self.status.write().await.progress = session.progress();
        }

        actions.clear_completed().await?;
        session.finish();

        self.emit(WorkerEvent::SyncCompleted {
            success_count: session.success_count,
            failure_count: session.failure_count,
        });

        let pending = actions.count_pending(max_retries).await?;
        {
            let mut s = self.status.write().await;
            s.is_syncing = false;
            s.progress = 1.0;
            s.pending_actions_count = pending;
            s.is_online = self.connectivity.is_online();
            if session.success_count > 0 || session.failure_count == 0 {
                s.last_synced_at = Some(chrono::Utc::now());
            }
            s.last_sync_error = if session.failure_count > 0 {
                Some(format!(
                    "{} of {} actions failed to sync",
                    session.failure_count, session.total
                ))
            } else {
                None
            };
        }
        self.broadcast_status().await;

        info!(
            success = session.success_count,
            failed = session.failure_count,
            pending,
            "Sync completed"
        );
        Ok(session)
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// Clears completed actions, evicts expired blobs, recovers abandoned
    /// `processing` actions.
    pub async fn housekeeping(&self) -> SyncResult<HousekeepingReport> {
        let actions = self.db.actions();

        let report = HousekeepingReport {
            cleared: actions.clear_completed().await?,
            evicted_blobs: self
                .db
                .blobs()
                .evict_blobs_older_than(self.config.queue.blob_retention())
                .await?,
            recovered: actions
                .recover_stale_processing(self.config.queue.processing_grace())
                .await?,
        };

        if report != HousekeepingReport::default() {
            info!(
                cleared = report.cleared,
                evicted_blobs = report.evicted_blobs,
                recovered = report.recovered,
                "Housekeeping done"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    /// Starts the run loop.
    pub fn spawn(self: Arc<Self>, wake_rx: mpsc::Receiver<WakeRequest>) -> SyncAgentHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = SyncAgentHandle {
            agent: Arc::clone(&self),
            trigger_tx,
            shutdown_tx,
        };

        tokio::spawn(self.run(wake_rx, trigger_rx, shutdown_rx));
        handle
    }

    async fn drain_logged(&self, trigger: &str) {
        match self.drain().await {
            Ok(outcome) => debug!(trigger, ?outcome, "Drain finished"),
            Err(e) => error!(trigger, error = %e, "Drain failed"),
        }
    }

    async fn run(
        self: Arc<Self>,
        mut wake_rx: mpsc::Receiver<WakeRequest>,
        mut trigger_rx: mpsc::Receiver<()>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Sync agent started");
        let mut online_rx = self.connectivity.subscribe();

        if let Err(e) = self
            .db
            .actions()
            .recover_stale_processing(self.config.queue.processing_grace())
            .await
        {
            warn!(error = %e, "Start-up staleness sweep failed");
        }
        match self.refresh_status().await {
            Ok(status) if status.pending_actions_count > 0 && status.is_online => {
                self.drain_logged("startup").await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read queue state"),
        }

        let mut housekeeping = tokio::time::interval(Duration::from_secs(
            self.config.queue.housekeeping_interval_secs.max(1),
        ));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        housekeeping.tick().await;

        loop {
            tokio::select! {
                Some(wake) = wake_rx.recv() => {
                    if self.connectivity.is_online() {
                        self.drain_logged(&wake.tag).await;
                    } else {
                        debug!(tag = %wake.tag, action_id = ?wake.action_id, "Offline, wake deferred");
                        if let Err(e) = self.refresh_status().await {
                            warn!(error = %e, "Failed to refresh status");
                        }
                    }
                }

                Some(()) = trigger_rx.recv() => {
                    self.drain_logged("sync-now").await;
                }

                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online {
                        self.drain_logged("online").await;
                    } else if let Err(e) = self.refresh_status().await {
                        warn!(error = %e, "Failed to refresh status");
                    }
                }

                _ = housekeeping.tick() => {
                    if let Err(e) = self.housekeeping().await {
                        warn!(error = %e, "Housekeeping failed");
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }
        }

        info!("Sync agent stopped");
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running SyncAgent.
#[derive(Clone)]
pub struct SyncAgentHandle {
    agent: Arc<SyncAgent>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncAgentHandle {
    pub fn agent(&self) -> &Arc<SyncAgent> {
        &self.agent
    }

    /// Gets the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.agent.status().await
    }

    /// Asks the run loop to drain now, even while offline (the drain then
    /// reports the offline error).
    pub fn sync_now(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("Sync agent not running"),
        }
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating SyncAgent with options.
pub struct SyncAgentBuilder {
    config: SyncConfig,
    db: Option<Arc<Database>>,
    engine: Option<CacheEngine>,
    replayer: Option<Arc<dyn ActionReplayer>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    connectivity: Option<ConnectivityMonitor>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncAgentBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncAgentBuilder {
            config,
            db: None,
            engine: None,
            replayer: None,
            fetcher: None,
            connectivity: None,
            emitter: None,
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_engine(mut self, engine: CacheEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the replayer. Without one, an [`HttpReplayer`] over the fetcher
    /// is used.
    pub fn with_replayer(mut self, replayer: Arc<dyn ActionReplayer>) -> Self {
        self.replayer = Some(replayer);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> SyncResult<SyncAgent> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let engine = self
            .engine
            .ok_or_else(|| SyncError::InvalidConfig("Cache engine required".into()))?;
        let config = Arc::new(self.config);

        let replayer = match (self.replayer, self.fetcher) {
            (Some(replayer), _) => replayer,
            (None, Some(fetcher)) => {
                Arc::new(HttpReplayer::new(fetcher, db.blobs(), Arc::clone(&config)))
                    as Arc<dyn ActionReplayer>
            }
            (None, None) => {
                return Err(SyncError::InvalidConfig(
                    "Replayer or fetcher required".into(),
                ))
            }
        };

        let connectivity = self
            .connectivity
            .unwrap_or_else(|| ConnectivityMonitor::new(true));
        let status = SyncStatus {
            is_online: connectivity.is_online(),
            ..Default::default()
        };

        Ok(SyncAgent {
            config,
            db,
            engine,
            replayer,
            connectivity,
            emitter: self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter)),
            status: Arc::new(RwLock::new(status)),
            draining: AtomicBool::new(false),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
