//! # Worker Lifecycle
//!
//! The background worker as an explicit state machine. Platform callbacks
//! (install, activate, fetch, sync, message) become [`LifecycleEvent`]s.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Parsed ──install──► Installing ──ok──► Installed ──activate──┐        │
//! │                          │                 (waiting)          │        │
//! │                          │                    │ skip waiting  │        │
//! │                        error                  ▼               ▼        │
//! │                          │              Activating ◄──────────┘        │
//! │                          ▼                    │                         │
//! │                      Redundant                ▼                         │
//! │                                           Activated                     │
//! │                                     (intercepts fetches)               │
//! │                                                                         │
//! │  Before Activated, fetches pass straight through to the network.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use inspekt_core::{ControlCommand, ControlReply, HttpRequest, HttpResponse};

use crate::agent::{DrainOutcome, SyncAgentHandle};
use crate::connectivity::ConnectivityMonitor;
use crate::engine::{CacheEngine, FetchOutcome, InstallReport, ResponseSource};
use crate::error::{SyncError, SyncResult};
use crate::network::Fetcher;
use crate::queue::SYNC_TAG;

/// Capacity of the control message queue.
const CONTROL_BUFFER: usize = 32;

// =============================================================================
// States and Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Activated,
    /// Install failed; this worker never serves.
    Redundant,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Callback events delivered to the worker.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(HttpRequest),
    Sync(String),
    Message(ControlCommand),
}

/// What handling one [`LifecycleEvent`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    Installed(InstallReport),
    Activated { pruned: Vec<String> },
    Served(Served),
    /// `None` for a tag this worker does not own.
    Synced(Option<DrainOutcome>),
    Replied(Option<ControlReply>),
}

/// A response handed back to the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub response: HttpResponse,
    pub source: ResponseSource,
}

// =============================================================================
// Background Worker
// =============================================================================

/// Routes lifecycle events to the cache engine and the sync agent.
pub struct BackgroundWorker {
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
    engine: CacheEngine,
    fetcher: Arc<dyn Fetcher>,
    agent: SyncAgentHandle,
    connectivity: ConnectivityMonitor,
}

impl BackgroundWorker {
    pub fn new(
        engine: CacheEngine,
        fetcher: Arc<dyn Fetcher>,
        agent: SyncAgentHandle,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        BackgroundWorker {
            state: RwLock::new(LifecycleState::Parsed),
            skip_waiting: AtomicBool::new(false),
            engine,
            fetcher,
            agent,
            connectivity,
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    pub fn agent(&self) -> &SyncAgentHandle {
        &self.agent
    }

    /// Single dispatch point for callback events.
    pub async fn handle(&self, event: LifecycleEvent) -> SyncResult<EventResult> {
        match event {
            LifecycleEvent::Install => self.install().await.map(EventResult::Installed),
            LifecycleEvent::Activate => self
                .activate()
                .await
                .map(|pruned| EventResult::Activated { pruned }),
            LifecycleEvent::Fetch(request) => self.fetch(request).await.map(EventResult::Served),
            LifecycleEvent::Sync(tag) => self.sync(&tag).await.map(EventResult::Synced),
            LifecycleEvent::Message(cmd) => self.message(cmd).await.map(EventResult::Replied),
        }
    }

    async fn transition(
        &self,
        event: &str,
        from: &[LifecycleState],
        to: LifecycleState,
    ) -> SyncResult<()> {
        let mut state = self.state.write().await;
        if !from.contains(&*state) {
            return Err(SyncError::InvalidLifecycle {
                event: event.to_string(),
                state: state.to_string(),
            });
        }
        debug!(from = %*state, to = %to, "Lifecycle transition");
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: LifecycleState) {
        *self.state.write().await = to;
    }

    // =========================================================================
    // Install / Activate
    // =========================================================================

    /// Precaches the shell, then activates right away when skip-waiting was
    /// requested (the engine always requests it).
    pub async fn install(&self) -> SyncResult<InstallReport> {
        self.transition("install", &[LifecycleState::Parsed], LifecycleState::Installing)
            .await?;

        let report = match self.engine.install().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Install failed, worker is redundant");
                self.set_state(LifecycleState::Redundant).await;
                return Err(e);
            }
        };

        self.set_state(LifecycleState::Installed).await;
        info!(version = self.engine.version(), "Worker installed");

        if report.skip_waiting {
            self.skip_waiting.store(true, Ordering::Release);
        }
        if self.skip_waiting.load(Ordering::Acquire) {
            self.activate().await?;
        }
        Ok(report)
    }

    /// Prunes stale generations and starts intercepting.
    pub async fn activate(&self) -> SyncResult<Vec<String>> {
        self.transition("activate", &[LifecycleState::Installed], LifecycleState::Activating)
            .await?;

        let pruned = match self.engine.activate().await {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "Pruning stale generations failed");
                Vec::new()
            }
        };

        self.set_state(LifecycleState::Activated).await;
        info!(version = self.engine.version(), "Worker activated, claiming clients");
        Ok(pruned)
    }

    /// Activates a waiting worker now, or as soon as install finishes.
    pub async fn skip_waiting(&self) -> SyncResult<()> {
        self.skip_waiting.store(true, Ordering::Release);
        if self.state().await == LifecycleState::Installed {
            self.activate().await?;
        }
        Ok(())
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Answers an intercepted request.
    pub async fn fetch(&self, request: HttpRequest) -> SyncResult<Served> {
        if self.state().await != LifecycleState::Activated {
            return self.passthrough(&request).await;
        }

        match self.engine.handle_fetch(request.clone()).await {
            Ok(FetchOutcome::Response { response, source }) => {
                if source == ResponseSource::Network {
                    self.connectivity.set_online(true);
                }
                Ok(Served { response, source })
            }
            Ok(FetchOutcome::Passthrough) => self.passthrough(&request).await,
            Err(e) => {
                if e.is_network() {
                    self.connectivity.set_online(false);
                }
                Err(e)
            }
        }
    }

    async fn passthrough(&self, request: &HttpRequest) -> SyncResult<Served> {
        let result = self.fetcher.fetch(request).await;
        self.connectivity.observe(&result);
        result.map(|response| Served {
            response,
            source: ResponseSource::Network,
        })
    }

    // =========================================================================
    // Sync / Message
    // =========================================================================

    /// Background wake for `tag`. Other tags belong to someone else.
    pub async fn sync(&self, tag: &str) -> SyncResult<Option<DrainOutcome>> {
        if tag != SYNC_TAG {
            debug!(tag, "Ignoring foreign sync tag");
            return Ok(None);
        }
        self.agent.agent().drain().await.map(Some)
    }

    /// Handles a control message. Request/response commands return a reply.
    pub async fn message(&self, cmd: ControlCommand) -> SyncResult<Option<ControlReply>> {
        debug!(?cmd, "Control message");
        match cmd {
            ControlCommand::SkipWaiting => {
                self.skip_waiting().await?;
                Ok(None)
            }
            ControlCommand::CheckVersion => Ok(Some(ControlReply::Version {
                version: self.engine.version().to_string(),
            })),
            ControlCommand::ClearCaches => {
                let success = match self.engine.clear_all().await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "Clearing caches failed");
                        false
                    }
                };
                Ok(Some(ControlReply::CachesCleared { success }))
            }
            ControlCommand::SyncNow => {
                self.agent.sync_now();
                Ok(None)
            }
            ControlCommand::Online => {
                self.connectivity.set_online(true);
                Ok(None)
            }
            ControlCommand::Offline => {
                self.connectivity.set_online(false);
                Ok(None)
            }
        }
    }

    /// Starts the task that serializes control messages.
    pub fn spawn_control_loop(self: &Arc<Self>) -> ControlHandle {
        let (tx, mut rx) = mpsc::channel::<ControlEnvelope>(CONTROL_BUFFER);
        let worker = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match worker.message(envelope.cmd).await {
                    Ok(reply) => {
                        if let Some(reply_tx) = envelope.reply_tx {
                            let _ = reply_tx.send(reply.unwrap_or(ControlReply::Ack));
                        }
                    }
                    Err(e) => warn!(cmd = ?envelope.cmd, error = %e, "Control message failed"),
                }
            }
            debug!("Control loop stopped");
        });

        ControlHandle { tx }
    }
}

// =============================================================================
// Control Handle
// =============================================================================

struct ControlEnvelope {
    cmd: ControlCommand,
    reply_tx: Option<oneshot::Sender<ControlReply>>,
}

/// Sends control messages to a running worker.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlEnvelope>,
}

impl std::fmt::Debug for ControlEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlEnvelope").field("cmd", &self.cmd).finish()
    }
}

impl ControlHandle {
    /// Sends a command; waits for the reply of request/response commands.
    pub async fn send(&self, cmd: ControlCommand) -> SyncResult<Option<ControlReply>> {
        if !cmd.expects_reply() {
            self.post(cmd).await?;
            return Ok(None);
        }
        self.request(cmd).await.map(Some)
    }

    /// Fire-and-forget.
    pub async fn post(&self, cmd: ControlCommand) -> SyncResult<()> {
        self.tx
            .send(ControlEnvelope { cmd, reply_tx: None })
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Request/response over a oneshot reply channel.
    pub async fn request(&self, cmd: ControlCommand) -> SyncResult<ControlReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlEnvelope {
                cmd,
                reply_tx: Some(reply_tx),
            })
            .await
            .map_err(|_| SyncError::ShuttingDown)?;

        reply_rx
            .await
            .map_err(|_| SyncError::ChannelError(format!("no reply to {cmd:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SyncAgentBuilder;
    use crate::config::SyncConfig;
    use crate::network::{MockFetcher, MockReply};
    use crate::queue::wake_channel;
    use inspekt_db::{Database, DbConfig};
    use std::time::Duration;

    const ORIGIN: &str = "https://app.test";

    async fn worker_with(mock: Arc<MockFetcher>) -> (Arc<BackgroundWorker>, Arc<Database>) {
        let mut config = SyncConfig::default();
        config.remote.origin = ORIGIN.into();
        config.cache.version = "v2".into();
        config.cache.shell_assets = vec!["/".into()];

        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let engine = CacheEngine::new(&config, db.caches(), mock.clone()).unwrap();
        let connectivity = ConnectivityMonitor::new(true);
        let agent = Arc::new(
            SyncAgentBuilder::new(config)
                .with_database(db.clone())
                .with_engine(engine.clone())
                .with_fetcher(mock.clone())
                .with_connectivity(connectivity.clone())
                .build()
                .unwrap(),
        );
        let (_wake_tx, wake_rx) = wake_channel();
        let handle = agent.spawn(wake_rx);

        let worker = BackgroundWorker::new(engine, mock, handle, connectivity);
        (Arc::new(worker), db)
    }

    fn scripted() -> Arc<MockFetcher> {
        let mock = Arc::new(MockFetcher::new());
        mock.on("GET", &format!("{ORIGIN}/offline.html"), MockReply::ok("offline"))
            .on("GET", &format!("{ORIGIN}/"), MockReply::ok("index"));
        mock
    }

    #[tokio::test]
    async fn test_install_activates_immediately() {
        let (worker, db) = worker_with(scripted()).await;
        db.caches().open("inspekt-shell-v1").await.unwrap();

        let result = worker.handle(LifecycleEvent::Install).await.unwrap();
        assert!(matches!(result, EventResult::Installed(ref r) if r.cached == 2));
        assert_eq!(worker.state().await, LifecycleState::Activated);
        assert_eq!(db.caches().list_generations().await.unwrap(), vec!["inspekt-shell-v2"]);
    }

    #[tokio::test]
    async fn test_install_failure_is_redundant() {
        let mock = Arc::new(MockFetcher::new());
        mock.set_offline(true);
        let (worker, _db) = worker_with(mock).await;

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, SyncError::InstallFailed(_)));
        assert_eq!(worker.state().await, LifecycleState::Redundant);

        let err = worker.activate().await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidLifecycle { .. }));
    }

    #[tokio::test]
    async fn test_fetch_passes_through_until_activated() {
        let mock = scripted();
        let api = format!("{ORIGIN}/api/forms");
        mock.on("GET", &api, MockReply::ok("[]"));
        let (worker, db) = worker_with(mock.clone()).await;

        let served = worker.fetch(HttpRequest::get(&api).unwrap()).await.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(db.caches().entry_count("inspekt-api-v2").await.unwrap(), 0);

        worker.install().await.unwrap();
        worker.fetch(HttpRequest::get(&api).unwrap()).await.unwrap();
        let served = worker.fetch(HttpRequest::get(&api).unwrap()).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_failed_fetch_marks_offline() {
        let mock = scripted();
        let (worker, _db) = worker_with(mock.clone()).await;
        worker.install().await.unwrap();

        mock.set_offline(true);
        let err = worker
            .fetch(HttpRequest::get(&format!("{ORIGIN}/api/forms")).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_network());
        assert!(!worker.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_control_replies() {
        let (worker, db) = worker_with(scripted()).await;
        worker.install().await.unwrap();
        let control = worker.spawn_control_loop();

        let reply = control.send(ControlCommand::CheckVersion).await.unwrap();
        assert_eq!(reply, Some(ControlReply::Version { version: "v2".into() }));

        let reply = control.send(ControlCommand::ClearCaches).await.unwrap();
        assert_eq!(reply, Some(ControlReply::CachesCleared { success: true }));
        assert!(db.caches().list_generations().await.unwrap().is_empty());

        assert_eq!(control.send(ControlCommand::Offline).await.unwrap(), None);
        for _ in 0..100 {
            if !worker.connectivity.is_online() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!worker.connectivity.is_online());

        // Fire-and-forget commands answer Ack when a reply is requested
        assert_eq!(control.request(ControlCommand::Online).await.unwrap(), ControlReply::Ack);
        assert!(worker.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_foreign_sync_tag_is_ignored() {
        let (worker, _db) = worker_with(scripted()).await;
        assert_eq!(worker.sync("someone-else").await.unwrap(), None);

        let outcome = worker.sync(SYNC_TAG).await.unwrap();
        assert!(matches!(outcome, Some(DrainOutcome::Completed(_))));
    }
}
