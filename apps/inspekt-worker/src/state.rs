//! # Worker State
//!
//! Wires the sync crate's components together and holds what the HTTP
//! handlers share.
//!
//! ## Startup Order
//! ```text
//! Database ──► CacheEngine ──► SyncAgent (run loop) ──► BackgroundWorker
//!                  │               ▲      │                   │
//!                  │   wake_channel│      │ BroadcastEmitter  │ control loop
//!                  │               │      ▼                   ▼
//!                  └────────► ActionQueue            ControlHandle
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use inspekt_db::Database;
use inspekt_sync::{
    wake_channel, ActionQueue, BackgroundWorker, BroadcastEmitter, CacheEngine,
    ConnectivityMonitor, ControlHandle, Fetcher, ProbeHandle, ProbeSettings, SyncAgentBuilder,
    SyncAgentHandle, SyncConfig, SyncResult,
};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<BackgroundWorker>,
    pub control: ControlHandle,
    pub queue: ActionQueue,
    pub events: BroadcastEmitter,
    /// Remote origin intercepted requests are rebuilt against.
    pub origin: Url,
}

/// Running background components plus the state handed to the router.
pub struct WorkerRuntime {
    pub state: AppState,
    db: Arc<Database>,
    agent: SyncAgentHandle,
    probe: Option<ProbeHandle>,
}

impl WorkerRuntime {
    /// Builds every component and starts the agent and control loops.
    pub fn start(config: SyncConfig, db: Database, fetcher: Arc<dyn Fetcher>) -> SyncResult<Self> {
        let db = Arc::new(db);
        let origin = config.origin_url()?;
        let probe_url = config
            .connectivity
            .probe_url
            .as_deref()
            .map(Url::parse)
            .transpose()?;

        let connectivity = ConnectivityMonitor::new(true);
        let engine = CacheEngine::new(&config, db.caches(), Arc::clone(&fetcher))?;
        let events = BroadcastEmitter::new();

        let (wake_tx, wake_rx) = wake_channel();
        let queue = ActionQueue::new(&db, config.queue.max_retries, wake_tx);

        let agent = Arc::new(
            SyncAgentBuilder::new(config.clone())
                .with_database(Arc::clone(&db))
                .with_engine(engine.clone())
                .with_fetcher(Arc::clone(&fetcher))
                .with_connectivity(connectivity.clone())
                .with_emitter(Arc::new(events.clone()))
                .build()?,
        )
        .spawn(wake_rx);

        let worker = Arc::new(BackgroundWorker::new(
            engine,
            Arc::clone(&fetcher),
            agent.clone(),
            connectivity.clone(),
        ));
        let control = worker.spawn_control_loop();

        let probe = probe_url.map(|url| {
            connectivity.spawn_probe(
                Arc::clone(&fetcher),
                url,
                ProbeSettings::from_config(&config.connectivity),
            )
        });

        Ok(WorkerRuntime {
            state: AppState {
                worker,
                control,
                queue,
                events,
                origin,
            },
            db,
            agent,
            probe,
        })
    }

    /// Precaches the shell. A failed install leaves the worker passing
    /// requests straight through, which is logged but not fatal.
    pub async fn install(&self) {
        match self.state.worker.install().await {
            Ok(report) => {
                if !report.failed.is_empty() {
                    warn!(failed = ?report.failed, "Some shell assets were not precached");
                }
                info!(cached = report.cached, "Shell precached");
            }
            Err(e) => warn!(error = %e, "Install failed, serving from the network only"),
        }
    }

    /// Stops the background tasks and closes the store.
    pub async fn shutdown(self) {
        if let Some(probe) = self.probe {
            probe.shutdown().await;
        }
        self.agent.shutdown().await;
        self.db.close().await;
        info!("Worker stopped");
    }
}
