//! # Inspekt Worker
//!
//! Background worker process for the Inspekt PWA: intercepts the pages'
//! requests, keeps the offline caches, and replays queued mutations.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Worker Startup Sequence                             │
//! │                                                                         │
//! │  1. Initialize Tracing ───────────────────────────────────────────────► │
//! │     • tracing-subscriber with env filter                                │
//! │     • Default: INFO, can be overridden with RUST_LOG                    │
//! │                                                                         │
//! │  2. Load Configuration ───────────────────────────────────────────────► │
//! │     • inspekt.toml in the platform config dir, then INSPEKT_* env vars  │
//! │                                                                         │
//! │  3. Open Database ────────────────────────────────────────────────────► │
//! │     • SQLite with migrations (queue, blobs, cache generations)          │
//! │                                                                         │
//! │  4. Start Components ─────────────────────────────────────────────────► │
//! │     • Sync agent run loop, control loop, optional probe                 │
//! │     • Install: precache shell, activate, prune stale generations        │
//! │                                                                         │
//! │  5. Serve ────────────────────────────────────────────────────────────► │
//! │     • axum on server.bind_addr:server.port until Ctrl+C / SIGTERM       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod proxy;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inspekt_db::{Database, DbConfig};
use inspekt_sync::{HttpFetcher, SyncConfig};

pub use routes::router;
pub use state::{AppState, WorkerRuntime};

/// Runs the worker until a shutdown signal arrives.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting Inspekt worker");

    let config = SyncConfig::load(None).context("loading configuration")?;
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    info!(?db_path, origin = %config.remote.origin, "Configuration loaded");

    let db = Database::new(DbConfig::new(db_path))
        .await
        .context("opening database")?;
    info!("Database connected and migrations applied");

    let fetcher = HttpFetcher::new(Duration::from_secs(config.connectivity.request_timeout_secs))?;
    let bind_addr = config.server.bind_address();

    let runtime = WorkerRuntime::start(config, db, Arc::new(fetcher))?;
    runtime.install().await;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(addr = %bind_addr, "Worker listening");

    axum::serve(listener, router(runtime.state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    runtime.shutdown().await;
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=inspekt_sync=trace` - Show trace for the sync crate only
/// - Default: INFO, DEBUG for inspekt crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,inspekt=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
