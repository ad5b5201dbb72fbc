//! # Connectivity Monitor
//!
//! The worker's belief about whether the remote is reachable.
//!
//! ## Inputs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  intercepted traffic ── observe() ──┐                                  │
//! │  ONLINE / OFFLINE    ── set_online()┼──► watch<bool> ──► SyncAgent     │
//! │  probe task (HEAD)   ── set_online()┘                   (offline →    │
//! │                                                           online =     │
//! │                                                           drain)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While offline the probe backs off exponentially (500ms, 1s, 2s, ... up
//! to the configured ceiling); once online it probes at the fixed interval.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use inspekt_core::{HttpMethod, HttpRequest, HttpResponse, RequestMode};

use crate::error::SyncResult;
use crate::network::Fetcher;

/// Shared online/offline flag with change notification.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        ConnectivityMonitor { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the current state.
    ///
    /// ## Returns
    /// `true` if the state changed. Subscribers are woken only on change.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Feeds the outcome of a real request into the monitor.
    ///
    /// Any HTTP response proves reachability; only transport failures mark
    /// us offline.
    pub fn observe(&self, result: &SyncResult<HttpResponse>) {
        match result {
            Ok(_) => {
                self.set_online(true);
            }
            Err(e) if e.is_network() => {
                self.set_online(false);
            }
            Err(_) => {}
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Starts a task that probes `probe_url` with HEAD requests.
    pub fn spawn_probe(
        &self,
        fetcher: Arc<dyn Fetcher>,
        probe_url: Url,
        settings: ProbeSettings,
    ) -> ProbeHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            let mut backoff = ExponentialBackoff {
                initial_interval: settings.initial_backoff,
                max_interval: settings.max_backoff,
                multiplier: 2.0,
                max_elapsed_time: None,
                ..Default::default()
            };

            let request = HttpRequest {
                method: HttpMethod::Head,
                url: probe_url,
                headers: Vec::new(),
                body: None,
                mode: RequestMode::NoCors,
            };

            info!(url = %request.url, "Connectivity probe started");
            loop {
                let online = fetcher.fetch(&request).await.is_ok();
                monitor.set_online(online);

                let delay = if online {
                    backoff.reset();
                    settings.interval
                } else {
                    backoff.next_backoff().unwrap_or(settings.max_backoff)
                };
                debug!(online, delay_ms = delay.as_millis() as u64, "Next probe scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("Connectivity probe stopped");
        });

        ProbeHandle { shutdown_tx, task }
    }
}

/// Timing of the probe task.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ProbeSettings {
    pub fn from_config(config: &crate::config::ConnectivitySettings) -> Self {
        ProbeSettings {
            interval: Duration::from_secs(config.probe_interval_secs),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

/// Handle to a running probe task.
pub struct ProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Stops the probe and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
