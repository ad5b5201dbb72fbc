//! # inspekt-sync: Cache Engine and Sync Orchestrator
//!
//! Everything the background worker decides about the network: which cache
//! answers a read, when queued mutations are replayed, and what open pages
//! are told about it.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        inspekt-sync Components                          │
//! │                                                                         │
//! │   intercepted request                         page mutation             │
//! │          │                                          │                   │
//! │          ▼                                          ▼                   │
//! │  ┌────────────────┐                        ┌────────────────┐          │
//! │  │BackgroundWorker│─── Fetch ──────────┐   │  ActionQueue   │          │
//! │  │ (lifecycle.rs) │                    │   │  (queue.rs)    │          │
//! │  └───────┬────────┘                    ▼   └───────┬────────┘          │
//! │          │ Sync / SYNC_NOW     ┌────────────────┐  │ WakeRequest       │
//! │          │                     │  CacheEngine   │  │                   │
//! │          ▼                     │  (engine.rs)   │  ▼                   │
//! │  ┌────────────────┐ invalidate └───────┬────────┘ ┌────────────────┐   │
//! │  │   SyncAgent    │────────────────────┘          │  Connectivity  │   │
//! │  │  (agent.rs)    │◄──── offline → online ────────│  Monitor       │   │
//! │  └───────┬────────┘                               └────────────────┘   │
//! │          │ replay                 events                               │
//! │          ▼                          │                                  │
//! │  ┌────────────────┐        ┌────────▼───────┐                          │
//! │  │  HttpReplayer  │        │BroadcastEmitter│──► every open page       │
//! │  │  (replay.rs)   │        │ (broadcast.rs) │                          │
//! │  └───────┬────────┘        └────────────────┘                          │
//! │          ▼                                                              │
//! │     Fetcher (network.rs, reqwest)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - TOML/env configuration
//! - [`engine`] - Cache policies, install/activate, invalidation
//! - [`queue`] - Enqueue facade and background wake requests
//! - [`replay`] - Queued action → HTTP request
//! - [`agent`] - Drain orchestration, status projection, housekeeping
//! - [`connectivity`] - Online/offline flag and probe task
//! - [`broadcast`] - Event fan-out to pages
//! - [`lifecycle`] - Worker state machine and control messages
//! - [`network`] - The `Fetcher` seam
//! - [`error`] - Error types

pub mod agent;
pub mod broadcast;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod queue;
pub mod replay;

pub use agent::{
    DrainOutcome, HousekeepingReport, NoOpEmitter, SyncAgent, SyncAgentBuilder, SyncAgentHandle,
    SyncEventEmitter,
};
pub use broadcast::{BroadcastEmitter, BroadcastEnvelope};
pub use config::SyncConfig;
pub use connectivity::{ConnectivityMonitor, ProbeHandle, ProbeSettings};
pub use engine::{CacheEngine, FetchOutcome, InstallReport, ResponseSource};
pub use error::{SyncError, SyncResult};
pub use lifecycle::{
    BackgroundWorker, ControlHandle, EventResult, LifecycleEvent, LifecycleState, Served,
};
pub use network::{Fetcher, HttpFetcher};
pub use queue::{wake_channel, ActionQueue, WakeRequest, SYNC_TAG};
pub use replay::{ActionReplayer, HttpReplayer, ReplayReceipt};
