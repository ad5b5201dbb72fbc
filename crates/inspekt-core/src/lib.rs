//! # inspekt-core: Pure Domain Types for the Inspekt Sync Layer
//!
//! This crate holds the domain model shared by the queue store, the cache
//! engine and the sync orchestrator. Everything here is deterministic and
//! free of I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Inspekt Sync Layer                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Foreground pages (PWA)                          │   │
//! │  │   Inspection forms ──► mutations     Dashboards ──► reads       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP + WebSocket                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    inspekt-worker (app)                         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            inspekt-sync (engine + orchestrator)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ inspekt-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  action   │  │   types   │  │   cache   │  │ protocol  │  │   │
//! │  │   │ ActionKind│  │ Offline-  │  │ policy +  │  │ WorkerEvt │  │   │
//! │  │   │ (tagged)  │  │ Action    │  │ names     │  │ Control   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue records (`OfflineAction`, `ActionStatus`, `ActionPatch`)
//! - [`action`] - Tagged union of known mutation kinds
//! - [`http`] - Owned request/response values passed through the engine
//! - [`cache`] - Cache policy selection and generation naming
//! - [`protocol`] - Messages exchanged with foreground pages
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use inspekt_core::action::{ActionKind, SubmitInspection};
//! use inspekt_core::ActionStatus;
//!
//! let kind = ActionKind::SubmitInspection(SubmitInspection {
//!     form_id: "f1".into(),
//!     equipment_id: None,
//!     answers: serde_json::json!({ "pressure": "ok" }),
//! });
//!
//! let new_action = kind.into_new_action(None).unwrap();
//! assert_eq!(new_action.action_type, "submitInspection");
//! assert_eq!(ActionStatus::default(), ActionStatus::Pending);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod cache;
pub mod error;
pub mod http;
pub mod protocol;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use action::ActionKind;
pub use cache::{CacheKind, CachePolicy, GenerationNames};
pub use error::{CoreError, CoreResult};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestMode};
pub use protocol::{ControlCommand, ControlReply, SyncStatus, WorkerEvent};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of failed replays after which an action stops being retried
/// automatically and needs explicit user action.
pub const MAX_RETRIES: i64 = 3;

/// Deadline for the network leg of network-first navigation requests.
pub const NAVIGATION_TIMEOUT_MS: u64 = 3_000;

/// Retention window for captured blobs (photos etc.) before eviction.
pub const BLOB_RETENTION_DAYS: i64 = 7;

/// How long an action may sit in `processing` with no drain touching it
/// before the staleness sweep demotes it to `pending`.
pub const PROCESSING_GRACE_SECS: i64 = 120;

/// Path of the reserved offline fallback page in the shell generation.
pub const OFFLINE_PAGE: &str = "/offline.html";

/// Prefix shared by every cache generation name.
pub const CACHE_NAME_PREFIX: &str = "inspekt";
