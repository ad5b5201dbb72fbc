//! # Worker ↔ Page Protocol
//!
//! Messages exchanged between the background worker and foreground pages.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Worker ↔ Page Messages                             │
//! │                                                                         │
//! │  BROADCAST (worker ───► every open page)                               │
//! │  ───────────────────────────────────────                               │
//! │  SYNC_STARTED    { count }                                             │
//! │  FORM_SYNCED     { key, remaining }                                    │
//! │  SYNC_COMPLETED  { successCount, failureCount }                        │
//! │  SYNC_ERROR      { error }                                             │
//! │  STATUS_CHANGED  { isOnline, isSyncing, pendingActionsCount, ... }     │
//! │                                                                         │
//! │  CONTROL (page ───► worker)                                            │
//! │  ──────────────────────────                                            │
//! │  SKIP_WAITING                         fire-and-forget                  │
//! │  CHECK_VERSION   ──► VERSION { version }          request/response     │
//! │  CLEAR_CACHES    ──► CACHES_CLEARED { success }   request/response     │
//! │  SYNC_NOW / ONLINE / OFFLINE          fire-and-forget                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Adjacently tagged JSON: `{ "type": "SYNC_STARTED", "payload": { "count": 3 } }`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Sync Status
// =============================================================================

/// Foreground-visible sync state. A projection of the queue, refreshed on
/// every broadcast; never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the worker currently believes the network is reachable.
    pub is_online: bool,

    /// Whether a drain is running.
    pub is_syncing: bool,

    /// Actions still waiting for replay (pending + retryable failed).
    pub pending_actions_count: i64,

    /// End of the last drain that replayed without failures.
    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Error summary of the last drain, if it had failures.
    pub last_sync_error: Option<String>,

    /// Per-item progress of the running drain in `[0, 1]`.
    pub progress: f64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            is_online: true,
            is_syncing: false,
            pending_actions_count: 0,
            last_synced_at: None,
            last_sync_error: None,
            progress: 1.0,
        }
    }
}

// =============================================================================
// Broadcast Events
// =============================================================================

/// Events broadcast to every open page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    /// A drain started with `count` eligible actions.
    SyncStarted { count: usize },

    /// One action replayed successfully.
    #[serde(rename_all = "camelCase")]
    FormSynced { key: String, remaining: usize },

    /// A drain finished.
    #[serde(rename_all = "camelCase")]
    SyncCompleted {
        success_count: usize,
        failure_count: usize,
    },

    /// A drain could not run or a broadcast-worthy failure happened.
    SyncError { error: String },

    /// The status projection changed.
    StatusChanged(SyncStatus),
}

impl WorkerEvent {
    /// Wire name of the event, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerEvent::SyncStarted { .. } => "SYNC_STARTED",
            WorkerEvent::FormSynced { .. } => "FORM_SYNCED",
            WorkerEvent::SyncCompleted { .. } => "SYNC_COMPLETED",
            WorkerEvent::SyncError { .. } => "SYNC_ERROR",
            WorkerEvent::StatusChanged(_) => "STATUS_CHANGED",
        }
    }
}

// =============================================================================
// Control Messages
// =============================================================================

/// Administrative commands sent by pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    /// Activate a waiting worker immediately.
    SkipWaiting,
    /// Ask for the cache version token.
    CheckVersion,
    /// Delete every cache generation.
    ClearCaches,
    /// Start a drain now.
    SyncNow,
    /// The page observed connectivity.
    Online,
    /// The page observed loss of connectivity.
    Offline,
}

impl ControlCommand {
    /// True for commands that answer over a reply channel.
    pub fn expects_reply(&self) -> bool {
        matches!(self, ControlCommand::CheckVersion | ControlCommand::ClearCaches)
    }
}

/// Replies to request/response control commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    Version { version: String },
    CachesCleared { success: bool },
    Ack,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = WorkerEvent::SyncCompleted {
            success_count: 2,
            failure_count: 1,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "type": "SYNC_COMPLETED", "payload": { "successCount": 2, "failureCount": 1 } })
        );
        assert_eq!(event.type_name(), "SYNC_COMPLETED");
    }

    #[test]
    fn test_form_synced_wire_format() {
        let value = serde_json::to_value(WorkerEvent::FormSynced {
            key: "f1".into(),
            remaining: 0,
        })
        .unwrap();
        assert_eq!(value["type"], "FORM_SYNCED");
        assert_eq!(value["payload"]["key"], "f1");
    }

    #[test]
    fn test_control_command_parsing() {
        let cmd: ControlCommand = serde_json::from_value(json!({ "type": "CHECK_VERSION" })).unwrap();
        assert_eq!(cmd, ControlCommand::CheckVersion);
        assert!(cmd.expects_reply());

        let cmd: ControlCommand = serde_json::from_value(json!({ "type": "SKIP_WAITING" })).unwrap();
        assert!(!cmd.expects_reply());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let value = serde_json::to_value(SyncStatus::default()).unwrap();
        assert_eq!(value["isOnline"], true);
        assert_eq!(value["pendingActionsCount"], 0);
        assert!(value["lastSyncedAt"].is_null());
    }
}
