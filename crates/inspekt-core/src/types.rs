//! # Queue Types
//!
//! Records stored in the offline action queue and the blob store.
//!
//! ## Action Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       OfflineAction Lifecycle                           │
//! │                                                                         │
//! │   enqueue()                                                             │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ┌─────────┐  drain picks   ┌────────────┐  replay ok   ┌───────────┐  │
//! │  │ pending │ ─────────────► │ processing │ ───────────► │ completed │  │
//! │  └─────────┘                └────────────┘              └─────┬─────┘  │
//! │      ▲                            │                           │        │
//! │      │ staleness sweep            │ replay failed             │ GC     │
//! │      │ (processing too long)      ▼                           ▼        │
//! │      │                      ┌────────────┐              (deleted)      │
//! │      └──────────────────────│   failed   │                             │
//! │                             │ retry += 1 │──► retry < MAX: next drain  │
//! │                             └────────────┘──► retry = MAX: terminal,   │
//! │                                               manual resubmit/delete   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Action Status
// =============================================================================

/// Status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Waiting for the next drain.
    #[default]
    Pending,
    /// Currently being replayed by a drain.
    Processing,
    /// Replayed successfully; eligible for garbage collection.
    Completed,
    /// Last replay failed.
    Failed,
}

impl ActionStatus {
    /// Returns the lowercase storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Processing => "processing",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "processing" => Ok(ActionStatus::Processing),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Offline Action
// =============================================================================

/// A queued mutation awaiting replay against the remote store.
///
/// `data` and `metadata` are opaque to the queue; only the replayer gives
/// them meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    /// Store-assigned identifier.
    pub id: i64,

    /// Mutation kind discriminator (e.g. "submitInspection").
    #[serde(rename = "type")]
    pub action_type: String,

    /// Payload needed to replay the mutation.
    #[ts(type = "unknown")]
    pub data: Value,

    /// Creation time; drain order and staleness are based on it.
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,

    /// Current lifecycle status.
    pub status: ActionStatus,

    /// Number of failed replays so far.
    pub retry_count: i64,

    /// Message of the most recent failure.
    pub last_error: Option<String>,

    /// Caller-defined extra information.
    #[ts(type = "unknown")]
    pub metadata: Option<Value>,

    /// Time of the last status transition.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OfflineAction {
    /// Returns true if a drain should attempt this action.
    ///
    /// Pending actions always qualify; failed ones only while they still have
    /// retry budget left.
    pub fn is_eligible(&self, max_retries: i64) -> bool {
        match self.status {
            ActionStatus::Pending => true,
            ActionStatus::Failed => self.retry_count < max_retries,
            ActionStatus::Processing | ActionStatus::Completed => false,
        }
    }

    /// Returns true if the action exhausted its retry budget.
    pub fn is_terminal_failure(&self, max_retries: i64) -> bool {
        self.status == ActionStatus::Failed && self.retry_count >= max_retries
    }

    /// Merges a patch into this action.
    ///
    /// `retry_count` never decreases through a patch; resubmission is a
    /// dedicated queue operation.
    pub fn apply(&mut self, patch: &ActionPatch, now: DateTime<Utc>) -> CoreResult<()> {
        if let Some(retry_count) = patch.retry_count {
            if retry_count < self.retry_count {
                return Err(CoreError::RetryCountDecrease {
                    id: self.id,
                    current: self.retry_count,
                    requested: retry_count,
                });
            }
            self.retry_count = retry_count;
        }

        if let Some(status) = patch.status {
            self.status = status;
        }

        if let Some(ref last_error) = patch.last_error {
            self.last_error = last_error.clone();
        }

        if let Some(ref metadata) = patch.metadata {
            self.metadata = metadata.clone();
        }

        self.updated_at = now;
        Ok(())
    }
}

/// Input for enqueueing a new action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAction {
    /// Mutation kind discriminator.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Opaque replay payload.
    pub data: Value,

    /// Optional caller metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewAction {
    pub fn new(action_type: impl Into<String>, data: Value) -> Self {
        NewAction {
            action_type: action_type.into(),
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// =============================================================================
// Action Patch
// =============================================================================

/// Partial update for an action. `None` leaves a field untouched; the nested
/// options allow clearing nullable fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPatch {
    pub status: Option<ActionStatus>,
    pub retry_count: Option<i64>,
    pub last_error: Option<Option<String>>,
    pub metadata: Option<Option<Value>>,
}

impl ActionPatch {
    /// Marks an action as picked up by a drain.
    pub fn processing() -> Self {
        ActionPatch {
            status: Some(ActionStatus::Processing),
            ..Default::default()
        }
    }

    /// Marks an action as replayed successfully.
    pub fn completed() -> Self {
        ActionPatch {
            status: Some(ActionStatus::Completed),
            last_error: Some(None),
            ..Default::default()
        }
    }

    /// Records a failed replay. The caller passes the action's current retry
    /// count; the patch carries the incremented one.
    pub fn failed(current_retry_count: i64, error: impl Into<String>) -> Self {
        ActionPatch {
            status: Some(ActionStatus::Failed),
            retry_count: Some(current_retry_count + 1),
            last_error: Some(Some(error.into())),
            ..Default::default()
        }
    }
}

// =============================================================================
// Blob Record
// =============================================================================

/// A large binary payload (e.g. a captured photo) kept apart from the
/// action records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    /// Caller-chosen key, referenced from action payloads.
    pub key: String,

    /// MIME type of the bytes.
    pub content_type: String,

    /// Raw contents.
    pub bytes: Vec<u8>,

    /// When the blob was stored; eviction is based on it.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sync Session
// =============================================================================

/// Aggregate of one drain pass. Lives only for the duration of the drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// Actions the pass started with.
    pub total: usize,
    /// Actions replayed successfully.
    pub success_count: usize,
    /// Actions whose replay failed.
    pub failure_count: usize,
    /// Whether the pass is still running.
    pub running: bool,
    /// When the pass started.
    pub started_at: Option<DateTime<Utc>>,
}

impl SyncSession {
    pub fn start(total: usize) -> Self {
        SyncSession {
            total,
            running: true,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Actions already attempted in this pass.
    pub fn attempted(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Actions not yet attempted in this pass.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.attempted())
    }

    /// True per-item progress in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.attempted() as f64 / self.total as f64
    }

    pub fn finish(&mut self) {
        self.running = false;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_RETRIES;
    use serde_json::json;

    fn sample_action(status: ActionStatus, retry_count: i64) -> OfflineAction {
        let now = Utc::now();
        OfflineAction {
            id: 1,
            action_type: "submitInspection".into(),
            data: json!({ "formId": "f1" }),
            timestamp: now,
            status,
            retry_count,
            last_error: None,
            metadata: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ActionStatus::Pending,
            ActionStatus::Processing,
            ActionStatus::Completed,
            ActionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ActionStatus>().unwrap(), status);
        }
        assert!("stuck".parse::<ActionStatus>().is_err());
    }

    #[test]
    fn test_eligibility() {
        assert!(sample_action(ActionStatus::Pending, 0).is_eligible(MAX_RETRIES));
        assert!(sample_action(ActionStatus::Failed, 2).is_eligible(MAX_RETRIES));
        assert!(!sample_action(ActionStatus::Failed, 3).is_eligible(MAX_RETRIES));
        assert!(!sample_action(ActionStatus::Processing, 0).is_eligible(MAX_RETRIES));
        assert!(!sample_action(ActionStatus::Completed, 0).is_eligible(MAX_RETRIES));

        assert!(sample_action(ActionStatus::Failed, 3).is_terminal_failure(MAX_RETRIES));
        assert!(!sample_action(ActionStatus::Failed, 2).is_terminal_failure(MAX_RETRIES));
    }

    #[test]
    fn test_failed_patch_increments_retry_count() {
        let mut action = sample_action(ActionStatus::Processing, 1);
        action
            .apply(&ActionPatch::failed(1, "HTTP 500"), Utc::now())
            .unwrap();

        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.retry_count, 2);
        assert_eq!(action.last_error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_patch_cannot_lower_retry_count() {
        let mut action = sample_action(ActionStatus::Failed, 3);
        let patch = ActionPatch {
            retry_count: Some(0),
            ..Default::default()
        };

        assert!(action.apply(&patch, Utc::now()).is_err());
        assert_eq!(action.retry_count, 3);
    }

    #[test]
    fn test_completed_patch_clears_error() {
        let mut action = sample_action(ActionStatus::Failed, 1);
        action.last_error = Some("timeout".into());
        action.apply(&ActionPatch::completed(), Utc::now()).unwrap();

        assert_eq!(action.status, ActionStatus::Completed);
        assert_eq!(action.last_error, None);
        assert_eq!(action.retry_count, 1);
    }

    #[test]
    fn test_action_serializes_type_field() {
        let action = sample_action(ActionStatus::Pending, 0);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "submitInspection");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_session_progress() {
        let mut session = SyncSession::start(4);
        assert_eq!(session.progress(), 0.0);
        session.success_count = 1;
        session.failure_count = 1;
        assert_eq!(session.remaining(), 2);
        assert!((session.progress() - 0.5).abs() < f64::EPSILON);
        session.finish();
        assert!(!session.running);
        assert_eq!(SyncSession::start(0).progress(), 1.0);
    }
}
