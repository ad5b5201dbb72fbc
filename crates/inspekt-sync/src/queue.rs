//! # Action Queue Facade
//!
//! The page-facing side of the durable queue. Persists mutations and asks
//! the orchestrator for a background wake-up.
//!
//! ## Enqueue Flow
//! ```text
//! page ──► enqueue_kind(ActionKind)
//!            │
//!            ├── ActionKind → type + data  (checked once, here)
//!            ├── ActionRepository::enqueue (durable, status = pending)
//!            └── WakeRequest { tag: "sync-offline-actions" } ──► SyncAgent
//! ```
//!
//! The wake channel holds one request at a time; a wake that finds the
//! channel full is dropped because the queued one already covers it.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use inspekt_core::{ActionKind, BlobRecord, NewAction, OfflineAction};
use inspekt_db::{ActionRepository, BlobRepository, Database};

use crate::error::SyncResult;

/// Tag of the background wake registration.
pub const SYNC_TAG: &str = "sync-offline-actions";

/// Request to run a drain soon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    pub tag: String,
    /// Action whose enqueue caused the wake, if any.
    pub action_id: Option<i64>,
}

impl WakeRequest {
    pub fn for_action(action_id: i64) -> Self {
        WakeRequest {
            tag: SYNC_TAG.to_string(),
            action_id: Some(action_id),
        }
    }
}

/// Creates the wake channel shared by the queue and the agent.
pub fn wake_channel() -> (mpsc::Sender<WakeRequest>, mpsc::Receiver<WakeRequest>) {
    mpsc::channel(1)
}

/// Queue operations available to pages.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    actions: ActionRepository,
    blobs: BlobRepository,
    wake_tx: mpsc::Sender<WakeRequest>,
    max_retries: i64,
}

impl ActionQueue {
    pub fn new(db: &Database, max_retries: i64, wake_tx: mpsc::Sender<WakeRequest>) -> Self {
        ActionQueue {
            actions: db.actions(),
            blobs: db.blobs(),
            wake_tx,
            max_retries,
        }
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Persists a typed mutation and requests a wake-up.
    pub async fn enqueue_kind(&self, kind: ActionKind, metadata: Option<Value>) -> SyncResult<i64> {
        let action = kind.into_new_action(metadata)?;
        self.enqueue(&action).await
    }

    /// Persists a raw mutation and requests a wake-up.
    pub async fn enqueue(&self, action: &NewAction) -> SyncResult<i64> {
        let id = self.actions.enqueue(action).await?;
        info!(id, action_type = %action.action_type, "Action queued");
        self.request_wake(WakeRequest::for_action(id));
        Ok(id)
    }

    fn request_wake(&self, wake: WakeRequest) {
        match self.wake_tx.try_send(wake) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Wake already pending");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Sync agent not running, wake dropped");
            }
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn get(&self, id: i64) -> SyncResult<Option<OfflineAction>> {
        Ok(self.actions.get(id).await?)
    }

    /// Actions with status `pending`, oldest first.
    pub async fn list_pending(&self) -> SyncResult<Vec<OfflineAction>> {
        Ok(self.actions.list_pending().await?)
    }

    /// Failed actions that exhausted their retries and wait for the user.
    pub async fn list_failed_terminal(&self) -> SyncResult<Vec<OfflineAction>> {
        Ok(self.actions.list_failed_terminal(self.max_retries).await?)
    }

    /// Pending plus retryable failed actions.
    pub async fn count_pending(&self) -> SyncResult<i64> {
        Ok(self.actions.count_pending(self.max_retries).await?)
    }

    // =========================================================================
    // User actions on terminal failures
    // =========================================================================

    /// Discards an action, typically a terminal failure the user gave up on.
    pub async fn delete(&self, id: i64) -> SyncResult<()> {
        self.actions.delete(id).await?;
        info!(id, "Action discarded");
        Ok(())
    }

    /// Resets a failed action to `pending` with a fresh retry budget and
    /// requests a wake-up.
    pub async fn resubmit(&self, id: i64) -> SyncResult<OfflineAction> {
        let action = self.actions.resubmit(id).await?;
        info!(id, "Action resubmitted");
        self.request_wake(WakeRequest::for_action(id));
        Ok(action)
    }

    // =========================================================================
    // Blobs
    // =========================================================================

    pub async fn put_blob(&self, key: &str, content_type: &str, bytes: &[u8]) -> SyncResult<()> {
        Ok(self.blobs.put_blob(key, content_type, bytes).await?)
    }

    pub async fn get_blob(&self, key: &str) -> SyncResult<Option<BlobRecord>> {
        Ok(self.blobs.get_blob(key).await?)
    }

    pub async fn delete_blob(&self, key: &str) -> SyncResult<bool> {
        Ok(self.blobs.delete_blob(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use inspekt_core::action::{SaveDraft, SubmitInspection};
    use inspekt_core::{ActionPatch, ActionStatus};
    use inspekt_db::DbConfig;
    use serde_json::json;

    async fn setup() -> (ActionQueue, Database, mpsc::Receiver<WakeRequest>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (tx, rx) = wake_channel();
        (ActionQueue::new(&db, 3, tx), db, rx)
    }

    fn submit(form_id: &str) -> ActionKind {
        ActionKind::SubmitInspection(SubmitInspection {
            form_id: form_id.into(),
            equipment_id: None,
            answers: json!({ "pressure": "ok" }),
        })
    }

    #[tokio::test]
    async fn test_enqueue_kind_persists_and_wakes() {
        let (queue, _db, mut rx) = setup().await;

        let id = queue.enqueue_kind(submit("f1"), None).await.unwrap();

        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.action_type, "submitInspection");
        assert_eq!(stored.data["formId"], "f1");
        assert_eq!(stored.status, ActionStatus::Pending);
        assert_eq!(stored.retry_count, 0);

        let wake = rx.recv().await.unwrap();
        assert_eq!(wake.tag, SYNC_TAG);
        assert_eq!(wake.action_id, Some(id));
    }

    #[tokio::test]
    async fn test_wakes_coalesce_when_channel_full() {
        let (queue, _db, mut rx) = setup().await;

        queue.enqueue_kind(submit("f1"), None).await.unwrap();
        queue
            .enqueue_kind(
                ActionKind::SaveDraft(SaveDraft {
                    form_id: "f2".into(),
                    answers: json!({}),
                }),
                None,
            )
            .await
            .unwrap();

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.list_pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_survives_closed_channel() {
        let (queue, _db, rx) = setup().await;
        drop(rx);

        let id = queue.enqueue_kind(submit("f1"), None).await.unwrap();
        assert!(queue.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminal_failure_resubmit_and_delete() {
        let (queue, db, mut rx) = setup().await;
        let id = queue.enqueue_kind(submit("f1"), None).await.unwrap();
        rx.recv().await.unwrap();

        for retry in 0..3 {
            db.actions().update(id, &ActionPatch::processing()).await.unwrap();
            db.actions().update(id, &ActionPatch::failed(retry, "HTTP 500")).await.unwrap();
        }
        assert_eq!(queue.list_failed_terminal().await.unwrap().len(), 1);
        assert_eq!(queue.count_pending().await.unwrap(), 0);

        let action = queue.resubmit(id).await.unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.retry_count, 0);
        assert!(action.last_error.is_none());
        assert_eq!(rx.recv().await.unwrap().action_id, Some(id));

        queue.delete(id).await.unwrap();
        assert!(matches!(queue.delete(id).await, Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_blob_passthrough() {
        let (queue, _db, _rx) = setup().await;
        queue.put_blob("photo-1", "image/jpeg", b"jpeg").await.unwrap();

        let blob = queue.get_blob("photo-1").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"jpeg".to_vec());
        assert!(queue.delete_blob("photo-1").await.unwrap());
    }
}
