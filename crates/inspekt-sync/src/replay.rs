//! # Action Replay
//!
//! Turns a queued [`OfflineAction`] back into the HTTP request the page
//! would have sent while online.
//!
//! ## Request Mapping
//! ```text
//! known type   ──► ActionKind::replay_route()   e.g. POST /api/inspections
//!                  body: JSON payload, or the referenced blob's bytes
//! unknown type ──► POST {api_base}/actions/{type}
//!                  body: the stored data, unchanged
//! ```
//!
//! Every replay carries `x-inspekt-action-id` so the remote can deduplicate
//! a mutation that was applied but whose response was lost.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use inspekt_core::action::path_segment;
use inspekt_core::{ActionKind, CoreError, HttpRequest, OfflineAction, RequestMode};
use inspekt_db::BlobRepository;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::network::Fetcher;

/// Header carrying the queue id of a replayed action.
pub const ACTION_ID_HEADER: &str = "x-inspekt-action-id";

/// What a successful replay reports back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReceipt {
    /// Key broadcast in `FORM_SYNCED`.
    pub key: String,
    /// API path prefixes whose cached reads are now stale.
    pub invalidates: Vec<String>,
    /// Blob the remote now holds; the local copy can go.
    pub uploaded_blob: Option<String>,
}

/// Sends one queued action to the remote.
#[async_trait]
pub trait ActionReplayer: Send + Sync {
    /// `Ok` only for a 2xx; anything else is a failure with a message.
    async fn replay(&self, action: &OfflineAction) -> SyncResult<ReplayReceipt>;
}

/// [`ActionReplayer`] that talks HTTP through a [`Fetcher`].
pub struct HttpReplayer {
    fetcher: Arc<dyn Fetcher>,
    blobs: BlobRepository,
    config: Arc<SyncConfig>,
}

impl HttpReplayer {
    pub fn new(fetcher: Arc<dyn Fetcher>, blobs: BlobRepository, config: Arc<SyncConfig>) -> Self {
        HttpReplayer {
            fetcher,
            blobs,
            config,
        }
    }

    async fn build(&self, action: &OfflineAction) -> SyncResult<(HttpRequest, ReplayReceipt)> {
        let kind = match ActionKind::from_parts(&action.action_type, &action.data) {
            Ok(kind) => kind,
            Err(CoreError::UnknownActionType(action_type)) => {
                return self.build_generic(action, &action_type);
            }
            Err(e) => return Err(e.into()),
        };

        let route = kind.replay_route()?;
        let mut request = HttpRequest {
            method: route.method,
            url: self.config.api_url(&route.path)?,
            headers: Vec::new(),
            body: None,
            mode: RequestMode::Cors,
        };

        if let ActionKind::UploadPhoto(ref photo) = kind {
            let blob = self
                .blobs
                .get_blob(&photo.blob_key)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("blob {}", photo.blob_key)))?;
            request = request
                .with_header("content-type", blob.content_type)
                .with_body(blob.bytes);
            if let Some(ref name) = photo.file_name {
                request = request.with_header("x-file-name", name.clone());
            }
        } else if let Some(body) = kind.request_body() {
            request = request
                .with_header("content-type", "application/json")
                .with_body(serde_json::to_vec(&body)?);
        }

        let receipt = ReplayReceipt {
            key: kind.entity_key(),
            invalidates: kind
                .invalidates()
                .iter()
                .map(|segment| self.config.api_path(segment))
                .collect(),
            uploaded_blob: kind.blob_key().map(str::to_owned),
        };

        Ok((request, receipt))
    }

    fn build_generic(
        &self,
        action: &OfflineAction,
        action_type: &str,
    ) -> SyncResult<(HttpRequest, ReplayReceipt)> {
        debug!(id = action.id, action_type, "Replaying unknown action type generically");

        let segment = path_segment(action_type, action_type)?;
        let request = HttpRequest {
            method: inspekt_core::HttpMethod::Post,
            url: self.config.api_url(&format!("actions/{segment}"))?,
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(serde_json::to_vec(&action.data)?),
            mode: RequestMode::Cors,
        };

        Ok((
            request,
            ReplayReceipt {
                key: action.id.to_string(),
                invalidates: Vec::new(),
                uploaded_blob: None,
            },
        ))
    }
}

#[async_trait]
impl ActionReplayer for HttpReplayer {
    async fn replay(&self, action: &OfflineAction) -> SyncResult<ReplayReceipt> {
        let (request, receipt) = self.build(action).await?;
        let request = request.with_header(ACTION_ID_HEADER, action.id.to_string());

        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(SyncError::HttpStatus {
                status: response.status,
                url: request.url.to_string(),
            });
        }

        debug!(
            id = action.id,
            method = %request.method,
            url = %request.url,
            status = response.status,
            "Action replayed"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MockFetcher, MockReply};
    use chrono::Utc;
    use inspekt_core::ActionStatus;
    use inspekt_db::{Database, DbConfig};
    use serde_json::{json, Value};

    fn action(id: i64, action_type: &str, data: Value) -> OfflineAction {
        OfflineAction {
            id,
            action_type: action_type.into(),
            data,
            timestamp: Utc::now(),
            status: ActionStatus::Processing,
            retry_count: 0,
            last_error: None,
            metadata: None,
            updated_at: Utc::now(),
        }
    }

    async fn setup() -> (HttpReplayer, Arc<MockFetcher>, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockFetcher::new());
        let mut config = SyncConfig::default();
        config.remote.origin = "https://app.test".into();
        let replayer = HttpReplayer::new(mock.clone(), db.blobs(), Arc::new(config));
        (replayer, mock, db)
    }

    #[tokio::test]
    async fn test_submit_inspection_replay() {
        let (replayer, mock, _db) = setup().await;
        mock.on("POST", "https://app.test/api/inspections", MockReply::status(201));

        let receipt = replayer
            .replay(&action(1, "submitInspection", json!({ "formId": "f1", "answers": {} })))
            .await
            .unwrap();

        assert_eq!(receipt.key, "f1");
        assert_eq!(receipt.invalidates, vec!["/api/inspections", "/api/dashboard"]);

        let body: Value = serde_json::from_slice(&mock.bodies()[0].clone().unwrap()).unwrap();
        assert_eq!(body["formId"], "f1");
    }

    #[tokio::test]
    async fn test_non_success_is_failure() {
        let (replayer, mock, _db) = setup().await;
        mock.on("PATCH", "https://app.test/api/profile", MockReply::status(422));

        let err = replayer
            .replay(&action(2, "updateProfile", json!({ "changes": { "name": "A" } })))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_photo_upload_sends_blob() {
        let (replayer, mock, db) = setup().await;
        db.blobs().put_blob("photo-9", "image/jpeg", b"jpegbytes").await.unwrap();
        mock.on("POST", "https://app.test/api/inspections/i-1/photos", MockReply::status(200));

        let receipt = replayer
            .replay(&action(
                3,
                "uploadPhoto",
                json!({ "inspectionId": "i-1", "blobKey": "photo-9" }),
            ))
            .await
            .unwrap();

        assert_eq!(receipt.invalidates, vec!["/api/inspections/i-1"]);
        assert_eq!(receipt.uploaded_blob.as_deref(), Some("photo-9"));
        assert_eq!(mock.bodies()[0], Some(b"jpegbytes".to_vec()));
    }

    #[tokio::test]
    async fn test_photo_upload_without_blob_fails_offline() {
        let (replayer, mock, _db) = setup().await;

        let err = replayer
            .replay(&action(
                4,
                "uploadPhoto",
                json!({ "inspectionId": "i-1", "blobKey": "gone" }),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_uses_generic_route() {
        let (replayer, mock, _db) = setup().await;
        mock.on("POST", "https://app.test/api/actions/archiveForm", MockReply::status(204));

        let receipt = replayer
            .replay(&action(5, "archiveForm", json!({ "formId": "f3" })))
            .await
            .unwrap();

        assert_eq!(receipt.key, "5");
        assert!(receipt.invalidates.is_empty());
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_their_route() {
        let (replayer, mock, _db) = setup().await;
        mock.on("DELETE", "https://app.test/api/inspections/..%2Fprofile", MockReply::status(204))
            .on("PATCH", "https://app.test/api/inspections/7%23x", MockReply::status(200))
            .on("PUT", "https://app.test/api/drafts/a%2Fb", MockReply::status(200))
            .on("DELETE", "https://app.test/api/inspections/%3F", MockReply::status(204))
            .on("POST", "https://app.test/api/actions/..%2F..%2Fadmin%2Fwipe", MockReply::status(204));

        replayer
            .replay(&action(1, "deleteInspection", json!({ "inspectionId": "../profile" })))
            .await
            .unwrap();
        replayer
            .replay(&action(
                2,
                "updateInspection",
                json!({ "inspectionId": "7#x", "changes": { "notes": "ok" } }),
            ))
            .await
            .unwrap();
        replayer
            .replay(&action(3, "saveDraft", json!({ "formId": "a/b", "answers": {} })))
            .await
            .unwrap();
        replayer
            .replay(&action(4, "deleteInspection", json!({ "inspectionId": "?" })))
            .await
            .unwrap();
        replayer
            .replay(&action(5, "../../admin/wipe", json!({})))
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 5);
        assert_eq!(mock.calls_to("DELETE", "https://app.test/api/profile"), 0);
        assert_eq!(mock.calls_to("PATCH", "https://app.test/api/inspections/7"), 0);
        assert_eq!(mock.calls_to("POST", "https://app.test/admin/wipe"), 0);
    }

    #[tokio::test]
    async fn test_dot_segment_id_is_failure() {
        let (replayer, mock, _db) = setup().await;

        let err = replayer
            .replay(&action(6, "deleteInspection", json!({ "inspectionId": ".." })))
            .await
            .unwrap_err();
        assert!(err.is_protocol_error());

        let err = replayer.replay(&action(7, "..", json!({}))).await.unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_failure() {
        let (replayer, mock, _db) = setup().await;

        let err = replayer
            .replay(&action(6, "deleteInspection", json!({ "wrong": true })))
            .await
            .unwrap_err();

        assert!(err.is_protocol_error());
        assert_eq!(mock.call_count(), 0);
    }
}
