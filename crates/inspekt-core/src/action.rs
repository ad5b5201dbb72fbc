//! # Action Kinds
//!
//! The queue stores mutations as `type` + opaque `data`. At the boundary
//! where pages enqueue work, the known mutation kinds are a tagged union so
//! payloads are checked once, before they become durable.
//!
//! ## Wire Format
//! ```json
//! { "type": "submitInspection", "data": { "formId": "f1", "answers": {...} } }
//! ```
//!
//! ## Replay Mapping
//! ```text
//! ┌──────────────────────┬────────┬───────────────────────────────┬──────────────────────────┐
//! │ Kind                 │ Method │ Path (relative to api base)   │ Invalidates              │
//! ├──────────────────────┼────────┼───────────────────────────────┼──────────────────────────┤
//! │ submitInspection     │ POST   │ inspections                   │ inspections, dashboard   │
//! │ updateInspection     │ PATCH  │ inspections/{id}              │ inspections, dashboard   │
//! │ deleteInspection     │ DELETE │ inspections/{id}              │ inspections, dashboard   │
//! │ uploadPhoto          │ POST   │ inspections/{id}/photos       │ inspections/{id}         │
//! │ saveDraft            │ PUT    │ drafts/{formId}               │ drafts                   │
//! │ updateProfile        │ PATCH  │ profile                       │ profile                  │
//! └──────────────────────┴────────┴───────────────────────────────┴──────────────────────────┘
//! ```
//!
//! Ids land in the path as single percent-encoded segments, so `a/b`, `7#x`
//! or `?` address exactly that entity. `.` and `..` cannot be expressed as a
//! segment at all and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::http::HttpMethod;
use crate::types::NewAction;

/// Submit a completed inspection form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SubmitInspection {
    pub form_id: String,
    #[serde(default)]
    pub equipment_id: Option<String>,
    #[ts(type = "unknown")]
    #[serde(default)]
    pub answers: Value,
}

/// Change fields of an existing inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInspection {
    pub inspection_id: String,
    #[ts(type = "unknown")]
    pub changes: Value,
}

/// Remove an inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInspection {
    pub inspection_id: String,
}

/// Attach a captured photo. The bytes live in the blob store under
/// `blob_key`; the action only references them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UploadPhoto {
    pub inspection_id: String,
    pub blob_key: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Persist an unfinished form so it survives device changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraft {
    pub form_id: String,
    #[ts(type = "unknown")]
    pub answers: Value,
}

/// Change the inspector's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[ts(type = "unknown")]
    pub changes: Value,
}

/// Known mutation kinds, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ActionKind {
    SubmitInspection(SubmitInspection),
    UpdateInspection(UpdateInspection),
    DeleteInspection(DeleteInspection),
    UploadPhoto(UploadPhoto),
    SaveDraft(SaveDraft),
    UpdateProfile(UpdateProfile),
}

/// How an action is replayed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRoute {
    pub method: HttpMethod,
    /// Path relative to the API base, without a leading slash.
    pub path: String,
}

impl ActionKind {
    /// The `type` discriminator stored in the queue.
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::SubmitInspection(_) => "submitInspection",
            ActionKind::UpdateInspection(_) => "updateInspection",
            ActionKind::DeleteInspection(_) => "deleteInspection",
            ActionKind::UploadPhoto(_) => "uploadPhoto",
            ActionKind::SaveDraft(_) => "saveDraft",
            ActionKind::UpdateProfile(_) => "updateProfile",
        }
    }

    /// Splits the tagged value into the queue's `type` + opaque `data`.
    pub fn into_new_action(self, metadata: Option<Value>) -> CoreResult<NewAction> {
        let action_type = self.type_name();
        self.replay_route()?;
        let mut tagged = serde_json::to_value(&self).map_err(|e| CoreError::InvalidPayload {
            action_type: action_type.to_string(),
            message: e.to_string(),
        })?;

        let data = tagged
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);

        Ok(NewAction {
            action_type: action_type.to_string(),
            data,
            metadata,
        })
    }

    /// Rebuilds the tagged value from a stored `type` + `data`.
    pub fn from_parts(action_type: &str, data: &Value) -> CoreResult<Self> {
        let tagged = serde_json::json!({ "type": action_type, "data": data });
        let kind: ActionKind = serde_json::from_value(tagged).map_err(|e| {
            if e.to_string().contains("unknown variant") {
                CoreError::UnknownActionType(action_type.to_string())
            } else {
                CoreError::InvalidPayload {
                    action_type: action_type.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        kind.replay_route()?;
        Ok(kind)
    }

    /// HTTP method and path used to replay this mutation.
    pub fn replay_route(&self) -> CoreResult<ReplayRoute> {
        let segment = |value: &str| path_segment(self.type_name(), value);
        let (method, path) = match self {
            ActionKind::SubmitInspection(_) => (HttpMethod::Post, "inspections".to_string()),
            ActionKind::UpdateInspection(a) => {
                (HttpMethod::Patch, format!("inspections/{}", segment(&a.inspection_id)?))
            }
            ActionKind::DeleteInspection(a) => {
                (HttpMethod::Delete, format!("inspections/{}", segment(&a.inspection_id)?))
            }
            ActionKind::UploadPhoto(a) => {
                (HttpMethod::Post, format!("inspections/{}/photos", segment(&a.inspection_id)?))
            }
            ActionKind::SaveDraft(a) => (HttpMethod::Put, format!("drafts/{}", segment(&a.form_id)?)),
            ActionKind::UpdateProfile(_) => (HttpMethod::Patch, "profile".to_string()),
        };
        Ok(ReplayRoute { method, path })
    }

    /// API path segments whose cached reads are stale once this mutation
    /// has been applied remotely.
    pub fn invalidates(&self) -> Vec<String> {
        match self {
            ActionKind::SubmitInspection(_)
            | ActionKind::UpdateInspection(_)
            | ActionKind::DeleteInspection(_) => {
                vec!["inspections".to_string(), "dashboard".to_string()]
            }
            ActionKind::UploadPhoto(a) => {
                vec![format!("inspections/{}", urlencoding::encode(&a.inspection_id))]
            }
            ActionKind::SaveDraft(_) => vec!["drafts".to_string()],
            ActionKind::UpdateProfile(_) => vec!["profile".to_string()],
        }
    }

    /// Key reported to pages in `FORM_SYNCED`.
    pub fn entity_key(&self) -> String {
        match self {
            ActionKind::SubmitInspection(a) => a.form_id.clone(),
            ActionKind::SaveDraft(a) => a.form_id.clone(),
            ActionKind::UpdateInspection(a) => a.inspection_id.clone(),
            ActionKind::DeleteInspection(a) => a.inspection_id.clone(),
            ActionKind::UploadPhoto(a) => a.blob_key.clone(),
            ActionKind::UpdateProfile(_) => "profile".to_string(),
        }
    }

    /// Blob referenced by this action, if any.
    pub fn blob_key(&self) -> Option<&str> {
        match self {
            ActionKind::UploadPhoto(a) => Some(&a.blob_key),
            _ => None,
        }
    }

    /// JSON body sent on replay. Photo uploads send the blob bytes instead.
    pub fn request_body(&self) -> Option<Value> {
        match self {
            ActionKind::SubmitInspection(a) => serde_json::to_value(a).ok(),
            ActionKind::UpdateInspection(a) => Some(a.changes.clone()),
            ActionKind::DeleteInspection(_) => None,
            ActionKind::UploadPhoto(_) => None,
            ActionKind::SaveDraft(a) => Some(a.answers.clone()),
            ActionKind::UpdateProfile(a) => Some(a.changes.clone()),
        }
    }
}

/// Percent-encodes a caller value as exactly one path segment.
///
/// Empty, `.` and `..` are rejected: dots are unreserved, so encoding
/// leaves them as dot segments that URL resolution collapses.
pub fn path_segment(action_type: &str, value: &str) -> CoreResult<String> {
    if matches!(value, "" | "." | "..") {
        return Err(CoreError::InvalidPayload {
            action_type: action_type.to_string(),
            message: format!("{value:?} is not a valid path segment"),
        });
    }
    Ok(urlencoding::encode(value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submit(form_id: &str) -> ActionKind {
        ActionKind::SubmitInspection(SubmitInspection {
            form_id: form_id.into(),
            equipment_id: Some("pump-7".into()),
            answers: json!({ "leak": false }),
        })
    }

    #[test]
    fn test_into_new_action_splits_type_and_data() {
        let new_action = submit("f1").into_new_action(None).unwrap();
        assert_eq!(new_action.action_type, "submitInspection");
        assert_eq!(new_action.data["formId"], "f1");
        assert_eq!(new_action.data["equipmentId"], "pump-7");
        assert!(new_action.metadata.is_none());
    }

    #[test]
    fn test_from_parts_rebuilds_kind() {
        let kind = ActionKind::from_parts("submitInspection", &json!({ "formId": "f1" })).unwrap();
        assert_eq!(kind.entity_key(), "f1");
        assert_eq!(kind.replay_route().unwrap().method, HttpMethod::Post);
    }

    #[test]
    fn test_from_parts_unknown_type() {
        let err = ActionKind::from_parts("launchRocket", &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::UnknownActionType(t) if t == "launchRocket"));
    }

    #[test]
    fn test_from_parts_bad_payload() {
        let err = ActionKind::from_parts("deleteInspection", &json!({ "nope": 1 })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayload { .. }));
    }

    #[test]
    fn test_replay_routes() {
        let update = ActionKind::UpdateInspection(UpdateInspection {
            inspection_id: "i-9".into(),
            changes: json!({ "notes": "ok" }),
        });
        let route = update.replay_route().unwrap();
        assert_eq!(route.method, HttpMethod::Patch);
        assert_eq!(route.path, "inspections/i-9");

        let photo = ActionKind::UploadPhoto(UploadPhoto {
            inspection_id: "i-9".into(),
            blob_key: "photo-1".into(),
            file_name: None,
        });
        assert_eq!(photo.replay_route().unwrap().path, "inspections/i-9/photos");
        assert_eq!(photo.blob_key(), Some("photo-1"));
        assert_eq!(photo.invalidates(), vec!["inspections/i-9".to_string()]);
        assert!(photo.request_body().is_none());
    }

    #[test]
    fn test_ids_are_single_encoded_segments() {
        let route = |id: &str| {
            ActionKind::DeleteInspection(DeleteInspection { inspection_id: id.into() })
                .replay_route()
                .unwrap()
                .path
        };
        assert_eq!(route("../profile"), "inspections/..%2Fprofile");
        assert_eq!(route("a/b"), "inspections/a%2Fb");
        assert_eq!(route("7#x"), "inspections/7%23x");
        assert_eq!(route("?"), "inspections/%3F");
        assert_eq!(route("50%"), "inspections/50%25");
    }

    #[test]
    fn test_dot_segments_are_rejected() {
        for id in ["", ".", ".."] {
            let err = ActionKind::from_parts("deleteInspection", &json!({ "inspectionId": id }))
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidPayload { .. }), "{id:?}");
        }
        let kind = ActionKind::SaveDraft(SaveDraft { form_id: ".".into(), answers: json!({}) });
        assert!(kind.into_new_action(None).is_err());
        assert!(path_segment("archiveForm", "..").is_err());
        assert_eq!(path_segment("archiveForm", "...").unwrap(), "...");
        assert_eq!(path_segment("archiveForm", "%2e%2e").unwrap(), "%252e%252e");
    }

    #[test]
    fn test_tagged_wire_format() {
        let json = serde_json::to_value(submit("f2")).unwrap();
        assert_eq!(json["type"], "submitInspection");
        assert_eq!(json["data"]["formId"], "f2");
    }
}
