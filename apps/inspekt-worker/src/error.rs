//! # API Error Type
//!
//! Unified error type for the `/__worker/*` endpoints.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Page                          Worker                                   │
//! │  ────                          ──────                                   │
//! │                                                                         │
//! │  POST /__worker/actions                                                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Handler                                                         │  │
//! │  │  Result<Json<T>, ApiError>                                       │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  SyncError::NotFound ──────────► ApiError { NOT_FOUND } ─────► 404 │  │
//! │  │  SyncError::InvalidMessage ────► ApiError { VALIDATION } ────► 400 │  │
//! │  │  SyncError::DatabaseError ─────► ApiError { DATABASE } ──────► 500 │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The body is always JSON:
//! ```json
//! { "code": "NOT_FOUND", "message": "Not found: action 42" }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use inspekt_sync::SyncError;

/// Error returned from worker endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unknown action or blob (404)
    NotFound,

    /// Malformed request body or unknown action kind (400)
    ValidationError,

    /// Operation not allowed in the current state (409)
    Conflict,

    /// Remote unreachable (503)
    Offline,

    /// Store operation failed (500)
    DatabaseError,

    /// Worker is stopping (503)
    Unavailable,

    /// Anything else (500)
    Internal,
}

impl ErrorCode {
    pub const fn status_code(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Offline | ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let code = match &err {
            SyncError::NotFound(_) => ErrorCode::NotFound,
            SyncError::InvalidMessage(_)
            | SyncError::UnknownActionType(_)
            | SyncError::SerializationFailed(_)
            | SyncError::InvalidUrl(_) => ErrorCode::ValidationError,
            SyncError::InvalidState(_) | SyncError::InvalidLifecycle { .. } => ErrorCode::Conflict,
            SyncError::Offline | SyncError::Network(_) | SyncError::Timeout(_) => ErrorCode::Offline,
            SyncError::ShuttingDown | SyncError::ChannelError(_) => ErrorCode::Unavailable,
            SyncError::DatabaseError(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database operation failed: {}", e);
                return ApiError::new(ErrorCode::DatabaseError, "Database operation failed");
            }
            _ => ErrorCode::Internal,
        };
        ApiError::new(code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status_code(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
