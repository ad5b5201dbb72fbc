//! # Error Types
//!
//! Domain-specific error types for inspekt-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  inspekt-core errors (this file)                                       │
//! │  └── CoreError        - Domain rule violations, payload decoding       │
//! │                                                                         │
//! │  inspekt-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  inspekt-sync errors (separate crate)                                  │
//! │  └── SyncError        - Network, cache, queue and channel failures     │
//! │                                                                         │
//! │  Flow: CoreError → DbError → SyncError → worker HTTP response          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A patch tried to lower an action's retry count.
    ///
    /// ## When This Occurs
    /// - A caller computed `retry_count` from a stale read
    /// - Anything other than an explicit resubmit tried to reset retries
    #[error("Retry count of action {id} cannot decrease from {current} to {requested}")]
    RetryCountDecrease {
        id: i64,
        current: i64,
        requested: i64,
    },

    /// The stored `type` does not name a known action kind.
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// The stored payload does not match the shape of its action kind.
    #[error("Invalid payload for {action_type}: {message}")]
    InvalidPayload {
        action_type: String,
        message: String,
    },

    /// A URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Unknown action status string.
    #[error("Unknown action status: {0}")]
    UnknownStatus(String),
}

impl From<url::ParseError> for CoreError {
    fn from(err: url::ParseError) -> Self {
        CoreError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = CoreError::RetryCountDecrease {
            id: 7,
            current: 2,
            requested: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("7"));
        assert!(msg.contains("from 2 to 0"));
    }
}
