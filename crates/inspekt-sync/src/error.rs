//! # Sync Error Types
//!
//! Error types for the cache engine, the queue facade and the orchestrator.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Network      │  │     Cache               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  CacheWrite             │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  InstallFailed          │ │
//! │  │  ConfigLoad/Save│  │  HttpStatus     │  │                         │ │
//! │  │                 │  │  Offline        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Queue / DB     │  │    Protocol     │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  InvalidMessage │  │  ChannelError           │ │
//! │  │  NotFound       │  │  Serialization  │  │  ShuttingDown           │ │
//! │  │  InvalidState   │  │  UnknownAction  │  │  InvalidLifecycle       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use inspekt_core::CoreError;
use inspekt_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all failures of the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// A URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// Transport-level failure: DNS, refused connection, reset.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote did not answer in time.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The remote answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Connectivity is down; nothing was sent.
    #[error("You are offline")]
    Offline,

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Writing into a cache generation failed.
    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    /// The shell generation could not be populated.
    #[error("Install failed: {0}")]
    InstallFailed(String),

    // =========================================================================
    // Queue / Database Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A queued action or blob does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The queue rejected a transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Malformed message from a page.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize or deserialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The queue holds an action whose type no replay route exists for.
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A lifecycle event arrived in a state that does not accept it.
    #[error("Cannot {event} while {state}")]
    InvalidLifecycle { event: String, state: String },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Worker is shutting down.
    #[error("Worker is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SyncError::NotFound(format!("{entity} {id}")),
            DbError::InvalidState(msg) => SyncError::InvalidState(msg),
            other => SyncError::DatabaseError(other.to_string()),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownActionType(t) => SyncError::UnknownActionType(t),
            CoreError::InvalidUrl(msg) => SyncError::InvalidUrl(msg),
            CoreError::RetryCountDecrease { .. } => SyncError::InvalidState(err.to_string()),
            other => SyncError::InvalidMessage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation may succeed when retried later.
    ///
    /// ## Retryable Errors
    /// - Transport failures and timeouts
    /// - 5xx, 408 and 429 responses
    /// - Being offline
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::Offline => true,
            SyncError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Returns true if the request never reached the remote.
    ///
    /// Used as a connectivity signal; an HTTP error status proves the network
    /// works.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::Offline
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error indicates a malformed message or payload.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidMessage(_)
                | SyncError::SerializationFailed(_)
                | SyncError::UnknownActionType(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout(3000).is_retryable());
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::HttpStatus { status: 503, url: "u".into() }.is_retryable());
        assert!(SyncError::HttpStatus { status: 429, url: "u".into() }.is_retryable());

        assert!(!SyncError::HttpStatus { status: 422, url: "u".into() }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::UnknownActionType("x".into()).is_retryable());
    }

    #[test]
    fn test_network_errors() {
        assert!(SyncError::Timeout(10).is_network());
        assert!(!SyncError::HttpStatus { status: 500, url: "u".into() }.is_network());
    }

    #[test]
    fn test_db_not_found_is_preserved() {
        let err: SyncError = DbError::not_found("OfflineAction", 7).into();
        assert!(matches!(err, SyncError::NotFound(ref m) if m.contains('7')));
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::HttpStatus {
            status: 500,
            url: "https://app.test/api/inspections".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500 from https://app.test/api/inspections");
        assert_eq!(SyncError::Offline.to_string(), "You are offline");
    }
}
