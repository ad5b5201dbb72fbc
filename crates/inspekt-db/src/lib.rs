//! # inspekt-db: Durable Store for the Inspekt Sync Layer
//!
//! SQLite storage for everything the worker must keep across restarts:
//! the offline action queue, the blob store and the cache generations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Inspekt Worker Data Flow                           │
//! │                                                                         │
//! │  CacheEngine        ActionQueue / SyncAgent        Housekeeping        │
//! │       │                      │                          │               │
//! │       ▼                      ▼                          ▼               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   inspekt-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ActionRepo    │    │ 001_actions  │  │   │
//! │  │   │ SqlitePool    │◄───│ BlobRepo      │    │ 002_blobs    │  │   │
//! │  │   │ WAL, FK on    │    │ CacheRepo     │    │ 003_caches   │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data_dir>/inspekt.db                                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Action queue, blob store and cache storage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use inspekt_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/inspekt.db")).await?;
//!
//! let id = db.actions().enqueue(&new_action).await?;
//! db.blobs().put_blob("photo-1", "image/jpeg", &bytes).await?;
//! db.caches().open("inspekt-api-v3").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::action::ActionRepository;
pub use repository::blob::BlobRepository;
pub use repository::cache::{CacheRepository, CachedResponse};
