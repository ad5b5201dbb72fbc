//! # Repository Module
//!
//! Database repositories for the worker store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SyncAgent                                                             │
//! │       │                                                                 │
//! │       │  db.actions().list_eligible(3)                                 │
//! │       ▼                                                                 │
//! │  ActionRepository                                                      │
//! │  ├── enqueue / get / update / delete                                   │
//! │  ├── list_pending / list_eligible / list_failed_terminal               │
//! │  └── clear_completed / recover_stale_processing / resubmit             │
//! │       │                                                                 │
//! │       │  SQL (one statement or transaction per call)                   │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ActionRepository`](action::ActionRepository) - Offline action queue
//! - [`BlobRepository`](blob::BlobRepository) - Binary payloads with age eviction
//! - [`CacheRepository`](cache::CacheRepository) - Cache generations and entries

pub mod action;
pub mod blob;
pub mod cache;
