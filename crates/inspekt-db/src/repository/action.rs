//! # Offline Action Repository
//!
//! The durable queue of mutations waiting for replay.
//!
//! ## Queue Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Offline Action Queue                                 │
//! │                                                                         │
//! │  FOREGROUND MUTATION (network unavailable)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue() ── INSERT status='pending', retry_count=0                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    DRAIN (sequential)                           │   │
//! │  │                                                                 │   │
//! │  │  recover_stale_processing()  processing too long → pending     │   │
//! │  │  list_eligible(3)            pending + failed with budget,     │   │
//! │  │                              ORDER BY timestamp, id            │   │
//! │  │  for each:                                                      │   │
//! │  │    update(processing)                                           │   │
//! │  │    replay ──ok──► update(completed)                             │   │
//! │  │           └fail─► update(failed, retry_count + 1, last_error)   │   │
//! │  │  clear_completed()                                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Every call is one statement or one transaction                      │
//! │  • retry_count never decreases through update()                        │
//! │  • Terminal failures stay until delete() or resubmit()                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use inspekt_core::{ActionPatch, ActionStatus, NewAction, OfflineAction};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

const SELECT_COLUMNS: &str = r#"
    SELECT id, action_type, data, timestamp, status,
           retry_count, last_error, metadata, updated_at
    FROM offline_actions
"#;

/// Raw row; JSON columns are stored as text.
#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    id: i64,
    action_type: String,
    data: String,
    timestamp: DateTime<Utc>,
    status: ActionStatus,
    retry_count: i64,
    last_error: Option<String>,
    metadata: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ActionRow> for OfflineAction {
    type Error = DbError;

    fn try_from(row: ActionRow) -> DbResult<Self> {
        let metadata = match row.metadata {
            Some(ref text) => Some(serde_json::from_str(text)?),
            None => None,
        };

        Ok(OfflineAction {
            id: row.id,
            action_type: row.action_type,
            data: serde_json::from_str(&row.data)?,
            timestamp: row.timestamp,
            status: row.status,
            retry_count: row.retry_count,
            last_error: row.last_error,
            metadata,
            updated_at: row.updated_at,
        })
    }
}

fn into_actions(rows: Vec<ActionRow>) -> DbResult<Vec<OfflineAction>> {
    rows.into_iter().map(OfflineAction::try_from).collect()
}

/// Repository for the offline action queue.
#[derive(Debug, Clone)]
pub struct ActionRepository {
    pool: SqlitePool,
}

impl ActionRepository {
    /// Creates a new ActionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActionRepository { pool }
    }

    /// Persists a new action as `pending` with a zero retry count.
    ///
    /// The payload is stored verbatim and never validated.
    ///
    /// ## Returns
    /// The store-assigned id.
    pub async fn enqueue(&self, action: &NewAction) -> DbResult<i64> {
        let now = Utc::now();
        let data = serde_json::to_string(&action.data)?;
        let metadata = action
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO offline_actions (
                action_type, data, timestamp, status,
                retry_count, last_error, metadata, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?3)
            "#,
        )
        .bind(&action.action_type)
        .bind(data)
        .bind(now)
        .bind(ActionStatus::Pending)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, action_type = %action.action_type, "Action enqueued");
        Ok(id)
    }

    /// Gets an action by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<OfflineAction>> {
        let row: Option<ActionRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(OfflineAction::try_from).transpose()
    }

    /// All `pending` actions, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<OfflineAction>> {
        self.list_by_status(ActionStatus::Pending).await
    }

    /// All actions with the given status, oldest first.
    pub async fn list_by_status(&self, status: ActionStatus) -> DbResult<Vec<OfflineAction>> {
        let rows: Vec<ActionRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY timestamp ASC, id ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        into_actions(rows)
    }

    /// The drain input: `pending` actions plus `failed` ones that still have
    /// retry budget, oldest first.
    pub async fn list_eligible(&self, max_retries: i64) -> DbResult<Vec<OfflineAction>> {
        let rows: Vec<ActionRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS}
            WHERE status = ?1
               OR (status = ?2 AND retry_count < ?3)
            ORDER BY timestamp ASC, id ASC"#
        ))
        .bind(ActionStatus::Pending)
        .bind(ActionStatus::Failed)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        into_actions(rows)
    }

    /// Failed actions that exhausted their retry budget.
    pub async fn list_failed_terminal(&self, max_retries: i64) -> DbResult<Vec<OfflineAction>> {
        let rows: Vec<ActionRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS}
            WHERE status = ?1 AND retry_count >= ?2
            ORDER BY timestamp ASC, id ASC"#
        ))
        .bind(ActionStatus::Failed)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        into_actions(rows)
    }

    /// Number of actions still waiting for replay (pending + retryable failed).
    pub async fn count_pending(&self, max_retries: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM offline_actions
            WHERE status = ?1
               OR (status = ?2 AND retry_count < ?3)
            "#,
        )
        .bind(ActionStatus::Pending)
        .bind(ActionStatus::Failed)
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Merges a patch into an action (read-modify-write in one transaction).
    ///
    /// ## Errors
    /// * `NotFound` - no action with this id
    /// * `InvalidState` - the patch lowers `retry_count`
    pub async fn update(&self, id: i64, patch: &ActionPatch) -> DbResult<OfflineAction> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ActionRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut action = match row {
            Some(row) => OfflineAction::try_from(row)?,
            None => return Err(DbError::not_found("OfflineAction", id)),
        };

        action.apply(patch, Utc::now())?;

        let metadata = action
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE offline_actions SET
                status = ?2,
                retry_count = ?3,
                last_error = ?4,
                metadata = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(action.status)
        .bind(action.retry_count)
        .bind(&action.last_error)
        .bind(metadata)
        .bind(action.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            id,
            status = %action.status,
            retry_count = action.retry_count,
            "Action updated"
        );
        Ok(action)
    }

    /// Deletes every `completed` action.
    ///
    /// ## Returns
    /// Number of deleted actions.
    pub async fn clear_completed(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM offline_actions WHERE status = ?1")
            .bind(ActionStatus::Completed)
            .execute(&self.pool)
            .await?;

        let cleared = result.rows_affected();
        if cleared > 0 {
            debug!(cleared, "Completed actions garbage-collected");
        }
        Ok(cleared)
    }

    /// Demotes `processing` actions untouched for longer than `grace` back to
    /// `pending`. Retry counts are left as they are.
    ///
    /// An action stays `processing` only if the worker died mid-replay.
    ///
    /// ## Returns
    /// Number of recovered actions.
    pub async fn recover_stale_processing(&self, grace: TimeDelta) -> DbResult<u64> {
        let now = Utc::now();
        let cutoff = now - grace;

        let result = sqlx::query(
            r#"
            UPDATE offline_actions SET
                status = ?1,
                updated_at = ?2
            WHERE status = ?3 AND updated_at < ?4
            "#,
        )
        .bind(ActionStatus::Pending)
        .bind(now)
        .bind(ActionStatus::Processing)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "Recovered actions stuck in processing");
        }
        Ok(recovered)
    }

    /// Removes an action on explicit user request.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM offline_actions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OfflineAction", id));
        }

        info!(id, "Action deleted by user");
        Ok(())
    }

    /// Puts a failed action back in line with a fresh retry budget.
    ///
    /// The only path that lowers `retry_count`; only ever called on explicit
    /// user request.
    ///
    /// ## Errors
    /// * `NotFound` - no action with this id
    /// * `InvalidState` - the action is not `failed`
    pub async fn resubmit(&self, id: i64) -> DbResult<OfflineAction> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ActionRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut action = match row {
            Some(row) => OfflineAction::try_from(row)?,
            None => return Err(DbError::not_found("OfflineAction", id)),
        };

        if action.status != ActionStatus::Failed {
            return Err(DbError::InvalidState(format!(
                "action {id} is {}, only failed actions can be resubmitted",
                action.status
            )));
        }

        action.status = ActionStatus::Pending;
        action.retry_count = 0;
        action.last_error = None;
        action.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE offline_actions SET
                status = ?2,
                retry_count = 0,
                last_error = NULL,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(action.status)
        .bind(action.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(id, "Action resubmitted by user");
        Ok(action)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
