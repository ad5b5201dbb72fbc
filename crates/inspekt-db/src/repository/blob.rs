//! # Blob Repository
//!
//! Large binary payloads (captured photos) referenced by key from action
//! payloads. Kept out of `offline_actions` so queue scans stay cheap.

use chrono::{DateTime, TimeDelta, Utc};
use inspekt_core::BlobRecord;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct BlobRow {
    key: String,
    content_type: String,
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl From<BlobRow> for BlobRecord {
    fn from(row: BlobRow) -> Self {
        BlobRecord {
            key: row.key,
            content_type: row.content_type,
            bytes: row.bytes,
            created_at: row.created_at,
        }
    }
}

/// Repository for the blob store.
#[derive(Debug, Clone)]
pub struct BlobRepository {
    pool: SqlitePool,
}

impl BlobRepository {
    /// Creates a new BlobRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BlobRepository { pool }
    }

    /// Stores a blob, replacing any previous blob under the same key.
    ///
    /// Replacing resets `created_at`, so a re-captured photo gets a fresh
    /// retention window.
    pub async fn put_blob(&self, key: &str, content_type: &str, bytes: &[u8]) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blobs (key, content_type, bytes, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (key) DO UPDATE SET
                content_type = excluded.content_type,
                bytes = excluded.bytes,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(bytes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(key, size = bytes.len(), "Blob stored");
        Ok(())
    }

    /// Gets a blob by key.
    pub async fn get_blob(&self, key: &str) -> DbResult<Option<BlobRecord>> {
        let row: Option<BlobRow> = sqlx::query_as(
            "SELECT key, content_type, bytes, created_at FROM blobs WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BlobRecord::from))
    }

    /// Deletes a blob.
    ///
    /// ## Returns
    /// `true` if a blob was removed.
    pub async fn delete_blob(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM blobs WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes blobs stored more than `max_age` ago.
    ///
    /// Blobs still referenced by an `uploadPhoto` action that has not
    /// completed are kept whatever their age, terminal failures included,
    /// since those can still be resubmitted.
    ///
    /// ## Returns
    /// Number of evicted blobs.
    pub async fn evict_blobs_older_than(&self, max_age: TimeDelta) -> DbResult<u64> {
        let cutoff = Utc::now() - max_age;

        let result = sqlx::query(
            r#"
            DELETE FROM blobs
            WHERE created_at < ?1
              AND NOT EXISTS (
                  SELECT 1 FROM offline_actions a
                  WHERE a.action_type = 'uploadPhoto'
                    AND a.status != 'completed'
                    AND json_extract(a.data, '$.blobKey') = blobs.key
              )
            "#,
        )
        .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let evicted = result.rows_affected();
        if evicted > 0 {
            info!(evicted, "Evicted expired blobs");
        }
        Ok(evicted)
    }

    /// Number of stored blobs.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use inspekt_core::{ActionPatch, NewAction};
    use serde_json::json;

    async fn repo() -> BlobRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().blobs()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let repo = repo().await;
        repo.put_blob("photo-1", "image/jpeg", &[0xff, 0xd8, 0xff]).await.unwrap();

        let blob = repo.get_blob("photo-1").await.unwrap().unwrap();
        assert_eq!(blob.content_type, "image/jpeg");
        assert_eq!(blob.bytes, vec![0xff, 0xd8, 0xff]);
        assert!(repo.get_blob("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let repo = repo().await;
        repo.put_blob("photo-1", "image/jpeg", b"old").await.unwrap();
        repo.put_blob("photo-1", "image/png", b"new").await.unwrap();

        let blob = repo.get_blob("photo-1").await.unwrap().unwrap();
        assert_eq!(blob.content_type, "image/png");
        assert_eq!(blob.bytes, b"new".to_vec());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_blob() {
        let repo = repo().await;
        repo.put_blob("photo-1", "image/jpeg", b"x").await.unwrap();

        assert!(repo.delete_blob("photo-1").await.unwrap());
        assert!(!repo.delete_blob("photo-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_eviction_by_age() {
        let repo = repo().await;
        repo.put_blob("photo-1", "image/jpeg", b"x").await.unwrap();

        assert_eq!(repo.evict_blobs_older_than(TimeDelta::days(7)).await.unwrap(), 0);
        assert_eq!(repo.count().await.unwrap(), 1);

        // Zero retention evicts anything stored before now
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(repo.evict_blobs_older_than(TimeDelta::zero()).await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_eviction_keeps_blobs_of_unfinished_uploads() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.blobs();
        repo.put_blob("queued", "image/jpeg", b"a").await.unwrap();
        repo.put_blob("uploaded", "image/jpeg", b"b").await.unwrap();
        repo.put_blob("orphan", "image/jpeg", b"c").await.unwrap();

        let upload = |key: &str| NewAction {
            action_type: "uploadPhoto".into(),
            data: json!({ "inspectionId": "i-1", "blobKey": key }),
            metadata: None,
        };
        db.actions().enqueue(&upload("queued")).await.unwrap();
        let done = db.actions().enqueue(&upload("uploaded")).await.unwrap();
        db.actions().update(done, &ActionPatch::completed()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(repo.evict_blobs_older_than(TimeDelta::zero()).await.unwrap(), 2);
        assert!(repo.get_blob("queued").await.unwrap().is_some());
        assert!(repo.get_blob("uploaded").await.unwrap().is_none());
        assert!(repo.get_blob("orphan").await.unwrap().is_none());
    }
}
