//! # Cache Repository
//!
//! Durable storage behind the cache strategy engine: named generations of
//! request → response pairs.
//!
//! ## Storage Layout
//! ```text
//! cache_generations                 cache_entries
//! ┌──────────────────────┐          ┌──────────────────────────────────────┐
//! │ inspekt-shell-v3     │◄─────────│ generation, request_key (PK)         │
//! │ inspekt-dynamic-v3   │  CASCADE │ url, path, status, headers, body     │
//! │ inspekt-api-v3       │          │ stored_at                            │
//! └──────────────────────┘          └──────────────────────────────────────┘
//! ```
//!
//! Deleting a generation deletes its entries. Callers only ever store 2xx
//! responses; the repository does not enforce it.

use chrono::{DateTime, Utc};
use inspekt_core::HttpResponse;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// A stored response together with the request it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub generation: String,
    pub request_key: String,
    pub url: String,
    pub response: HttpResponse,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    generation: String,
    request_key: String,
    url: String,
    status: i64,
    headers: String,
    body: Vec<u8>,
    stored_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for CachedResponse {
    type Error = DbError;

    fn try_from(row: EntryRow) -> DbResult<Self> {
        let status = u16::try_from(row.status)
            .map_err(|_| DbError::Internal(format!("invalid cached status {}", row.status)))?;
        let headers: Vec<(String, String)> = serde_json::from_str(&row.headers)?;

        Ok(CachedResponse {
            generation: row.generation,
            request_key: row.request_key,
            url: row.url,
            response: HttpResponse {
                status,
                headers,
                body: row.body,
            },
            stored_at: row.stored_at,
        })
    }
}

/// Repository for cache generations and their entries.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    /// Creates a new CacheRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    // =========================================================================
    // Generations
    // =========================================================================

    /// Creates a generation if it doesn't exist yet.
    pub async fn open(&self, generation: &str) -> DbResult<()> {
        sqlx::query("INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?1, ?2)")
            .bind(generation)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// True if the generation exists.
    pub async fn has(&self, generation: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_generations WHERE name = ?1")
            .bind(generation)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Names of every stored generation.
    pub async fn list_generations(&self) -> DbResult<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM cache_generations ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(names)
    }

    /// Deletes a generation and all of its entries.
    ///
    /// ## Returns
    /// `true` if the generation existed.
    pub async fn delete_generation(&self, generation: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM cache_generations WHERE name = ?1")
            .bind(generation)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            debug!(generation, "Cache generation deleted");
        }
        Ok(deleted)
    }

    /// Deletes every generation.
    ///
    /// ## Returns
    /// Number of deleted generations.
    pub async fn delete_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cache_generations")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Looks up the stored response for a request key.
    pub async fn match_entry(
        &self,
        generation: &str,
        request_key: &str,
    ) -> DbResult<Option<CachedResponse>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT generation, request_key, url, status, headers, body, stored_at
            FROM cache_entries
            WHERE generation = ?1 AND request_key = ?2
            "#,
        )
        .bind(generation)
        .bind(request_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedResponse::try_from).transpose()
    }

    /// Stores (or overwrites) a response, opening the generation if needed.
    pub async fn put(
        &self,
        generation: &str,
        request_key: &str,
        url: &str,
        path: &str,
        response: &HttpResponse,
    ) -> DbResult<()> {
        let headers = serde_json::to_string(&response.headers)?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?1, ?2)")
            .bind(generation)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (
                generation, request_key, url, path, status, headers, body, stored_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (generation, request_key) DO UPDATE SET
                url = excluded.url,
                path = excluded.path,
                status = excluded.status,
                headers = excluded.headers,
                body = excluded.body,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(generation)
        .bind(request_key)
        .bind(url)
        .bind(path)
        .bind(i64::from(response.status))
        .bind(headers)
        .bind(&response.body)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(generation, request_key, size = response.body.len(), "Response cached");
        Ok(())
    }

    /// Deletes one entry.
    pub async fn delete_entry(&self, generation: &str, request_key: &str) -> DbResult<bool> {
        let result =
            sqlx::query("DELETE FROM cache_entries WHERE generation = ?1 AND request_key = ?2")
                .bind(generation)
                .bind(request_key)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every entry of a generation whose URL path starts with
    /// `path_prefix`.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn delete_by_path_prefix(&self, generation: &str, path_prefix: &str) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE generation = ?1
              AND substr(path, 1, length(?2)) = ?2
            "#,
        )
        .bind(generation)
        .bind(path_prefix)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Request keys stored in a generation.
    pub async fn keys(&self, generation: &str) -> DbResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT request_key FROM cache_entries WHERE generation = ?1 ORDER BY request_key ASC",
        )
        .bind(generation)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Number of entries in a generation.
    pub async fn entry_count(&self, generation: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries WHERE generation = ?1")
            .bind(generation)
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

    async fn repo() -> CacheRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().caches()
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse::new(200, body).with_header("content-type", "application/json")
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let repo = repo().await;
        repo.open("inspekt-shell-v1").await.unwrap();
        repo.open("inspekt-shell-v1").await.unwrap();

        assert!(repo.has("inspekt-shell-v1").await.unwrap());
        assert_eq!(repo.list_generations().await.unwrap(), vec!["inspekt-shell-v1"]);
        assert_eq!(repo.entry_count("inspekt-shell-v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let repo = repo().await;
        let url = "https://app.test/api/forms";
        repo.put("inspekt-api-v1", "GET https://app.test/api/forms", url, "/api/forms", &ok("[]"))
            .await
            .unwrap();

        let hit = repo
            .match_entry("inspekt-api-v1", "GET https://app.test/api/forms")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.url, url);
        assert_eq!(hit.response.status, 200);
        assert_eq!(hit.response.body, b"[]".to_vec());
        assert_eq!(hit.response.header("Content-Type"), Some("application/json"));

        // Generation was opened implicitly
        assert!(repo.has("inspekt-api-v1").await.unwrap());
        assert!(repo
            .match_entry("inspekt-dynamic-v1", "GET https://app.test/api/forms")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let repo = repo().await;
        let key = "GET https://app.test/api/forms";
        repo.put("inspekt-api-v1", key, "u", "/api/forms", &ok("old")).await.unwrap();
        repo.put("inspekt-api-v1", key, "u", "/api/forms", &ok("new")).await.unwrap();

        let hit = repo.match_entry("inspekt-api-v1", key).await.unwrap().unwrap();
        assert_eq!(hit.response.body, b"new".to_vec());
        assert_eq!(repo.entry_count("inspekt-api-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_generation_cascades() {
        let repo = repo().await;
        repo.put("inspekt-api-v1", "k", "u", "/api/x", &ok("1")).await.unwrap();
        repo.put("inspekt-api-v2", "k", "u", "/api/x", &ok("2")).await.unwrap();

        assert!(repo.delete_generation("inspekt-api-v1").await.unwrap());
        assert!(!repo.delete_generation("inspekt-api-v1").await.unwrap());
        assert_eq!(repo.entry_count("inspekt-api-v1").await.unwrap(), 0);
        assert_eq!(repo.list_generations().await.unwrap(), vec!["inspekt-api-v2"]);

        assert_eq!(repo.delete_all().await.unwrap(), 1);
        assert!(repo.list_generations().await.unwrap().is_empty());
        assert_eq!(repo.entry_count("inspekt-api-v2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_path_prefix() {
        let repo = repo().await;
        let gen = "inspekt-api-v1";
        repo.put(gen, "a", "u", "/api/inspections", &ok("")).await.unwrap();
        repo.put(gen, "b", "u", "/api/inspections/7", &ok("")).await.unwrap();
        repo.put(gen, "c", "u", "/api/forms", &ok("")).await.unwrap();

        assert_eq!(repo.delete_by_path_prefix(gen, "/api/inspections").await.unwrap(), 2);
        assert_eq!(repo.keys(gen).await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let repo = repo().await;
        repo.put("g", "k", "u", "/", &ok("")).await.unwrap();

        assert!(repo.delete_entry("g", "k").await.unwrap());
        assert!(!repo.delete_entry("g", "k").await.unwrap());
    }
}
