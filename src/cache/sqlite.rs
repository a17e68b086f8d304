use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::store::CacheStore;
use crate::db::models::CacheRow;
use crate::db::now_secs;
use crate::error::{AppError, Result};

/// `match_cache` table; expiry is unix seconds, checked on read.
pub struct SqliteCacheStore {
    pool: sqlx::SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: sqlx::SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    /// Delete every expired row. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM match_cache WHERE expires_at <= ?")
            .bind(now_secs())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(done.rows_affected())
    }
}

fn unavailable(e: sqlx::Error) -> AppError {
    AppError::CacheUnavailable(e.to_string())
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT payload, expires_at FROM match_cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        match row {
            Some(row) if row.expires_at > now_secs() => Ok(Some(row.payload)),
            Some(_) => {
                debug!(key, "Cache entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = now_secs() + ttl.as_secs() as i64;
        sqlx::query(
            r#"
            INSERT INTO match_cache (key, payload, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM match_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;

    #[tokio::test]
    async fn round_trip_and_upsert() {
        let store = SqliteCacheStore::new(connect_memory().await.unwrap());
        assert!(store.get("match:football:a-b").await.unwrap().is_none());

        store.set("match:football:a-b", b"first", Duration::from_secs(3600)).await.unwrap();
        store.set("match:football:a-b", b"second", Duration::from_secs(3600)).await.unwrap();
        assert_eq!(
            store.get("match:football:a-b").await.unwrap().as_deref(),
            Some(&b"second"[..])
        );

        store.del("match:football:a-b").await.unwrap();
        assert!(store.get("match:football:a-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_already_expired() {
        let store = SqliteCacheStore::new(connect_memory().await.unwrap());
        store.set("k", b"v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_pool_reports_cache_unavailable() {
        let pool = connect_memory().await.unwrap();
        let store = SqliteCacheStore::new(pool.clone());
        pool.close().await;
        assert!(matches!(
            store.get("k").await,
            Err(AppError::CacheUnavailable(_))
        ));
    }
}
