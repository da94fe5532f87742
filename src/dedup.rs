//! Durable record of which articles have already been delivered.
//!
//! Lookups lean towards at-least-once delivery: if the store cannot answer,
//! the item is treated as new. Writes are best-effort because they happen
//! after the message has already reached the channel.

use crate::db::{self, Pool};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct DedupStore {
    pool: Pool,
}

impl DedupStore {
    /// Open (creating if needed) and migrate the store at `database_url`.
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = db::init_pool(database_url).await?;
        db::run_migrations(&pool).await?;
        info!("dedup store opened");
        Ok(Self { pool })
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// True iff `id` has a live sent record. Store errors count as unknown.
    #[instrument(skip(self))]
    pub async fn is_known(&self, id: &str) -> bool {
        match db::is_sent(&self.pool, id).await {
            Ok(known) => known,
            Err(err) => {
                warn!(?err, id, "dedup lookup failed; treating item as new");
                false
            }
        }
    }

    /// Record a successful delivery. Never fails the caller.
    #[instrument(skip(self))]
    pub async fn record(&self, id: &str, now: DateTime<Utc>) {
        match db::insert_sent(&self.pool, id, now).await {
            Ok(true) => debug!(id, "recorded sent item"),
            Ok(false) => debug!(id, "sent item already recorded"),
            Err(err) => error!(?err, id, "failed to record sent item"),
        }
    }

    /// Delete records older than `now - retention`; returns how many went.
    #[instrument(skip(self))]
    pub async fn evict_older_than(&self, now: DateTime<Utc>, retention: Duration) -> Result<u64> {
        let removed = db::delete_sent_before(&self.pool, now - retention).await?;
        if removed > 0 {
            info!(removed, "evicted expired sent records");
        } else {
            info!("no expired sent records");
        }
        Ok(removed)
    }

    pub async fn count(&self) -> Result<i64> {
        db::count_sent(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("dedup store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> DedupStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        DedupStore::from_pool(pool)
    }

    #[tokio::test]
    async fn record_twice_keeps_single_row() {
        let store = setup_store().await;
        let now = Utc::now();
        assert!(!store.is_known("/realtime/china/x").await);

        store.record("/realtime/china/x", now).await;
        store.record("/realtime/china/x", now).await;

        assert!(store.is_known("/realtime/china/x").await);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retention_sweep_evicts_only_expired() {
        let store = setup_store().await;
        let now = Utc::now();
        store.record("/one-day", now - Duration::days(1)).await;
        store.record("/six-days", now - Duration::days(6)).await;
        store.record("/eight-days", now - Duration::days(8)).await;

        let removed = store.evict_older_than(now, Duration::days(7)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_known("/one-day").await);
        assert!(store.is_known("/six-days").await);
        assert!(!store.is_known("/eight-days").await);

        let removed = store.evict_older_than(now, Duration::days(7)).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn eviction_on_empty_store_is_noop() {
        let store = setup_store().await;
        let removed = store
            .evict_older_than(Utc::now(), Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn closed_store_degrades_to_unknown() {
        let store = setup_store().await;
        store.record("/kept", Utc::now()).await;
        store.close().await;

        // Lookups must not claim an item is known when the store cannot answer.
        assert!(!store.is_known("/kept").await);
        // Writes swallow the error.
        store.record("/later", Utc::now()).await;
    }
}
