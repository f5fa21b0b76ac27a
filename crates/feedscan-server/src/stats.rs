//! Cached dashboard snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use feedscan_db::{DashboardSnapshot, DbError};
use sqlx::PgPool;
use tokio::sync::Mutex;

/// Scan-history rows included in a snapshot.
pub const RECENT_SCANS: i64 = 15;

struct CachedSnapshot {
    loaded_at: Instant,
    snapshot: DashboardSnapshot,
}

/// Serves [`DashboardSnapshot`]s, reusing the last one for `ttl`.
///
/// The scan sink and the token write handlers call [`StatsService::invalidate`]
/// so a fresh scan or a pool change is visible on the next read.
#[derive(Clone)]
pub struct StatsService {
    pool: PgPool,
    fallback: Option<String>,
    ttl: Duration,
    cache: Arc<Mutex<Option<CachedSnapshot>>>,
}

impl StatsService {
    pub fn new(pool: PgPool, fallback: Option<String>, ttl: Duration) -> Self {
        Self {
            pool,
            fallback,
            ttl,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the cached snapshot while it is fresh, otherwise reloads it.
    ///
    /// The cache lock is held across the reload so concurrent readers share a
    /// single set of queries.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any dashboard query fails. Nothing is cached on
    /// failure.
    pub async fn snapshot(&self) -> Result<DashboardSnapshot, DbError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.snapshot.clone());
            }
        }

        let snapshot =
            feedscan_db::load_dashboard(&self.pool, self.fallback.as_deref(), RECENT_SCANS).await?;
        *cache = Some(CachedSnapshot {
            loaded_at: Instant::now(),
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    #[cfg(test)]
    pub(crate) async fn is_cached(&self) -> bool {
        self.cache.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn snapshot_is_cached_until_invalidated(pool: PgPool) {
        let stats = StatsService::new(pool.clone(), None, Duration::from_secs(60));

        let first = stats.snapshot().await.expect("first snapshot");
        assert_eq!(first.totals.total_posts, 0);
        assert!(stats.is_cached().await);

        sqlx::query(
            "INSERT INTO posts (id, posted_at, orientation, duration, text) \
             VALUES ('s_cached', NOW(), 'tall', 10.00, 'x')",
        )
        .execute(&pool)
        .await
        .expect("insert post");

        let cached = stats.snapshot().await.expect("cached snapshot");
        assert_eq!(cached.totals.total_posts, 0);
        assert_eq!(cached.generated_at, first.generated_at);

        stats.invalidate().await;
        assert!(!stats.is_cached().await);

        let fresh = stats.snapshot().await.expect("fresh snapshot");
        assert_eq!(fresh.totals.total_posts, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn zero_ttl_always_reloads(pool: PgPool) {
        let stats = StatsService::new(pool.clone(), None, Duration::ZERO);

        let first = stats.snapshot().await.expect("first snapshot");
        assert_eq!(first.totals.total_posts, 0);

        sqlx::query(
            "INSERT INTO posts (id, posted_at, orientation, duration, text) \
             VALUES ('s_uncached', NOW(), 'wide', 5.00, NULL)",
        )
        .execute(&pool)
        .await
        .expect("insert post");

        let second = stats.snapshot().await.expect("second snapshot");
        assert_eq!(second.totals.total_posts, 1);
    }
}
