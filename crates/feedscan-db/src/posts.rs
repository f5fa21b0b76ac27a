//! Database operations for the `posts` table.

use feedscan_core::NewPost;
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

/// Outcome of persisting one fetched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub new_count: usize,
    pub duplicate_count: usize,
}

impl IngestSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.new_count + self.duplicate_count
    }
}

/// Inserts a batch of posts in a single transaction, classifying each one as
/// new or duplicate.
///
/// A post is a duplicate if its id already exists, or if the insert is
/// ignored because a concurrent writer stored the same id first. On any
/// failure the transaction is rolled back and no post from the batch is
/// persisted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails.
pub async fn ingest_posts(pool: &PgPool, posts: &[NewPost]) -> Result<IngestSummary, DbError> {
    let mut summary = IngestSummary::default();
    if posts.is_empty() {
        return Ok(summary);
    }

    let mut tx = pool.begin().await?;

    for post in posts {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(&post.id)
            .fetch_one(&mut *tx)
            .await?;
        if exists {
            summary.duplicate_count += 1;
            continue;
        }

        let result = sqlx::query(
            "INSERT INTO posts (id, posted_at, orientation, duration, text) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&post.id)
        .bind(post.posted_at)
        .bind(post.orientation.as_str())
        .bind(post.duration)
        .bind(post.text.as_deref())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            summary.duplicate_count += 1;
        } else {
            summary.new_count += 1;
        }
    }

    tx.commit().await?;

    Ok(summary)
}

/// Total number of stored posts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_posts(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn post_exists(pool: &PgPool, id: &str) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}
