//! Read-only aggregate queries backing the stats API and the `stats` CLI command.
//!
//! Every query here tolerates empty tables: aggregates are coalesced to zero
//! and list queries simply return no rows.

use chrono::{DateTime, Utc};
use feedscan_core::{fingerprint, CredentialId};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::scan_stats::{get_scan_stats, list_scan_history, ScanHistoryRow, ScanStatsRow};
use crate::tokens::{fallback_credential, TokenRow};
use crate::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PostTotals {
    pub total_posts: i64,
    pub latest_posted_at: Option<DateTime<Utc>>,
    pub last_hour: i64,
    pub last_24h: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrientationCount {
    pub orientation: String,
    pub count: i64,
}

/// Clip length statistics in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DurationStats {
    pub min_duration: Decimal,
    pub max_duration: Decimal,
    pub avg_duration: Decimal,
}

/// Posts per UTC calendar day, `day` formatted `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: String,
    pub posts: i64,
}

/// A pooled token as exposed to readers: the raw value is replaced by a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub id: CredentialId,
    pub fingerprint: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    /// `db` for persisted rows, `env` for the configured fallback.
    pub source: &'static str,
}

impl From<&TokenRow> for TokenSummary {
    fn from(row: &TokenRow) -> Self {
        Self {
            id: CredentialId::Stored(row.id),
            fingerprint: fingerprint(&row.token),
            expires_at: Some(row.expires_at),
            added_at: Some(row.added_at),
            source: "db",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPoolSummary {
    pub count: usize,
    pub tokens: Vec<TokenSummary>,
}

/// Everything the dashboard shows, in one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub stats: Option<ScanStatsRow>,
    pub uptime_seconds: i64,
    pub totals: PostTotals,
    pub orientation: Vec<OrientationCount>,
    pub durations: DurationStats,
    pub daily: Vec<DailyCount>,
    pub recent_scans: Vec<ScanHistoryRow>,
    pub db_size_bytes: i64,
    pub tokens: TokenPoolSummary,
    pub generated_at: DateTime<Utc>,
}

/// Summaries of every unexpired persisted token, plus the configured fallback
/// when it is valid and not already stored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_token_summaries(
    pool: &PgPool,
    fallback: Option<&str>,
) -> Result<TokenPoolSummary, DbError> {
    let rows = sqlx::query_as::<_, TokenRow>(
        "SELECT id, token, expires_at, added_at \
         FROM feed_tokens \
         WHERE expires_at > NOW() \
         ORDER BY expires_at DESC, added_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut tokens: Vec<TokenSummary> = Vec::with_capacity(rows.len() + 1);

    if let Some(cred) = fallback.and_then(|token| fallback_credential(token, Utc::now())) {
        let already_stored = rows.iter().any(|row| row.token == cred.token);
        if !already_stored {
            tokens.push(TokenSummary {
                id: CredentialId::Fallback,
                fingerprint: fingerprint(&cred.token),
                expires_at: cred.expires_at,
                added_at: None,
                source: "env",
            });
        }
    }

    tokens.extend(rows.iter().map(TokenSummary::from));

    Ok(TokenPoolSummary {
        count: tokens.len(),
        tokens,
    })
}

/// Runs every dashboard aggregate and assembles a [`DashboardSnapshot`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any query fails.
pub async fn load_dashboard(
    pool: &PgPool,
    fallback: Option<&str>,
    recent_limit: i64,
) -> Result<DashboardSnapshot, DbError> {
    let stats = match get_scan_stats(pool).await {
        Ok(row) => Some(row),
        Err(DbError::NotFound) => None,
        Err(e) => return Err(e),
    };

    let uptime_seconds = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE( \
            (SELECT EXTRACT(EPOCH FROM (NOW() - scanner_started_at))::BIGINT \
             FROM scanner_stats WHERE id = 1 AND scanner_started_at IS NOT NULL), \
            0)",
    )
    .fetch_one(pool)
    .await?;

    let totals = sqlx::query_as::<_, PostTotals>(
        "SELECT \
            COUNT(*)::BIGINT AS total_posts, \
            MAX(posted_at) AS latest_posted_at, \
            COUNT(*) FILTER (WHERE posted_at >= NOW() - INTERVAL '1 hour')::BIGINT AS last_hour, \
            COUNT(*) FILTER (WHERE posted_at >= NOW() - INTERVAL '24 hours')::BIGINT AS last_24h \
         FROM posts",
    )
    .fetch_one(pool)
    .await?;

    let orientation = sqlx::query_as::<_, OrientationCount>(
        "SELECT orientation, COUNT(*)::BIGINT AS count \
         FROM posts \
         GROUP BY orientation \
         ORDER BY count DESC, orientation",
    )
    .fetch_all(pool)
    .await?;

    let durations = sqlx::query_as::<_, DurationStats>(
        "SELECT \
            COALESCE(MIN(duration), 0)::NUMERIC(10,2) AS min_duration, \
            COALESCE(MAX(duration), 0)::NUMERIC(10,2) AS max_duration, \
            COALESCE(AVG(duration), 0)::NUMERIC(10,2) AS avg_duration \
         FROM posts",
    )
    .fetch_one(pool)
    .await?;

    let daily = sqlx::query_as::<_, DailyCount>(
        "SELECT \
            to_char(posted_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS day, \
            COUNT(*)::BIGINT AS posts \
         FROM posts \
         WHERE posted_at >= NOW() - INTERVAL '7 days' \
         GROUP BY day \
         ORDER BY day DESC",
    )
    .fetch_all(pool)
    .await?;

    let recent_scans = list_scan_history(pool, recent_limit).await?;

    let db_size_bytes =
        sqlx::query_scalar::<_, i64>("SELECT pg_database_size(current_database())")
            .fetch_one(pool)
            .await?;

    let tokens = list_token_summaries(pool, fallback).await?;

    Ok(DashboardSnapshot {
        stats,
        uptime_seconds,
        totals,
        orientation,
        durations,
        daily,
        recent_scans,
        db_size_bytes,
        tokens,
        generated_at: Utc::now(),
    })
}
