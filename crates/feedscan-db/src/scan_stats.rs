//! Database operations for `scanner_stats` and `scan_history`.
//!
//! `scanner_stats` is a single row (id = 1) holding cumulative counters and a
//! snapshot of the most recent scan. `scan_history` is the append-only log of
//! every scan attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

/// Values the `status` column of `scanner_stats` takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerStatus {
    Starting,
    Scanning,
    Success,
    Error,
    Stopped,
}

impl ScannerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScannerStatus::Starting => "starting",
            ScannerStatus::Scanning => "scanning",
            ScannerStatus::Success => "success",
            ScannerStatus::Error => "error",
            ScannerStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ScannerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything recorded about one scan attempt.
///
/// A record with an `error_message` is persisted with status `error`; the
/// batch counters of a failed scan are whatever was known before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub fetch_count: i32,
    pub new_posts: i32,
    pub duplicate_posts: i32,
    pub overlap_pct: f64,
    pub posts_per_second: f64,
    /// Mean of the rolling throughput window.
    pub avg_posts_per_second: f64,
    /// Interval chosen for the next scan.
    pub poll_interval_ms: i64,
    pub consecutive_errors: i32,
    pub error_message: Option<String>,
}

impl ScanRecord {
    #[must_use]
    pub fn status(&self) -> ScannerStatus {
        if self.error_message.is_some() {
            ScannerStatus::Error
        } else {
            ScannerStatus::Success
        }
    }
}

/// The `scanner_stats` singleton row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ScanStatsRow {
    pub total_scanned: i64,
    pub new_posts: i64,
    pub duplicate_posts: i64,
    pub errors: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub scan_duration_ms: i64,
    pub last_scan_count: i32,
    pub last_new_posts: i32,
    pub last_duplicates: i32,
    pub last_overlap_pct: f64,
    pub last_posts_per_second: f64,
    pub avg_posts_per_second: f64,
    pub current_poll_interval: i64,
    pub consecutive_errors: i32,
    pub scanner_started_at: Option<DateTime<Utc>>,
}

/// A row from the `scan_history` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ScanHistoryRow {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub fetch_count: i32,
    pub new_posts: i32,
    pub duplicate_posts: i32,
    pub overlap_pct: f64,
    pub posts_per_second: f64,
    pub poll_interval_ms: i64,
    pub status: String,
    pub error_message: Option<String>,
}

const STATS_COLUMNS: &str = "total_scanned, new_posts, duplicate_posts, errors, status, \
     error_message, last_scan_at, last_error_at, scan_duration_ms, last_scan_count, \
     last_new_posts, last_duplicates, last_overlap_pct, last_posts_per_second, \
     avg_posts_per_second, current_poll_interval, consecutive_errors, scanner_started_at";

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Marks the scanner as starting and stamps `scanner_started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_scanner_starting(pool: &PgPool, poll_interval_ms: i64) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE scanner_stats \
         SET status = 'starting', scanner_started_at = NOW(), \
             current_poll_interval = $1, consecutive_errors = 0 \
         WHERE id = 1",
    )
    .bind(poll_interval_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Sets the status column and the current interval without touching counters.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_scanner_status(
    pool: &PgPool,
    status: ScannerStatus,
    poll_interval_ms: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE scanner_stats SET status = $1, current_poll_interval = $2 WHERE id = 1",
    )
    .bind(status.as_str())
    .bind(poll_interval_ms)
    .execute(pool)
    .await?;
    Ok(())
}

/// Folds one scan into the cumulative counters and replaces the last-run snapshot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_scan_stats(pool: &PgPool, record: &ScanRecord) -> Result<(), DbError> {
    let error_increment: i64 = i64::from(record.error_message.is_some());
    let scanned = i64::from(record.new_posts) + i64::from(record.duplicate_posts);

    sqlx::query(
        "UPDATE scanner_stats SET \
            total_scanned = total_scanned + $1, \
            new_posts = new_posts + $2, \
            duplicate_posts = duplicate_posts + $3, \
            errors = errors + $4, \
            last_scan_at = NOW(), \
            scan_duration_ms = $5, \
            status = $6, \
            error_message = $7, \
            last_scan_count = $8, \
            avg_posts_per_second = $9, \
            current_poll_interval = $10, \
            last_overlap_pct = $11, \
            last_posts_per_second = $12, \
            last_new_posts = $13, \
            last_duplicates = $14, \
            consecutive_errors = $15, \
            last_error_at = CASE WHEN $4 > 0 THEN NOW() ELSE last_error_at END \
         WHERE id = 1",
    )
    .bind(scanned)
    .bind(i64::from(record.new_posts))
    .bind(i64::from(record.duplicate_posts))
    .bind(error_increment)
    .bind(record.duration_ms)
    .bind(record.status().as_str())
    .bind(record.error_message.as_deref())
    .bind(record.fetch_count)
    .bind(round2(record.avg_posts_per_second))
    .bind(record.poll_interval_ms)
    .bind(round2(record.overlap_pct))
    .bind(round2(record.posts_per_second))
    .bind(record.new_posts)
    .bind(record.duplicate_posts)
    .bind(record.consecutive_errors)
    .execute(pool)
    .await?;

    Ok(())
}

/// Appends one row to `scan_history`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn append_scan_history(pool: &PgPool, record: &ScanRecord) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO scan_history ( \
            started_at, completed_at, duration_ms, fetch_count, new_posts, \
            duplicate_posts, overlap_pct, posts_per_second, poll_interval_ms, \
            status, error_message \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING id",
    )
    .bind(record.started_at)
    .bind(record.completed_at)
    .bind(record.duration_ms)
    .bind(record.fetch_count)
    .bind(record.new_posts)
    .bind(record.duplicate_posts)
    .bind(round2(record.overlap_pct))
    .bind(round2(record.posts_per_second))
    .bind(record.poll_interval_ms)
    .bind(record.status().as_str())
    .bind(record.error_message.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Reads the singleton stats row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the seed row is missing, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_scan_stats(pool: &PgPool) -> Result<ScanStatsRow, DbError> {
    sqlx::query_as::<_, ScanStatsRow>(&format!(
        "SELECT {STATS_COLUMNS} FROM scanner_stats WHERE id = 1"
    ))
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Most recent scan attempts, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scan_history(pool: &PgPool, limit: i64) -> Result<Vec<ScanHistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, ScanHistoryRow>(
        "SELECT id, started_at, completed_at, duration_ms, fetch_count, new_posts, \
                duplicate_posts, overlap_pct, posts_per_second, poll_interval_ms, \
                status, error_message \
         FROM scan_history \
         ORDER BY started_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(error: Option<&str>) -> ScanRecord {
        let now = Utc::now();
        ScanRecord {
            started_at: now,
            completed_at: now,
            duration_ms: 120,
            fetch_count: 3,
            new_posts: 2,
            duplicate_posts: 1,
            overlap_pct: 33.333,
            posts_per_second: 25.0,
            avg_posts_per_second: 25.0,
            poll_interval_ms: 10_000,
            consecutive_errors: 0,
            error_message: error.map(str::to_string),
        }
    }

    #[test]
    fn status_follows_error_message() {
        assert_eq!(record(None).status(), ScannerStatus::Success);
        assert_eq!(record(Some("boom")).status(), ScannerStatus::Error);
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert!((round2(33.333) - 33.33).abs() < 1e-9);
        assert!((round2(1.256) - 1.26).abs() < 1e-9);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ScannerStatus::Stopped).unwrap(),
            "\"stopped\""
        );
        assert_eq!(ScannerStatus::Starting.to_string(), "starting");
    }
}
