//! Postgres persistence for feedscan: the token pool, stored posts, scanner
//! stats and the read model behind the dashboard.

pub mod dashboard;
pub mod posts;
pub mod scan_stats;
pub mod tokens;

use std::time::Duration;

use feedscan_core::{AppConfig, TokenError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub use dashboard::{
    list_token_summaries, load_dashboard, DailyCount, DashboardSnapshot, DurationStats,
    OrientationCount, PostTotals, TokenPoolSummary, TokenSummary,
};
pub use posts::{count_posts, ingest_posts, post_exists, IngestSummary};
pub use scan_stats::{
    append_scan_history, get_scan_stats, list_scan_history, mark_scanner_starting,
    mark_scanner_status, record_scan_stats, ScanHistoryRow, ScanRecord, ScanStatsRow,
    ScannerStatus,
};
pub use tokens::{TokenRow, TokenStore};

// Relative to crates/feedscan-db/Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const APPLIED_MIGRATIONS_SQL: &str =
    "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection-pool sizing, taken from the `FEEDSCAN_DB_*` settings.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

/// Open a pool against `database_url`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Apply pending migrations and return how many were applied by this call.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after.saturating_sub(before)).unwrap_or(0))
}

// A fresh database has no `_sqlx_migrations` table yet; count that as zero.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>(APPLIED_MIGRATIONS_SQL)
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// `SELECT 1` round trip.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// [`ping`] with the error lifted into [`DbError`] for the health endpoint.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

/// Short server version string, e.g. `"PostgreSQL 16.2"`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn server_version(pool: &PgPool) -> Result<String, DbError> {
    let full: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(pool)
        .await?;
    Ok(short_version(&full))
}

fn short_version(full: &str) -> String {
    full.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}
