use async_trait::async_trait;
use feedscan_core::NewPost;
use feedscan_db::{DbError, IngestSummary, ScanRecord, ScannerStatus};
use sqlx::PgPool;

use crate::stats::StatsService;

/// Where the scan loop persists batches and run statistics.
#[async_trait]
pub trait ScanSink: Send + Sync {
    async fn mark_scanning(&self, interval_ms: u64) -> Result<(), DbError>;

    async fn ingest(&self, posts: &[NewPost]) -> Result<IngestSummary, DbError>;

    /// Persists the outcome of one scan. Failures are logged, never returned.
    async fn record(&self, record: &ScanRecord);
}

#[derive(Clone)]
pub struct PgScanSink {
    pool: PgPool,
    stats: StatsService,
}

impl PgScanSink {
    pub fn new(pool: PgPool, stats: StatsService) -> Self {
        Self { pool, stats }
    }
}

#[async_trait]
impl ScanSink for PgScanSink {
    async fn mark_scanning(&self, interval_ms: u64) -> Result<(), DbError> {
        let interval_ms = i64::try_from(interval_ms).unwrap_or(i64::MAX);
        feedscan_db::mark_scanner_status(&self.pool, ScannerStatus::Scanning, interval_ms).await
    }

    async fn ingest(&self, posts: &[NewPost]) -> Result<IngestSummary, DbError> {
        feedscan_db::ingest_posts(&self.pool, posts).await
    }

    async fn record(&self, record: &ScanRecord) {
        if let Err(e) = feedscan_db::record_scan_stats(&self.pool, record).await {
            tracing::error!(error = %e, "scan stats update failed");
        }
        if let Err(e) = feedscan_db::append_scan_history(&self.pool, record).await {
            tracing::error!(error = %e, "scan history insert failed");
        }
        self.stats.invalidate().await;
    }
}
