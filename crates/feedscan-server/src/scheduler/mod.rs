//! Adaptive scan loop.
//!
//! [`ScanScheduler`] runs one scan at a time: fetch the feed through the
//! rotating fetcher, persist the batch, measure overlap with the previous
//! fetch, and pick the next poll interval. The loop sleeps for that interval
//! between scans and stops at the next wait once shutdown is signalled.
//!
//! Fixed-cadence housekeeping lives in [`maintenance`].

pub mod maintenance;
mod sink;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use feedscan_core::{compute_overlap, PollTuning};
use feedscan_db::{DbError, IngestSummary, ScanRecord};
use feedscan_feed::{normalize_items, FeedSource, FetchError};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

pub use sink::{PgScanSink, ScanSink};

/// Length of the rolling throughput window.
const THROUGHPUT_WINDOW: usize = 6;
/// Consecutive failures after which every further failure doubles the interval.
const BACKOFF_AFTER_ERRORS: u32 = 3;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("ingestion failed: {0}")]
    Ingest(#[from] DbError),
}

/// Result of one call to [`ScanScheduler::scan_once`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Another scan was already in flight.
    Skipped,
    Completed {
        fetch_count: usize,
        summary: IngestSummary,
        overlap_pct: f64,
        next_interval_ms: u64,
    },
    Failed {
        error: String,
        next_interval_ms: u64,
    },
}

/// Process-local scan state. Reset on every start; never rebuilt from the database.
#[derive(Debug)]
struct ScanState {
    interval_ms: u64,
    previous_ids: HashSet<String>,
    consecutive_errors: u32,
    throughput: VecDeque<f64>,
}

impl ScanState {
    fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            previous_ids: HashSet::new(),
            consecutive_errors: 0,
            throughput: VecDeque::with_capacity(THROUGHPUT_WINDOW),
        }
    }

    fn push_throughput(&mut self, posts_per_second: f64) {
        if self.throughput.len() == THROUGHPUT_WINDOW {
            self.throughput.pop_front();
        }
        self.throughput.push_back(posts_per_second);
    }

    #[allow(clippy::cast_precision_loss)]
    fn avg_throughput(&self) -> f64 {
        if self.throughput.is_empty() {
            0.0
        } else {
            self.throughput.iter().sum::<f64>() / self.throughput.len() as f64
        }
    }
}

/// Clears the single-flight flag when the scan ends, however it ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScanScheduler<S, K> {
    source: S,
    sink: K,
    tuning: PollTuning,
    fetch_limit: u32,
    scanning: AtomicBool,
    state: Mutex<ScanState>,
}

impl<S, K> ScanScheduler<S, K>
where
    S: FeedSource,
    K: ScanSink,
{
    pub fn new(source: S, sink: K, tuning: PollTuning, fetch_limit: u32) -> Self {
        Self {
            source,
            sink,
            tuning,
            fetch_limit,
            scanning: AtomicBool::new(false),
            state: Mutex::new(ScanState::new(tuning.base_interval_ms)),
        }
    }

    pub async fn current_interval_ms(&self) -> u64 {
        self.state.lock().await.interval_ms
    }

    /// Runs a single scan. A call made while another scan is in flight returns
    /// [`ScanOutcome::Skipped`] without touching any state.
    pub async fn scan_once(&self) -> ScanOutcome {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("scan in progress, skipping");
            return ScanOutcome::Skipped;
        }
        let _guard = ScanGuard(&self.scanning);

        let mut state = self.state.lock().await;
        let started_at = Utc::now();
        let start = Instant::now();
        tracing::info!(limit = self.fetch_limit, "scanning feed");

        if let Err(e) = self.sink.mark_scanning(state.interval_ms).await {
            tracing::warn!(error = %e, "failed to mark scanner as scanning");
        }

        let mut fetch_count = 0_usize;
        let result = self.execute(&mut fetch_count).await;
        let duration = start.elapsed();

        let (outcome, record) = match result {
            Ok((ids, summary)) => {
                let overlap_pct = compute_overlap(&ids, &state.previous_ids);
                let posts_per_second = throughput(fetch_count, duration);
                state.push_throughput(posts_per_second);
                state.previous_ids = ids;
                state.consecutive_errors = 0;
                state.interval_ms = self.tuning.next_interval(state.interval_ms, overlap_pct);

                tracing::info!(
                    new = summary.new_count,
                    duplicates = summary.duplicate_count,
                    overlap_pct = format_args!("{overlap_pct:.1}"),
                    posts_per_second = format_args!("{posts_per_second:.1}"),
                    duration_ms = duration.as_millis(),
                    next_interval_ms = state.interval_ms,
                    "scan complete"
                );

                let record = build_record(
                    &state,
                    started_at,
                    duration,
                    fetch_count,
                    summary,
                    overlap_pct,
                    posts_per_second,
                    None,
                );
                let outcome = ScanOutcome::Completed {
                    fetch_count,
                    summary,
                    overlap_pct,
                    next_interval_ms: state.interval_ms,
                };
                (outcome, record)
            }
            Err(e) => {
                state.consecutive_errors += 1;
                if state.consecutive_errors >= BACKOFF_AFTER_ERRORS {
                    state.interval_ms = self.tuning.escalate(state.interval_ms);
                    tracing::warn!(
                        consecutive_errors = state.consecutive_errors,
                        next_interval_ms = state.interval_ms,
                        "repeated scan failures, backing off"
                    );
                }
                match &e {
                    ScanError::Fetch(FetchError::NoTokensAvailable) => {
                        tracing::error!("scan failed: no valid bearer tokens available");
                    }
                    other => tracing::error!(error = %other, "scan failed"),
                }

                let message = e.to_string();
                let record = build_record(
                    &state,
                    started_at,
                    duration,
                    fetch_count,
                    IngestSummary::default(),
                    0.0,
                    0.0,
                    Some(message.clone()),
                );
                let outcome = ScanOutcome::Failed {
                    error: message,
                    next_interval_ms: state.interval_ms,
                };
                (outcome, record)
            }
        };
        drop(state);

        self.sink.record(&record).await;
        outcome
    }

    async fn execute(
        &self,
        fetch_count: &mut usize,
    ) -> Result<(HashSet<String>, IngestSummary), ScanError> {
        let batch = self.source.fetch(self.fetch_limit).await?;
        *fetch_count = batch.len();
        tracing::debug!(fetched = batch.len(), "fetched feed page");

        let posts = normalize_items(&batch.items, Utc::now());
        let summary = self.sink.ingest(&posts).await?;
        let ids = batch.ids().map(str::to_owned).collect();
        Ok((ids, summary))
    }

    /// Scans immediately, then keeps scanning at the adaptive interval until
    /// `shutdown` flips to `true` or its sender is dropped. An in-flight scan
    /// always completes. Returns the final interval.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> u64 {
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.scan_once().await;

            let wait = Duration::from_millis(self.current_interval_ms().await);
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("scan loop stopped");
        self.current_interval_ms().await
    }
}

#[allow(clippy::cast_precision_loss)]
fn throughput(fetch_count: usize, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        fetch_count as f64 / secs
    } else {
        0.0
    }
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    state: &ScanState,
    started_at: chrono::DateTime<Utc>,
    duration: Duration,
    fetch_count: usize,
    summary: IngestSummary,
    overlap_pct: f64,
    posts_per_second: f64,
    error_message: Option<String>,
) -> ScanRecord {
    ScanRecord {
        started_at,
        completed_at: Utc::now(),
        duration_ms: i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        fetch_count: saturating_i32(fetch_count),
        new_posts: saturating_i32(summary.new_count),
        duplicate_posts: saturating_i32(summary.duplicate_count),
        overlap_pct,
        posts_per_second,
        avg_posts_per_second: state.avg_throughput(),
        poll_interval_ms: i64::try_from(state.interval_ms).unwrap_or(i64::MAX),
        consecutive_errors: i32::try_from(state.consecutive_errors).unwrap_or(i32::MAX),
        error_message,
    }
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
