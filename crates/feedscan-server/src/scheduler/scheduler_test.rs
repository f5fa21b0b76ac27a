use std::collections::HashSet;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use feedscan_core::NewPost;
use feedscan_feed::{FeedBatch, FeedItem, FeedPost};
use tokio::sync::Notify;

use super::*;

// -----------------------------------------------------------------------
// Fakes
// -----------------------------------------------------------------------

enum Step {
    Items(Vec<&'static str>),
    Fail,
}

#[derive(Default)]
struct FakeSource {
    steps: StdMutex<VecDeque<Step>>,
    /// When set, each fetch parks until the gate is notified.
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl FakeSource {
    fn scripted(steps: Vec<Step>) -> Self {
        Self {
            steps: StdMutex::new(steps.into()),
            ..Self::default()
        }
    }

    fn gated(steps: Vec<Step>, gate: Arc<Notify>) -> Self {
        Self {
            steps: StdMutex::new(steps.into()),
            gate: Some(gate),
            ..Self::default()
        }
    }
}

fn batch(ids: &[&str]) -> FeedBatch {
    FeedBatch {
        items: ids
            .iter()
            .map(|id| FeedItem {
                post: FeedPost {
                    id: (*id).to_owned(),
                    text: Some("prompt".to_owned()),
                    posted_at: Some(1_700_000_000.0),
                    attachments: vec![],
                },
                attachments: vec![],
            })
            .collect(),
        cursor: None,
    }
}

#[async_trait]
impl FeedSource for FakeSource {
    async fn fetch(&self, _limit: u32) -> Result<FeedBatch, FetchError> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Items(ids)) => Ok(batch(&ids)),
            Some(Step::Fail) => Err(FetchError::Upstream { status: 502 }),
            None => Ok(batch(&[])),
        }
    }
}

#[derive(Default)]
struct FakeSink {
    stored: StdMutex<HashSet<String>>,
    records: StdMutex<Vec<ScanRecord>>,
    marks: StdMutex<Vec<u64>>,
    recorded: Notify,
}

impl FakeSink {
    fn records(&self) -> Vec<ScanRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanSink for FakeSink {
    async fn mark_scanning(&self, interval_ms: u64) -> Result<(), DbError> {
        self.marks.lock().unwrap().push(interval_ms);
        Ok(())
    }

    async fn ingest(&self, posts: &[NewPost]) -> Result<IngestSummary, DbError> {
        let mut stored = self.stored.lock().unwrap();
        let mut summary = IngestSummary::default();
        for post in posts {
            if stored.insert(post.id.clone()) {
                summary.new_count += 1;
            } else {
                summary.duplicate_count += 1;
            }
        }
        Ok(summary)
    }

    async fn record(&self, record: &ScanRecord) {
        self.records.lock().unwrap().push(record.clone());
        self.recorded.notify_one();
    }
}

fn scheduler(source: FakeSource) -> ScanScheduler<FakeSource, FakeSink> {
    ScanScheduler::new(source, FakeSink::default(), PollTuning::default(), 200)
}

fn interval_of(outcome: &ScanOutcome) -> u64 {
    match outcome {
        ScanOutcome::Completed {
            next_interval_ms, ..
        }
        | ScanOutcome::Failed {
            next_interval_ms, ..
        } => *next_interval_ms,
        ScanOutcome::Skipped => panic!("scan was skipped"),
    }
}

// -----------------------------------------------------------------------
// ScanState
// -----------------------------------------------------------------------

#[test]
fn throughput_window_keeps_last_six_samples() {
    let mut state = ScanState::new(10_000);
    for sample in 1..=8_u32 {
        state.push_throughput(f64::from(sample));
    }
    assert_eq!(state.throughput.len(), THROUGHPUT_WINDOW);
    // Samples 3..=8 remain.
    assert!((state.avg_throughput() - 5.5).abs() < f64::EPSILON);
}

#[test]
fn empty_throughput_window_averages_zero() {
    assert!(ScanState::new(10_000).avg_throughput().abs() < f64::EPSILON);
}

// -----------------------------------------------------------------------
// scan_once
// -----------------------------------------------------------------------

#[tokio::test]
async fn first_scan_with_no_previous_ids_shortens_interval() {
    let sched = scheduler(FakeSource::scripted(vec![Step::Items(vec!["a", "b", "c"])]));

    let outcome = sched.scan_once().await;

    match outcome {
        ScanOutcome::Completed {
            fetch_count,
            summary,
            overlap_pct,
            next_interval_ms,
        } => {
            assert_eq!(fetch_count, 3);
            assert_eq!(summary.new_count, 3);
            assert!(overlap_pct.abs() < f64::EPSILON);
            assert_eq!(next_interval_ms, 9_500);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(sched.sink.marks.lock().unwrap().as_slice(), &[10_000]);
}

#[tokio::test]
async fn repeated_feed_raises_overlap_and_interval() {
    let sched = scheduler(FakeSource::scripted(vec![
        Step::Items(vec!["a", "b", "c", "d"]),
        Step::Items(vec!["a", "b", "c", "d"]),
    ]));

    sched.scan_once().await;
    let outcome = sched.scan_once().await;

    match outcome {
        ScanOutcome::Completed {
            summary,
            overlap_pct,
            next_interval_ms,
            ..
        } => {
            assert_eq!(summary.new_count, 0);
            assert_eq!(summary.duplicate_count, 4);
            assert!((overlap_pct - 100.0).abs() < f64::EPSILON);
            assert_eq!(next_interval_ms, 10_500);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn three_consecutive_failures_double_the_interval() {
    let sched = scheduler(FakeSource::scripted(vec![
        Step::Fail,
        Step::Fail,
        Step::Fail,
        Step::Fail,
    ]));

    assert_eq!(interval_of(&sched.scan_once().await), 10_000);
    assert_eq!(interval_of(&sched.scan_once().await), 10_000);
    assert_eq!(interval_of(&sched.scan_once().await), 20_000);
    // Capped at the maximum.
    assert_eq!(interval_of(&sched.scan_once().await), 30_000);

    let records = sched.sink.records();
    assert_eq!(records.len(), 4);
    assert_eq!(records[3].consecutive_errors, 4);
    assert!(records
        .iter()
        .all(|r| r.status() == feedscan_db::ScannerStatus::Error));
    assert!(records[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("502")));
}

#[tokio::test]
async fn success_resets_consecutive_errors() {
    let sched = scheduler(FakeSource::scripted(vec![
        Step::Fail,
        Step::Fail,
        Step::Items(vec!["a"]),
    ]));

    sched.scan_once().await;
    sched.scan_once().await;
    let outcome = sched.scan_once().await;

    assert!(matches!(outcome, ScanOutcome::Completed { .. }));
    let records = sched.sink.records();
    assert_eq!(records[1].consecutive_errors, 2);
    assert_eq!(records[2].consecutive_errors, 0);
    assert!(records[2].error_message.is_none());
    assert_eq!(sched.state.lock().await.consecutive_errors, 0);
}

#[tokio::test]
async fn failed_scan_keeps_previous_id_set() {
    let sched = scheduler(FakeSource::scripted(vec![
        Step::Items(vec!["a", "b"]),
        Step::Fail,
        Step::Items(vec!["a", "b"]),
    ]));

    sched.scan_once().await;
    sched.scan_once().await;
    let outcome = sched.scan_once().await;

    match outcome {
        ScanOutcome::Completed { overlap_pct, .. } => {
            assert!((overlap_pct - 100.0).abs() < f64::EPSILON);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn scan_during_scan_is_skipped() {
    let gate = Arc::new(Notify::new());
    let source = FakeSource::gated(vec![Step::Items(vec!["a"])], Arc::clone(&gate));
    let entered = Arc::clone(&source.entered);
    let sched = Arc::new(scheduler(source));

    let first = tokio::spawn({
        let sched = Arc::clone(&sched);
        async move { sched.scan_once().await }
    });
    entered.notified().await;

    assert_eq!(sched.scan_once().await, ScanOutcome::Skipped);

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Completed { .. }));
    assert_eq!(sched.sink.records().len(), 1);

    // The flag is released once the first scan finishes.
    let again = sched.scan_once();
    gate.notify_one();
    assert!(matches!(again.await, ScanOutcome::Completed { .. }));
}

// -----------------------------------------------------------------------
// run
// -----------------------------------------------------------------------

#[tokio::test]
async fn run_scans_immediately_and_stops_on_shutdown() {
    let sched = Arc::new(scheduler(FakeSource::scripted(vec![Step::Items(vec![
        "a", "b",
    ])])));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(Arc::clone(&sched).run(rx));
    sched.sink.recorded.notified().await;
    tx.send(true).unwrap();

    let final_interval = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scan loop did not stop")
        .unwrap();

    assert_eq!(final_interval, 9_500);
    assert_eq!(sched.sink.records().len(), 1);
}

#[tokio::test]
async fn run_stops_when_sender_is_dropped() {
    let sched = Arc::new(scheduler(FakeSource::default()));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(Arc::clone(&sched).run(rx));
    sched.sink.recorded.notified().await;
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scan loop did not stop")
        .unwrap();
}
