//! Producer to consumer over the in-memory broker, against real SQLite.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clipstream_producer::{BatchFramer, FramerConfig};
use clipstream_sink::{Consumer, Entity, RecalcError, SessionReport, SinkConfig, WriterConfig};
use clipstream_store::{Row, SqlValue, SqliteStore, Store, StoreError};
use clipstream_transport::MemoryBroker;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SCENARIO: &str = "t1 REGISTER 49 SG 1.2.3.4\n\
                        t2 UPLOAD 49 100\n\
                        t3 WATCH 49 100\n\
                        t3 WATCH 50 100\n";

async fn publish(broker: &MemoryBroker, input: &str, batch_size: usize) {
    BatchFramer::new(
        Arc::new(broker.clone()),
        FramerConfig {
            batch_size,
            ..Default::default()
        },
    )
    .run(input.as_bytes())
    .await
    .unwrap();
}

/// Run a consumer until the topic is drained and return its reports.
async fn consume(
    broker: &MemoryBroker,
    store: Arc<dyn Store>,
    config: SinkConfig,
) -> Vec<SessionReport> {
    broker.close("events");
    let (tx, mut rx) = mpsc::unbounded_channel();
    Consumer::new(Arc::new(broker.clone()), store, config)
        .with_report_channel(tx)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let mut reports = Vec::new();
    while let Some(report) = rx.recv().await {
        reports.push(report);
    }
    reports
}

async fn count(store: &dyn Store, sql: &str) -> i64 {
    let rows = store.query(sql, &[]).await.unwrap();
    rows[0][0].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// Store wrappers
// ---------------------------------------------------------------------------

/// Delays every insert into `views` by a varying amount so batch writes
/// finish out of order.
struct SlowViews {
    inner: SqliteStore,
    calls: AtomicU64,
}

#[async_trait]
impl Store for SlowViews {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        if sql.starts_with("INSERT INTO views") {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis((7 - n % 7) * 3)).await;
        }
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.inner.query(sql, params).await
    }
}

/// Rejects every insert into `videos`.
struct BrokenVideos {
    inner: SqliteStore,
}

#[async_trait]
impl Store for BrokenVideos {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        if sql.starts_with("INSERT INTO videos") {
            return Err(StoreError::ConstraintViolation("videos is read-only".into()));
        }
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.inner.query(sql, params).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scenario_end_to_end() {
    let broker = MemoryBroker::new();
    publish(&broker, SCENARIO, 4).await;
    assert_eq!(broker.published("events"), 3);

    let store = Arc::new(SqliteStore::new_in_memory().await.unwrap());
    let reports = consume(&broker, store.clone(), SinkConfig::default()).await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(!report.degraded);
    assert_eq!(report.rows.users, 1);
    assert_eq!(report.rows.videos, 1);
    assert_eq!(report.rows.views, 2);

    let entry = report.leaderboard.clone().unwrap();
    assert_eq!(entry.video_id.as_deref(), Some("100"));
    assert_eq!(entry.view_count, 2);

    assert_eq!(count(store.as_ref(), "SELECT COUNT(*) FROM users").await, 1);
    assert_eq!(
        count(
            store.as_ref(),
            "SELECT most_watched_video_count FROM leaderboard WHERE id = 1"
        )
        .await,
        2
    );
}

#[tokio::test]
async fn test_leaderboard_sees_every_concurrent_write() {
    let mut input = String::new();
    let mut expected_top = 0;
    for i in 0..400 {
        // Video 3 gets every fourth view plus one extra, so it wins.
        let video = if i % 4 == 0 || i == 1 { 3 } else { i % 4 + 10 };
        if video == 3 {
            expected_top += 1;
        }
        input.push_str(&format!("ts{} WATCH {} {}\n", i, i, video));
    }

    let broker = MemoryBroker::new();
    publish(&broker, &input, 5).await;

    let store = Arc::new(SlowViews {
        inner: SqliteStore::new_in_memory().await.unwrap(),
        calls: AtomicU64::new(0),
    });
    let config = SinkConfig {
        max_inflight_batches: 8,
        ..Default::default()
    };
    let reports = consume(&broker, store.clone(), config).await;

    let report = &reports[0];
    assert_eq!(report.batches_dispatched, 80);
    assert_eq!(report.batches_completed, 80);
    assert_eq!(report.rows.views, 400);

    let entry = report.leaderboard.clone().unwrap();
    assert_eq!(entry.video_id.as_deref(), Some("3"));
    assert_eq!(entry.view_count, expected_top);
}

#[tokio::test]
async fn test_back_to_back_sessions_recompute_their_own_views() {
    let broker = MemoryBroker::new();
    publish(&broker, "t1 WATCH 1 7\nt2 WATCH 2 7\nt3 WATCH 3 7\n", 1).await;
    publish(
        &broker,
        "t4 WATCH 1 8\nt5 WATCH 2 8\nt6 WATCH 3 8\nt7 WATCH 4 8\nt8 WATCH 5 8\n",
        1,
    )
    .await;

    // Both sessions are queued before the consumer starts, and view writes
    // are slow, so the second session's batches arrive while the first one
    // is still settling.
    let store = Arc::new(SlowViews {
        inner: SqliteStore::new_in_memory().await.unwrap(),
        calls: AtomicU64::new(0),
    });
    let reports = consume(&broker, store, SinkConfig::default()).await;

    assert_eq!(reports.len(), 2);
    let first = reports[0].leaderboard.clone().unwrap();
    assert_eq!(first.video_id.as_deref(), Some("7"));
    assert_eq!(first.view_count, 3);

    let second = reports[1].leaderboard.clone().unwrap();
    assert_eq!(second.video_id.as_deref(), Some("8"));
    assert_eq!(second.view_count, 5);
}

#[tokio::test]
async fn test_write_failure_degrades_session() {
    let broker = MemoryBroker::new();
    publish(&broker, SCENARIO, 4).await;

    let store = Arc::new(BrokenVideos {
        inner: SqliteStore::new_in_memory().await.unwrap(),
    });
    let reports = consume(&broker, store, SinkConfig::default()).await;

    let report = &reports[0];
    assert!(report.degraded);
    assert_eq!(report.batches_failed, 1);
    assert_eq!(report.write_errors.len(), 1);
    assert_eq!(report.write_errors[0].entity, Entity::Videos);
    assert_eq!(report.write_errors[0].attempts, 1);
    assert_eq!(report.outcome(), "degraded");

    // The other entities still landed and the leaderboard was recomputed.
    assert_eq!(report.rows.views, 2);
    assert_eq!(report.leaderboard.clone().unwrap().view_count, 2);
}

#[tokio::test]
async fn test_sessions_accumulate_in_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clipstream.db");

    let broker = MemoryBroker::new();
    publish(&broker, SCENARIO, 2).await;
    publish(&broker, "t9 WATCH 51 200\nt9 WATCH 52 200\nt9 WATCH 53 200\n", 2).await;

    let store = Arc::new(SqliteStore::open(&path).await.unwrap());
    let config = SinkConfig {
        writer: WriterConfig {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let reports = consume(&broker, store.clone(), config).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].session_id, 1);
    assert_eq!(reports[1].session_id, 2);
    assert_eq!(reports[0].leaderboard.clone().unwrap().view_count, 2);

    let second = reports[1].leaderboard.clone().unwrap();
    assert_eq!(second.video_id.as_deref(), Some("200"));
    assert_eq!(second.view_count, 3);
    store.close().await;

    // The leaderboard survives a reopen.
    let reopened = SqliteStore::open(&path).await.unwrap();
    assert_eq!(
        count(
            &reopened,
            "SELECT most_watched_video_id FROM leaderboard WHERE id = 1"
        )
        .await,
        200
    );
}

#[tokio::test]
async fn test_session_without_views_reports_no_data() {
    let broker = MemoryBroker::new();
    publish(&broker, "t1 REGISTER 49 SG 1.2.3.4\nt2 LIKE 49 100\n", 10).await;

    let store = Arc::new(SqliteStore::new_in_memory().await.unwrap());
    let reports = consume(&broker, store, SinkConfig::default()).await;

    let report = &reports[0];
    assert_eq!(report.rows.users, 1);
    assert_eq!(report.leaderboard, Err(RecalcError::NoData));
}
