//! File-backed SQLite store tests.

use std::sync::Arc;

use clipstream_store::{SqlValue, SqliteStore, Store};
use tempfile::TempDir;

#[tokio::test]
async fn test_open_runs_migrations_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clipstream.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        store
            .execute(
                "INSERT INTO videos (video_id, user_id, timestamp) VALUES (?, ?, ?)",
                &["100".into(), "49".into(), "t2".into()],
            )
            .await
            .unwrap();
        store.close().await;
    }

    // Reopening keeps data and does not reseed the leaderboard.
    let store = SqliteStore::open(&path).await.unwrap();
    let videos = store.query("SELECT COUNT(*) FROM videos", &[]).await.unwrap();
    assert_eq!(videos, vec![vec![SqlValue::Integer(1)]]);

    let leaderboard = store
        .query("SELECT COUNT(*) FROM leaderboard", &[])
        .await
        .unwrap();
    assert_eq!(leaderboard, vec![vec![SqlValue::Integer(1)]]);
}

#[tokio::test]
async fn test_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("concurrent.db")).await.unwrap());

    let mut handles = Vec::new();
    for task in 0..8i64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25i64 {
                store
                    .execute(
                        "INSERT INTO views (user_id, video_id, timestamp) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
                        &[
                            SqlValue::Integer(task),
                            SqlValue::Integer(100),
                            SqlValue::Text(format!("t{}", i)),
                        ],
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let rows = store
        .query("SELECT COUNT(*) FROM views WHERE video_id = ?", &[SqlValue::Integer(100)])
        .await
        .unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Integer(200)]]);
}

#[tokio::test]
async fn test_non_integer_ids_are_kept_as_text() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("ids.db")).await.unwrap();

    store
        .execute(
            "INSERT INTO users (user_id, country, ip, timestamp) VALUES (?, ?, ?, ?)",
            &["u-7".into(), "DE".into(), "10.0.0.1".into(), "t0".into()],
        )
        .await
        .unwrap();

    let rows = store.query("SELECT user_id FROM users", &[]).await.unwrap();
    assert_eq!(rows, vec![vec![SqlValue::Text("u-7".to_string())]]);
}
