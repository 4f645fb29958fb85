//! Integration tests for the reporting API
//!
//! Builds the real router over an in-memory SQLite store seeded with the
//! scenario data, then sends requests via tower::ServiceExt.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use clipstream_api::{create_router, AppState};
use clipstream_store::{SqliteStore, Store};

async fn seeded_store() -> SqliteStore {
    let store = SqliteStore::new_in_memory().await.unwrap();
    let statements = [
        "INSERT INTO users (user_id, country, ip, timestamp) VALUES \
         (49, 'SG', '1.2.3.4', 't1'), (50, 'SG', '1.2.3.5', 't1'), (51, 'US', '1.2.3.6', 't1')",
        "INSERT INTO videos (video_id, user_id, timestamp) VALUES \
         (100, 49, 't2'), (101, 49, 't2'), (200, 51, 't2')",
        "INSERT INTO views (user_id, video_id, timestamp) VALUES \
         (49, 100, 't3'), (50, 100, 't3'), (51, 100, 't4')",
        "UPDATE leaderboard SET most_watched_video_id = 100, most_watched_video_count = 3 \
         WHERE id = 1",
    ];
    for sql in statements {
        store.execute(sql, &[]).await.unwrap();
    }
    store
}

async fn test_app() -> axum::Router {
    let store = Arc::new(seeded_store().await) as Arc<dyn Store>;
    create_router(AppState { store })
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

// ---------------------------------------------------------------
// Reports
// ---------------------------------------------------------------

#[tokio::test]
async fn test_stats() {
    let (status, json) = get(test_app().await, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
    assert_eq!(json["err"], serde_json::Value::Null);
    assert_eq!(json["data"]["most_watched_video_id"], 100);
    assert_eq!(json["data"]["most_watched_video_count"], 3);
}

#[tokio::test]
async fn test_stats_before_first_recompute() {
    let store = Arc::new(SqliteStore::new_in_memory().await.unwrap()) as Arc<dyn Store>;
    let (status, json) = get(create_router(AppState { store }), "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["most_watched_video_id"], serde_json::Value::Null);
    assert_eq!(json["data"]["most_watched_video_count"], 0);
}

#[tokio::test]
async fn test_users_by_country() {
    let (status, json) = get(test_app().await, "/users?country=SG").await;

    assert_eq!(status, StatusCode::OK);
    // User 50 uploaded nothing and is not listed.
    assert_eq!(
        json["data"],
        serde_json::json!([{"user_id": 49, "video_ids": [100, 101]}])
    );
}

#[tokio::test]
async fn test_users_requires_country() {
    for uri in ["/users", "/users?country="] {
        let (status, json) = get(test_app().await, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["data"], serde_json::Value::Null);
        assert_eq!(json["err"], "Bad Request");
    }
}

#[tokio::test]
async fn test_viewers_by_country() {
    let (status, json) = get(test_app().await, "/viewers?video_id=100").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["data"],
        serde_json::json!([
            {"country": "SG", "viewsQty": 2},
            {"country": "US", "viewsQty": 1}
        ])
    );
}

#[tokio::test]
async fn test_viewers_unknown_video_is_empty() {
    let (status, json) = get(test_app().await, "/viewers?video_id=999").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_viewers_requires_video_id() {
    let (status, json) = get(test_app().await, "/viewers").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "ERROR");
}

// ---------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------

#[tokio::test]
async fn test_health_check() {
    let (status, json) = get(test_app().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_are_served() {
    clipstream_observability::init();
    let app = test_app().await;

    // Generate a request so the API counter has a sample.
    let _ = get(app.clone(), "/stats").await;

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("clipstream_api_requests_total"));
}
