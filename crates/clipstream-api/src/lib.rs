//! clipstream Reporting API
//!
//! Read-only HTTP/JSON endpoints over the tables the consumer fills.
//!
//! ## Endpoints
//!
//! - `GET /stats`: the leaderboard entry
//! - `GET /users?country=XX`: users from a country with the ids of the videos
//!   they uploaded
//! - `GET /viewers?video_id=N`: view counts of one video per viewer country
//! - `GET /health`: store reachability
//! - `GET /metrics`: Prometheus metrics
//!
//! Reporting endpoints answer with the envelope `{"status", "data", "err"}`;
//! a missing or empty required parameter is a 400.

use std::future::Future;
use std::sync::Arc;

use axum::{routing::get, Router};
use clipstream_store::Store;
use tracing::info;

pub mod error;
pub mod handlers;
pub mod models;

pub use error::{ApiError, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(handlers::reports::stats))
        .route("/users", get(handlers::reports::users))
        .route("/viewers", get(handlers::reports::viewers))
        .route("/health", get(handlers::health::health_check))
        .merge(clipstream_observability::create_metrics_router::<AppState>())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves, letting in-flight
/// requests finish.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Reporting API listening on {}", addr);
        info!("   Health: http://{}/health", addr);
        info!("   Metrics: http://{}/metrics", addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
