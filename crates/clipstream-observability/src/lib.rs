//! clipstream Observability
//!
//! Prometheus metrics for the producer, the consumer and the reporting API.
//!
//! All metrics live in one process-wide [`REGISTRY`]. Call [`init`] once at
//! startup before serving `/metrics`; recording a metric never requires it.
//!
//! # Usage
//!
//! ```no_run
//! use clipstream_observability::metrics;
//!
//! metrics::init();
//! metrics::RECORDS_TOTAL.with_label_values(&["producer", "WATCH"]).inc();
//!
//! let metrics_router: axum::Router = clipstream_observability::create_metrics_router();
//! ```

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};

pub mod metrics;

pub use metrics::{init, REGISTRY};

/// Render every registered metric in the Prometheus text format.
pub fn render() -> prometheus::Result<String> {
    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}

async fn scrape() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// `GET /metrics`, mergeable into a router with any state.
pub fn create_metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(scrape))
}
