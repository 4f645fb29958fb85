//! Request handlers

pub mod health;
pub mod reports;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clipstream_observability::metrics;
use serde::Serialize;

use crate::error::Result;
use crate::models::ApiResponse;

/// Wrap a handler result in the response envelope and count the request.
pub(crate) fn respond<T: Serialize>(endpoint: &str, result: Result<T>) -> Response {
    let response = match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => e.into_response(),
    };

    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[endpoint, response.status().as_str()])
        .inc();
    response
}
