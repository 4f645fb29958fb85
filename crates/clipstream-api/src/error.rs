//! API error type, rendered as the `ERROR` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clipstream_store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ApiResponse;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A required query parameter is missing or empty.
    #[error("missing query parameter: {0}")]
    MissingParam(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParam(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::MissingParam(_) => status
                .canonical_reason()
                .unwrap_or("Bad Request")
                .to_string(),
            ApiError::Store(e) => {
                error!(error = %e, "Reporting query failed");
                e.to_string()
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
