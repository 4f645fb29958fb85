//! Health endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::warn;

use crate::models::HealthResponse;
use crate::AppState;

/// Reports `ok` when the store answers a trivial query.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.query("SELECT 1", &[]).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                }),
            )
        }
    }
}
