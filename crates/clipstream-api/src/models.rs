//! API models for the reporting endpoints

use clipstream_store::SqlValue;
use serde::{Deserialize, Serialize};

/// Response envelope shared by every reporting endpoint.
///
/// ```json
/// {"status": "OK", "data": {...}, "err": null}
/// {"status": "ERROR", "data": null, "err": "Bad Request"}
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: Option<T>,
    pub err: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: "OK",
            data: Some(data),
            err: None,
        }
    }

    pub fn error(err: impl Into<String>) -> Self {
        Self {
            status: "ERROR",
            data: None,
            err: Some(err.into()),
        }
    }
}

/// `GET /stats`: the stored leaderboard entry.
#[derive(Debug, Serialize)]
pub struct Stats {
    pub most_watched_video_id: SqlValue,
    pub most_watched_video_count: i64,
    pub updated_at: Option<String>,
}

/// `GET /users`: one user of the requested country and the videos they
/// uploaded.
#[derive(Debug, Serialize)]
pub struct UserVideos {
    pub user_id: SqlValue,
    pub video_ids: Vec<SqlValue>,
}

/// `GET /viewers`: views of one video from one country.
#[derive(Debug, Serialize)]
pub struct CountryViews {
    pub country: Option<String>,
    #[serde(rename = "viewsQty")]
    pub views_qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ViewersQuery {
    pub video_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}
