//! Reporting endpoints over the ingested tables.
//!
//! Every query binds its inputs as parameters.

use axum::extract::{Query, State};
use axum::response::Response;
use clipstream_store::{Row, SqlValue};

use super::respond;
use crate::error::{ApiError, Result};
use crate::models::{CountryViews, Stats, UserVideos, UsersQuery, ViewersQuery};
use crate::AppState;

const STATS_SQL: &str = "SELECT most_watched_video_id, most_watched_video_count, updated_at \
     FROM leaderboard WHERE id = 1";

const USER_VIDEOS_SQL: &str = "SELECT u.user_id, v.video_id \
     FROM videos v INNER JOIN users u ON v.user_id = u.user_id \
     WHERE u.country = ? \
     ORDER BY u.user_id, v.video_id";

const VIEWERS_SQL: &str = "SELECT u.country, COUNT(v.user_id) AS views_qty \
     FROM views v INNER JOIN users u ON v.user_id = u.user_id \
     WHERE v.video_id = ? \
     GROUP BY u.country \
     ORDER BY u.country";

/// `GET /stats`
pub async fn stats(State(state): State<AppState>) -> Response {
    respond("stats", load_stats(&state).await)
}

/// `GET /users?country=XX`
pub async fn users(State(state): State<AppState>, Query(query): Query<UsersQuery>) -> Response {
    respond("users", load_users(&state, query).await)
}

/// `GET /viewers?video_id=N`
pub async fn viewers(
    State(state): State<AppState>,
    Query(query): Query<ViewersQuery>,
) -> Response {
    respond("viewers", load_viewers(&state, query).await)
}

async fn load_stats(state: &AppState) -> Result<Stats> {
    let rows = state.store.query(STATS_SQL, &[]).await?;
    let row = rows.into_iter().next().unwrap_or_default();

    Ok(Stats {
        most_watched_video_id: column(&row, 0),
        most_watched_video_count: column(&row, 1).as_i64().unwrap_or(0),
        updated_at: column(&row, 2).to_text(),
    })
}

async fn load_users(state: &AppState, query: UsersQuery) -> Result<Vec<UserVideos>> {
    let country = required(query.country, "country")?;
    let rows = state.store.query(USER_VIDEOS_SQL, &[country.into()]).await?;
    Ok(group_uploads(rows))
}

async fn load_viewers(state: &AppState, query: ViewersQuery) -> Result<Vec<CountryViews>> {
    let video_id = required(query.video_id, "video_id")?;
    let rows = state.store.query(VIEWERS_SQL, &[video_id.into()]).await?;

    Ok(rows
        .iter()
        .map(|row| CountryViews {
            country: column(row, 0).to_text(),
            views_qty: column(row, 1).as_i64().unwrap_or(0),
        })
        .collect())
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParam(name))
}

fn column(row: &Row, index: usize) -> SqlValue {
    row.get(index).cloned().unwrap_or(SqlValue::Null)
}

/// Fold `(user_id, video_id)` rows, ordered by user, into one entry per user.
fn group_uploads(rows: Vec<Row>) -> Vec<UserVideos> {
    let mut users: Vec<UserVideos> = Vec::new();

    for row in rows {
        let user_id = column(&row, 0);
        let video_id = column(&row, 1);

        match users.last_mut() {
            Some(last) if last.user_id == user_id => last.video_ids.push(video_id),
            _ => users.push(UserVideos {
                user_id,
                video_ids: vec![video_id],
            }),
        }
    }

    users
}
