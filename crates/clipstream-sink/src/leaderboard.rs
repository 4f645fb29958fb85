//! Leaderboard recalculation.
//!
//! The leaderboard is a single row (`id = 1`) holding the most-watched video
//! and its view count. It is derived entirely from `views`, so a recompute is
//! idempotent: running it twice without new views stores the same entry.
//!
//! Ties on the view count go to the lowest video id.

use std::sync::Arc;
use std::time::Instant;

use clipstream_observability::metrics;
use clipstream_store::{SqlValue, Store};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RecalcError;

const MOST_WATCHED_SQL: &str = "SELECT video_id, COUNT(*) AS view_count \
     FROM views \
     GROUP BY video_id \
     ORDER BY view_count DESC, video_id ASC \
     LIMIT 1";

const UPSERT_SQL: &str = "INSERT INTO leaderboard \
     (id, most_watched_video_id, most_watched_video_count, updated_at) \
     VALUES (1, ?, ?, CURRENT_TIMESTAMP) \
     ON CONFLICT(id) DO UPDATE SET \
     most_watched_video_id = excluded.most_watched_video_id, \
     most_watched_video_count = excluded.most_watched_video_count, \
     updated_at = excluded.updated_at";

/// The most-watched video. `video_id` is `None` until the first successful
/// recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub video_id: Option<String>,
    pub view_count: i64,
}

/// Recomputes the leaderboard from the view history.
#[derive(Clone)]
pub struct Recalculator {
    store: Arc<dyn Store>,
}

impl Recalculator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Rank videos by view count and store the winner.
    ///
    /// # Errors
    ///
    /// `RecalcError::NoData` when no views exist; the stored entry is left as it
    /// was. `RecalcError::QueryFailure` when either statement fails.
    pub async fn recompute(&self) -> Result<LeaderboardEntry, RecalcError> {
        let started = Instant::now();

        let rows = self.store.query(MOST_WATCHED_SQL, &[]).await?;
        let Some(row) = rows.into_iter().next() else {
            debug!("No views recorded, leaderboard unchanged");
            return Err(RecalcError::NoData);
        };

        let video_id = row.first().cloned().unwrap_or(SqlValue::Null);
        let view_count = row.get(1).and_then(SqlValue::as_i64).unwrap_or(0);

        self.store
            .execute(UPSERT_SQL, &[video_id.clone(), SqlValue::Integer(view_count)])
            .await?;

        let entry = LeaderboardEntry {
            video_id: video_id.to_text(),
            view_count,
        };

        metrics::RECOMPUTE_LATENCY.observe(started.elapsed().as_secs_f64());
        metrics::LEADERBOARD_VIEW_COUNT.set(view_count);
        info!(
            video_id = entry.video_id.as_deref().unwrap_or("-"),
            view_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Leaderboard recomputed"
        );
        Ok(entry)
    }
}
