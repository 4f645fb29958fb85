//! Per-entity write aggregation.
//!
//! One decoded batch becomes up to three bulk writes:
//!
//! ```text
//! REGISTER ──▶ users   (user_id, country, ip, timestamp)
//! UPLOAD   ──▶ videos  (video_id, user_id, timestamp)
//! WATCH    ──▶ views   (user_id, video_id, timestamp)
//! LIKE     ──▶ dropped (counted)
//! ```
//!
//! Arrival order is kept within each group.

use std::fmt;

use clipstream_core::{EventPayload, Record};
use clipstream_store::SqlValue;
use serde::Serialize;

/// Destination table of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Users,
    Videos,
    Views,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Users, Entity::Videos, Entity::Views];

    pub fn table(&self) -> &'static str {
        match self {
            Entity::Users => "users",
            Entity::Videos => "videos",
            Entity::Views => "views",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A row that can be bulk-inserted into its entity table.
pub trait TableRow: Send + Sync {
    const ENTITY: Entity;

    /// Column names, in bind order.
    const COLUMNS: &'static [&'static str];

    /// Append this row's values in [`TableRow::COLUMNS`] order.
    fn push_values(&self, out: &mut Vec<SqlValue>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: String,
    pub country: String,
    pub ip: String,
    pub timestamp: String,
}

impl TableRow for UserRow {
    const ENTITY: Entity = Entity::Users;
    const COLUMNS: &'static [&'static str] = &["user_id", "country", "ip", "timestamp"];

    fn push_values(&self, out: &mut Vec<SqlValue>) {
        out.push(self.user_id.as_str().into());
        out.push(self.country.as_str().into());
        out.push(self.ip.as_str().into());
        out.push(self.timestamp.as_str().into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRow {
    pub video_id: String,
    pub user_id: String,
    pub timestamp: String,
}

impl TableRow for VideoRow {
    const ENTITY: Entity = Entity::Videos;
    const COLUMNS: &'static [&'static str] = &["video_id", "user_id", "timestamp"];

    fn push_values(&self, out: &mut Vec<SqlValue>) {
        out.push(self.video_id.as_str().into());
        out.push(self.user_id.as_str().into());
        out.push(self.timestamp.as_str().into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub user_id: String,
    pub video_id: String,
    pub timestamp: String,
}

impl TableRow for ViewRow {
    const ENTITY: Entity = Entity::Views;
    const COLUMNS: &'static [&'static str] = &["user_id", "video_id", "timestamp"];

    fn push_values(&self, out: &mut Vec<SqlValue>) {
        out.push(self.user_id.as_str().into());
        out.push(self.video_id.as_str().into());
        out.push(self.timestamp.as_str().into());
    }
}

/// The writes produced by one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedWrites {
    pub users: Vec<UserRow>,
    pub videos: Vec<VideoRow>,
    pub views: Vec<ViewRow>,
    pub likes_dropped: u64,
}

impl GroupedWrites {
    /// True when no group has rows; such a batch needs no write at all.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.videos.is_empty() && self.views.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.users.len() + self.videos.len() + self.views.len()
    }

    pub fn push(&mut self, record: Record) {
        let Record {
            timestamp,
            user_id,
            payload,
        } = record;

        match payload {
            EventPayload::Register { country, ip } => self.users.push(UserRow {
                user_id,
                country,
                ip,
                timestamp,
            }),
            EventPayload::Upload { video_id } => self.videos.push(VideoRow {
                video_id,
                user_id,
                timestamp,
            }),
            EventPayload::Watch { video_id } => self.views.push(ViewRow {
                user_id,
                video_id,
                timestamp,
            }),
            EventPayload::Like { .. } => self.likes_dropped += 1,
        }
    }
}

/// Group records by destination table.
pub fn aggregate<I>(records: I) -> GroupedWrites
where
    I: IntoIterator<Item = Record>,
{
    let mut grouped = GroupedWrites::default();
    for record in records {
        grouped.push(record);
    }
    grouped
}
