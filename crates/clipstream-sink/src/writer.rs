//! Durable writer.
//!
//! Applies [`GroupedWrites`] to the store as parameterized multi-row inserts:
//!
//! ```text
//! INSERT INTO views (user_id, video_id, timestamp)
//! VALUES (?, ?, ?), (?, ?, ?), ...
//! ON CONFLICT DO NOTHING
//! ```
//!
//! - rows are chunked so one statement never binds more than
//!   [`MAX_BIND_PARAMS`] values
//! - `ON CONFLICT DO NOTHING` makes a redelivered batch a no-op instead of a
//!   constraint failure
//! - every attempt is bounded by `write_timeout`; transient failures are
//!   retried per the [`RetryPolicy`]
//! - [`DurableWriter::write_batch`] runs the three entity writes concurrently
//!   and waits for all of them

use std::sync::Arc;
use std::time::{Duration, Instant};

use clipstream_observability::metrics;
use clipstream_store::{SqlValue, Store, StoreError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{Entity, GroupedWrites, TableRow};
use crate::config::WriterConfig;
use crate::error::WriteError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// SQLite's default limit on bound parameters per statement.
pub const MAX_BIND_PARAMS: usize = 999;

/// Rows inserted, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub users: u64,
    pub videos: u64,
    pub views: u64,
}

impl RowCounts {
    pub fn get(&self, entity: Entity) -> u64 {
        match entity {
            Entity::Users => self.users,
            Entity::Videos => self.videos,
            Entity::Views => self.views,
        }
    }

    pub fn add(&mut self, entity: Entity, rows: u64) {
        match entity {
            Entity::Users => self.users += rows,
            Entity::Videos => self.videos += rows,
            Entity::Views => self.views += rows,
        }
    }

    pub fn merge(&mut self, other: &RowCounts) {
        for entity in Entity::ALL {
            self.add(entity, other.get(entity));
        }
    }

    pub fn total(&self) -> u64 {
        self.users + self.videos + self.views
    }
}

/// Result of writing one batch: what landed, and every entity that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub rows: RowCounts,
    pub errors: Vec<WriteError>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Build a multi-row `INSERT ... ON CONFLICT DO NOTHING` with `?` placeholders.
pub fn build_insert_sql(table: &str, columns: &[&str], num_rows: usize) -> String {
    let col_list = columns.join(", ");
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", table, col_list);

    let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    for row in 0..num_rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&row_placeholders);
    }

    sql.push_str(" ON CONFLICT DO NOTHING");
    sql
}

/// Rows per statement for a table with `column_count` columns.
fn rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Writes grouped rows to the store.
pub struct DurableWriter {
    store: Arc<dyn Store>,
    write_timeout: Duration,
    retry: RetryPolicy,
}

impl DurableWriter {
    pub fn new(store: Arc<dyn Store>, config: &WriterConfig) -> Self {
        Self {
            store,
            write_timeout: config.write_timeout(),
            retry: config.retry_policy(),
        }
    }

    /// Insert `rows` into their entity table and return how many were new.
    ///
    /// An empty slice is a no-op and never touches the store.
    pub async fn write<R: TableRow>(&self, rows: &[R]) -> Result<u64, WriteError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let table = R::ENTITY.table();
        let started = Instant::now();
        let mut written = 0u64;

        for chunk in rows.chunks(rows_per_statement(R::COLUMNS.len())) {
            let sql = build_insert_sql(table, R::COLUMNS, chunk.len());
            let mut params = Vec::with_capacity(chunk.len() * R::COLUMNS.len());
            for row in chunk {
                row.push_values(&mut params);
            }

            match self.execute_with_retry(R::ENTITY, &sql, &params).await {
                Ok(affected) => written += affected,
                Err(error) => {
                    metrics::ROWS_WRITTEN_TOTAL
                        .with_label_values(&[table])
                        .inc_by(written);
                    metrics::WRITE_ERRORS_TOTAL
                        .with_label_values(&[table, error.cause()])
                        .inc();
                    warn!(table, rows = rows.len(), written, error = %error, "Entity write failed");
                    return Err(error);
                }
            }
        }

        let elapsed = started.elapsed();
        metrics::ROWS_WRITTEN_TOTAL
            .with_label_values(&[table])
            .inc_by(written);
        metrics::WRITE_LATENCY
            .with_label_values(&[table])
            .observe(elapsed.as_secs_f64());
        debug!(
            table,
            rows = rows.len(),
            written,
            elapsed_ms = elapsed.as_millis() as u64,
            "Entity write complete"
        );
        Ok(written)
    }

    async fn execute_with_retry(
        &self,
        entity: Entity,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, WriteError> {
        let store = &self.store;
        let write_timeout = self.write_timeout;

        retry_with_backoff(&self.retry, entity.table(), || async move {
            match tokio::time::timeout(write_timeout, store.execute(sql, params)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(format!(
                    "write exceeded {}ms",
                    write_timeout.as_millis()
                ))),
            }
        })
        .await
        .map_err(|exhausted| WriteError {
            entity,
            attempts: exhausted.attempts,
            source: exhausted.error,
        })
    }

    /// Write all three groups concurrently and wait for every one of them.
    pub async fn write_batch(&self, writes: &GroupedWrites) -> BatchOutcome {
        let (users, videos, views) = tokio::join!(
            self.write(&writes.users),
            self.write(&writes.videos),
            self.write(&writes.views),
        );

        let mut outcome = BatchOutcome::default();
        for (entity, result) in [
            (Entity::Users, users),
            (Entity::Videos, videos),
            (Entity::Views, views),
        ] {
            match result {
                Ok(rows) => outcome.rows.add(entity, rows),
                Err(error) => outcome.errors.push(error),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, UserRow, ViewRow};
    use clipstream_core::parse;
    use clipstream_store::SqliteStore;

    #[test]
    fn test_build_insert_sql() {
        let sql = build_insert_sql("views", ViewRow::COLUMNS, 2);
        assert_eq!(
            sql,
            "INSERT INTO views (user_id, video_id, timestamp) VALUES (?, ?, ?), (?, ?, ?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_rows_per_statement_respects_bind_limit() {
        assert_eq!(rows_per_statement(3), 333);
        assert_eq!(rows_per_statement(4), 249);
        assert!(rows_per_statement(4) * UserRow::COLUMNS.len() <= MAX_BIND_PARAMS);
    }

    async fn writer() -> (DurableWriter, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new_in_memory().await.unwrap());
        let writer = DurableWriter::new(store.clone(), &WriterConfig::default());
        (writer, store)
    }

    #[tokio::test]
    async fn test_empty_write_is_noop() {
        let (writer, _store) = writer().await;
        let rows: Vec<ViewRow> = Vec::new();
        assert_eq!(writer.write(&rows).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_batch_scenario() {
        let (writer, store) = writer().await;
        let grouped = aggregate(
            [
                "t1 REGISTER 49 SG 1.2.3.4",
                "t2 UPLOAD 49 100",
                "t3 WATCH 49 100",
                "t3 WATCH 50 100",
            ]
            .iter()
            .map(|l| parse(l).unwrap()),
        );

        let outcome = writer.write_batch(&grouped).await;
        assert!(outcome.is_success());
        assert_eq!(
            outcome.rows,
            RowCounts {
                users: 1,
                videos: 1,
                views: 2
            }
        );

        // Redelivery inserts nothing new and does not fail.
        let again = writer.write_batch(&grouped).await;
        assert!(again.is_success());
        assert_eq!(again.rows.total(), 0);

        let views = store.query("SELECT COUNT(*) FROM views", &[]).await.unwrap();
        assert_eq!(views, vec![vec![SqlValue::Integer(2)]]);
    }

    #[tokio::test]
    async fn test_large_write_is_chunked() {
        let (writer, store) = writer().await;
        let rows: Vec<ViewRow> = (0..1000)
            .map(|i| ViewRow {
                user_id: (i % 50).to_string(),
                video_id: (i % 7).to_string(),
                timestamp: format!("t{}", i),
            })
            .collect();

        assert_eq!(writer.write(&rows).await.unwrap(), 1000);
        let count = store.query("SELECT COUNT(*) FROM views", &[]).await.unwrap();
        assert_eq!(count, vec![vec![SqlValue::Integer(1000)]]);
    }
}
