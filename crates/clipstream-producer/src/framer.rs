//! Session framing for one producer run.
//!
//! A run publishes, in order:
//!
//! ```text
//! SESS_START
//! batch 1          (max_batch_size records)
//! batch 2
//! ...
//! batch N          (partial, flushed at end of input)
//! SESS_END
//! ```
//!
//! Invalid lines are counted and dropped. LIKE records are counted and
//! dropped. Every publish is awaited before the next line is read, so the
//! order above is the order the transport sees.
//!
//! ## Usage
//!
//! ```ignore
//! let publisher: Arc<dyn Publisher> = Arc::new(TcpTransport::new("127.0.0.1:4150"));
//! let file = tokio::fs::File::open("data.dump").await?;
//!
//! let stats = BatchFramer::new(publisher, FramerConfig::default())
//!     .run(tokio::io::BufReader::new(file))
//!     .await?;
//! println!("{}", stats);
//! ```

use std::sync::Arc;

use clipstream_core::{parse, ControlMessage, ParseError};
use clipstream_observability::metrics;
use clipstream_transport::Publisher;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::batch::BatchBuffer;
use crate::error::Result;
use crate::stats::ProducerStats;

const METRIC_SIDE: &str = "producer";

/// Producer configuration
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Topic to publish to
    pub topic: String,
    /// Maximum records per batch message
    pub batch_size: usize,
    /// Log progress every this many lines (0 disables)
    pub progress_interval: u64,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            topic: "events".to_string(),
            batch_size: 100,
            progress_interval: 10_000,
        }
    }
}

/// Turns a line source into a framed session on the transport.
pub struct BatchFramer {
    publisher: Arc<dyn Publisher>,
    config: FramerConfig,
    buffer: BatchBuffer,
    stats: ProducerStats,
}

impl BatchFramer {
    pub fn new(publisher: Arc<dyn Publisher>, config: FramerConfig) -> Self {
        let buffer = BatchBuffer::new(config.batch_size);
        Self {
            publisher,
            config,
            buffer,
            stats: ProducerStats::default(),
        }
    }

    /// Publish a whole session from `reader` and return the run's totals.
    ///
    /// # Errors
    ///
    /// A read failure or a failed publish aborts the run. `SESS_END` is not
    /// published in that case, so the consumer never recomputes over a
    /// truncated session.
    pub async fn run<R>(mut self, reader: R) -> Result<ProducerStats>
    where
        R: AsyncBufRead + Unpin,
    {
        info!(
            topic = %self.config.topic,
            batch_size = self.buffer.max_batch_size(),
            "Starting session"
        );
        self.publish_control(ControlMessage::SessionStart).await?;

        let mut lines = reader.split(b'\n');
        while let Some(mut raw) = lines.next_segment().await? {
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            match String::from_utf8(raw) {
                Ok(line) => self.push_line(&line).await?,
                Err(e) => self.reject_line(&ParseError::MalformedLine(e.to_string())),
            }
        }

        self.flush().await?;
        self.publish_control(ControlMessage::SessionEnd).await?;

        info!(
            lines = self.stats.lines,
            published = self.stats.records_published(),
            errors = self.stats.errors,
            batches = self.stats.batches_sent,
            "Session published"
        );
        Ok(self.stats)
    }

    /// Validate one line and buffer it, publishing the batch when it fills up.
    async fn push_line(&mut self, line: &str) -> Result<()> {
        self.stats.lines += 1;

        match parse(line) {
            Ok(record) => {
                let kind = record.kind();
                self.stats.records.increment(kind);
                metrics::RECORDS_TOTAL
                    .with_label_values(&[METRIC_SIDE, kind.as_str()])
                    .inc();

                if kind.is_persisted() {
                    self.buffer.append(&record);
                    if self.buffer.should_flush() {
                        self.flush().await?;
                    }
                }
            }
            Err(e) => self.count_rejected(&e),
        }

        self.log_progress();
        Ok(())
    }

    /// A line that is not even text: counted like any other invalid line.
    fn reject_line(&mut self, error: &ParseError) {
        self.stats.lines += 1;
        self.count_rejected(error);
        self.log_progress();
    }

    fn count_rejected(&mut self, error: &ParseError) {
        self.stats.errors += 1;
        metrics::PARSE_ERRORS_TOTAL
            .with_label_values(&[METRIC_SIDE, error.label()])
            .inc();
        warn!(line_number = self.stats.lines, error = %error, "Dropping invalid line");
    }

    fn log_progress(&self) {
        if self.config.progress_interval > 0 && self.stats.lines % self.config.progress_interval == 0
        {
            info!(lines = self.stats.lines, "Records processed");
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let records = self.buffer.len();
        let payload = self.buffer.drain();
        self.publisher.publish(&self.config.topic, payload).await?;

        self.stats.batches_sent += 1;
        metrics::BATCHES_PUBLISHED_TOTAL.inc();
        debug!(records, batch = self.stats.batches_sent, "Published batch");
        Ok(())
    }

    async fn publish_control(&self, control: ControlMessage) -> Result<()> {
        self.publisher
            .publish(&self.config.topic, control.to_payload())
            .await?;
        debug!(%control, "Published control message");
        Ok(())
    }
}
