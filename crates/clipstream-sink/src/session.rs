//! Session Controller
//!
//! Drives one subscription's deliveries through the session state machine:
//!
//! ```text
//!            SESS_START                 SESS_END
//!   Idle ───────────────▶ Running ───────────────▶ Draining ──▶ Idle
//!     │                     │  ▲                      │
//!     │ batch (implicit     │  │ batch: reserve slot, │ wait barrier,
//!     │ session, warn)      └──┘ spawn write          │ recompute leaderboard
//!     └────────────────────▶                          ▼
//!                                                SessionReport
//! ```
//!
//! ## Ordering
//!
//! Deliveries are handled one at a time in transport order. Batch writes run
//! as spawned tasks (at most `max_inflight_batches` at once) and each reserves
//! a slot on the session's [`FlushBarrier`] before it is spawned. Because the
//! transport is FIFO, every batch published before `SESS_END` has reserved its
//! slot by the time `SESS_END` is handled, so waiting on the barrier is enough
//! for the recompute to see every view of the session.
//!
//! Closing a session (barrier wait and recompute) is awaited inline, so the
//! next session's deliveries are handled only after the previous session has
//! been reported and its recompute cannot see the next session's views.
//!
//! ## Acknowledgement
//!
//! - control messages and undecodable payloads: acked once handled
//! - batches: acked by the write task after its barrier slot is resolved,
//!   whether the write succeeded or failed (failures are carried by the report)
//!
//! ## Shutdown
//!
//! Once the shutdown token fires, no recompute is started. [`SessionController::drain`]
//! waits for in-flight writes of the open session and reports it as cancelled.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clipstream_core::{decode, ControlMessage, KindCounts, Message, Records};
use clipstream_observability::metrics;
use clipstream_store::Store;
use clipstream_transport::{Acker, Delivery};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::barrier::FlushBarrier;
use crate::config::SinkConfig;
use crate::error::{RecalcError, WriteError};
use crate::leaderboard::{LeaderboardEntry, Recalculator};
use crate::writer::{DurableWriter, RowCounts};

const METRIC_SIDE: &str = "consumer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Draining,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Draining => write!(f, "draining"),
        }
    }
}

/// Summary of one closed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: u64,
    pub batches_dispatched: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub rows: RowCounts,
    /// Valid records received, per kind (LIKE included, although never written)
    pub records: KindCounts,
    pub parse_errors: u64,
    pub undecodable: u64,
    pub write_errors: Vec<WriteError>,
    /// At least one batch failed, so the leaderboard was computed over
    /// incomplete data.
    pub degraded: bool,
    pub leaderboard: Result<LeaderboardEntry, RecalcError>,
    pub elapsed: Duration,
}

impl SessionReport {
    /// Metric label for how the session closed.
    pub fn outcome(&self) -> &'static str {
        match &self.leaderboard {
            Err(RecalcError::Cancelled) => "shutdown",
            _ if self.degraded => "degraded",
            Err(RecalcError::QueryFailure(_)) => "recompute_failed",
            _ => "clean",
        }
    }
}

/// Per-session bookkeeping while a session is open.
struct OpenSession {
    id: u64,
    barrier: FlushBarrier,
    records: KindCounts,
    parse_errors: u64,
    undecodable: u64,
    started: Instant,
}

impl OpenSession {
    fn new(id: u64) -> Self {
        Self {
            id,
            barrier: FlushBarrier::new(),
            records: KindCounts::default(),
            parse_errors: 0,
            undecodable: 0,
            started: Instant::now(),
        }
    }
}

/// Session state machine for one subscription.
pub struct SessionController {
    writer: Arc<DurableWriter>,
    recalculator: Recalculator,
    permits: Arc<Semaphore>,
    recompute_timeout: Duration,
    shutdown: CancellationToken,
    state: SessionState,
    session: Option<OpenSession>,
    next_session_id: u64,
}

impl SessionController {
    pub fn new(store: Arc<dyn Store>, config: &SinkConfig, shutdown: CancellationToken) -> Self {
        Self {
            writer: Arc::new(DurableWriter::new(store.clone(), &config.writer)),
            recalculator: Recalculator::new(store),
            permits: Arc::new(Semaphore::new(config.max_inflight_batches.max(1))),
            recompute_timeout: config.recompute_timeout(),
            shutdown,
            state: SessionState::Idle,
            session: None,
            next_session_id: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the open session, if any.
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Handle one delivery. Returns a report when the delivery closed a session.
    pub async fn handle(&mut self, delivery: Delivery) -> Option<SessionReport> {
        let (payload, acker) = delivery.into_parts();

        match decode(&payload) {
            Err(e) => {
                metrics::UNDECODABLE_PAYLOADS_TOTAL.inc();
                if let Some(session) = self.session.as_mut() {
                    session.undecodable += 1;
                }
                warn!(bytes = payload.len(), error = %e, "Dropping undecodable payload");
                acker.ack();
                None
            }
            Ok(Message::Control(ControlMessage::SessionStart)) => {
                self.start_session();
                acker.ack();
                None
            }
            Ok(Message::Control(ControlMessage::SessionEnd)) => {
                let report = self.close_session(true).await;
                acker.ack();
                Some(report)
            }
            Ok(Message::Batch(records)) => {
                self.dispatch_batch(records, acker).await;
                None
            }
        }
    }

    /// Wait for the open session's writes and close it without a recompute.
    /// Returns `None` when no session is open.
    pub async fn drain(&mut self) -> Option<SessionReport> {
        if self.session.is_none() {
            return None;
        }
        info!("Draining open session");
        Some(self.close_session(false).await)
    }

    fn start_session(&mut self) {
        if let Some(session) = &self.session {
            warn!(
                session_id = session.id,
                outstanding = session.barrier.snapshot().outstanding(),
                "SESS_START while a session is running, treating as restart"
            );
            return;
        }

        let id = self.open_session();
        info!(session_id = id, "Session started");
    }

    fn open_session(&mut self) -> u64 {
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.session = Some(OpenSession::new(id));
        self.state = SessionState::Running;
        id
    }

    async fn dispatch_batch(&mut self, mut records: Records<'_>, acker: Acker) {
        metrics::BATCHES_RECEIVED_TOTAL.inc();

        let mut counts = KindCounts::default();
        let grouped = aggregate(records.by_ref().inspect(|record| {
            let kind = record.kind();
            counts.increment(kind);
            metrics::RECORDS_TOTAL
                .with_label_values(&[METRIC_SIDE, kind.as_str()])
                .inc();
        }));

        for (line, error) in records.errors() {
            metrics::PARSE_ERRORS_TOTAL
                .with_label_values(&[METRIC_SIDE, error.label()])
                .inc();
            warn!(line = %line, error = %error, "Skipping invalid record in batch");
        }

        if self.session.is_none() {
            let id = self.open_session();
            warn!(session_id = id, "Batch received outside a session, opening one implicitly");
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.records.merge(&counts);
        session.parse_errors += records.error_count() as u64;

        if grouped.is_empty() {
            debug!(
                session_id = session.id,
                likes_dropped = grouped.likes_dropped,
                "Batch has nothing to write"
            );
            acker.ack();
            return;
        }

        let barrier = session.barrier.clone();
        let session_id = session.id;

        // The semaphore is never closed, so this only waits for a free permit.
        let permit = self.permits.clone().acquire_owned().await.ok();
        let slot = barrier.reserve();
        let writer = self.writer.clone();
        let rows = grouped.row_count();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = writer.write_batch(&grouped).await;

            if outcome.is_success() {
                debug!(session_id, rows, written = outcome.rows.total(), "Batch written");
                slot.complete(outcome.rows);
            } else {
                warn!(
                    session_id,
                    rows,
                    failed_entities = outcome.errors.len(),
                    "Batch write failed"
                );
                slot.fail(outcome.rows, outcome.errors);
            }
            acker.ack();
        });
    }

    async fn close_session(&mut self, recompute: bool) -> SessionReport {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                info!("SESS_END with no open session, recomputing anyway");
                let id = self.next_session_id;
                self.next_session_id += 1;
                OpenSession::new(id)
            }
        };

        self.state = SessionState::Draining;
        let outstanding = session.barrier.snapshot().outstanding();
        if outstanding > 0 {
            info!(session_id = session.id, outstanding, "Waiting for in-flight writes");
        }
        let settled = session.barrier.wait().await;

        let leaderboard = if !recompute || self.shutdown.is_cancelled() {
            Err(RecalcError::Cancelled)
        } else {
            match tokio::time::timeout(self.recompute_timeout, self.recalculator.recompute())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(RecalcError::timed_out(self.recompute_timeout)),
            }
        };

        let report = SessionReport {
            session_id: session.id,
            batches_dispatched: settled.dispatched,
            batches_completed: settled.completed,
            batches_failed: settled.failed,
            rows: settled.rows,
            records: session.records,
            parse_errors: session.parse_errors,
            undecodable: session.undecodable,
            degraded: settled.failed > 0,
            write_errors: settled.errors,
            leaderboard,
            elapsed: session.started.elapsed(),
        };

        metrics::SESSIONS_TOTAL
            .with_label_values(&[report.outcome()])
            .inc();
        log_report(&report);

        self.state = SessionState::Idle;
        report
    }
}

fn log_report(report: &SessionReport) {
    for error in &report.write_errors {
        warn!(session_id = report.session_id, error = %error, "Session write error");
    }

    match &report.leaderboard {
        Ok(entry) => info!(
            session_id = report.session_id,
            outcome = report.outcome(),
            batches = report.batches_dispatched,
            failed = report.batches_failed,
            users = report.rows.users,
            videos = report.rows.videos,
            views = report.rows.views,
            parse_errors = report.parse_errors,
            video_id = entry.video_id.as_deref().unwrap_or("-"),
            view_count = entry.view_count,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Session closed"
        ),
        Err(e) => warn!(
            session_id = report.session_id,
            outcome = report.outcome(),
            batches = report.batches_dispatched,
            failed = report.batches_failed,
            users = report.rows.users,
            videos = report.rows.videos,
            views = report.rows.views,
            parse_errors = report.parse_errors,
            error = %e,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Session closed without leaderboard update"
        ),
    }
}
