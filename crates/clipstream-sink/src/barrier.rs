//! Flush Barrier
//!
//! Tracks the batch writes dispatched during one session so that `SESS_END`
//! can wait for every one of them before the leaderboard is recomputed.
//!
//! ```text
//!   reserve() ──▶ BatchSlot ──(write task)──▶ complete(rows) / fail(rows, errors)
//!      │                                             │
//!      ▼                                             ▼
//!   dispatched += 1                     completed/failed += 1, notify waiters
//!
//!   wait() resolves once completed + failed == dispatched
//! ```
//!
//! The state lives in a `tokio::sync::watch` channel: resolving a slot is a
//! `send_modify`, and [`FlushBarrier::wait`] is a `wait_for` on the settled
//! condition, so no wakeup can be missed between the check and the await.
//!
//! A [`BatchSlot`] dropped without being resolved (the write task panicked or
//! was aborted) settles as failed, so a barrier can never hang on a lost task.

use std::sync::Arc;

use clipstream_observability::metrics;
use tokio::sync::watch;

use crate::error::WriteError;
use crate::writer::RowCounts;

/// Snapshot of a session's batch writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierState {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub rows: RowCounts,
    pub errors: Vec<WriteError>,
}

impl BarrierState {
    /// Every reserved slot has been resolved.
    pub fn is_settled(&self) -> bool {
        self.completed + self.failed == self.dispatched
    }

    pub fn outstanding(&self) -> u64 {
        self.dispatched - self.completed - self.failed
    }
}

/// Per-session write barrier. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct FlushBarrier {
    state: Arc<watch::Sender<BarrierState>>,
}

impl Default for FlushBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushBarrier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BarrierState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Register one dispatched batch write.
    pub fn reserve(&self) -> BatchSlot {
        self.state.send_modify(|state| state.dispatched += 1);
        metrics::INFLIGHT_BATCHES.inc();
        BatchSlot {
            state: Some(self.state.clone()),
        }
    }

    pub fn snapshot(&self) -> BarrierState {
        self.state.borrow().clone()
    }

    /// Wait until every slot reserved so far has settled, then return the
    /// final state.
    pub async fn wait(&self) -> BarrierState {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let state = match rx.wait_for(BarrierState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        };
        state
    }
}

/// One reserved batch write. Must be resolved exactly once.
#[derive(Debug)]
pub struct BatchSlot {
    state: Option<Arc<watch::Sender<BarrierState>>>,
}

impl BatchSlot {
    /// The batch was fully written.
    pub fn complete(mut self, rows: RowCounts) {
        self.settle(|state| {
            state.completed += 1;
            state.rows.merge(&rows);
        });
    }

    /// At least one entity write failed. `rows` are what the other entities
    /// still managed to write.
    pub fn fail(mut self, rows: RowCounts, errors: Vec<WriteError>) {
        self.settle(|state| {
            state.failed += 1;
            state.rows.merge(&rows);
            state.errors.extend(errors);
        });
    }

    fn settle<F>(&mut self, update: F)
    where
        F: FnOnce(&mut BarrierState),
    {
        if let Some(state) = self.state.take() {
            state.send_modify(update);
            metrics::INFLIGHT_BATCHES.dec();
        }
    }
}

impl Drop for BatchSlot {
    fn drop(&mut self) {
        self.settle(|state| state.failed += 1);
    }
}
