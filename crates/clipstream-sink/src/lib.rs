//! clipstream Sink
//!
//! The consuming end of the pipeline: decodes batches from the transport,
//! persists them, and recomputes the leaderboard once every write of a session
//! has settled.
//!
//! ## Architecture
//!
//! ```text
//!  Subscription ──▶ SessionController ──decode──▶ aggregate ──▶ spawn write_batch
//!                          │                                        │
//!                          │ SESS_END                               ▼
//!                          ▼                              ┌──────────────────┐
//!                    FlushBarrier::wait ◀──── resolve ────│  DurableWriter   │
//!                          │                              │ users/videos/views│
//!                          ▼                              └──────────────────┘
//!                    Recalculator::recompute ──▶ leaderboard (id = 1)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use clipstream_sink::{Consumer, SinkConfig};
//!
//! let store = Arc::new(SqliteStore::open("clipstream.db").await?);
//! let transport = Arc::new(TcpTransport::new("127.0.0.1:4150"));
//!
//! Consumer::new(transport, store, SinkConfig::default())
//!     .run(shutdown)
//!     .await?;
//! ```

pub mod aggregate;
pub mod barrier;
pub mod config;
pub mod consumer;
pub mod error;
pub mod leaderboard;
pub mod retry;
pub mod session;
pub mod writer;

pub use aggregate::{aggregate, Entity, GroupedWrites, TableRow, UserRow, VideoRow, ViewRow};
pub use barrier::{BarrierState, BatchSlot, FlushBarrier};
pub use config::{SinkConfig, WriterConfig};
pub use consumer::Consumer;
pub use error::{RecalcError, Result, SinkError, WriteError};
pub use leaderboard::{LeaderboardEntry, Recalculator};
pub use retry::RetryPolicy;
pub use session::{SessionController, SessionReport, SessionState};
pub use writer::{BatchOutcome, DurableWriter, RowCounts};
