//! clipstream Transport
//!
//! Publish/subscribe plumbing between the producer and the consumer.
//!
//! ## Contract
//!
//! - `publish(topic, payload)` returns once the broker has accepted the message
//! - `subscribe(topic)` yields deliveries **in publish order** for that topic
//! - every delivery carries an [`Acker`]; acking tells the broker the message is
//!   fully processed. Unacked messages are redelivered when a subscriber
//!   reconnects (at-least-once, never exactly-once)
//!
//! The consumer's flush barrier relies on the ordering guarantee: a
//! `SESS_END` is only meaningful if every batch published before it has already
//! been delivered.
//!
//! ## Implementations
//!
//! - [`MemoryBroker`]: in-process, one FIFO queue per topic (tests, single-process runs)
//! - [`TcpTransport`]: client for the `clipstream-broker` daemon ([`broker`])

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub mod broker;
pub mod client;
pub mod codec;
pub mod error;
pub mod memory;

pub use broker::{Broker, BrokerConfig};
pub use client::TcpTransport;
pub use error::{Result, TransportError};
pub use memory::MemoryBroker;

/// Sending half of the transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message. Messages published by one publisher to one topic are
    /// delivered in the order the calls completed.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;
}

/// Full transport: publish plus ordered subscription.
#[async_trait]
pub trait Transport: Publisher {
    /// Subscribe to a topic. A topic has at most one active subscription.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;
}

/// An ordered stream of deliveries for one topic.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery. `Ok(None)` means the topic was closed or the
    /// broker went away cleanly.
    async fn next(&mut self) -> Result<Option<Delivery>>;
}

/// Receives acknowledgements for one subscription.
pub trait AckSink: Send + Sync {
    fn ack(&self, id: u64);
}

/// Acknowledges exactly one delivery. Dropping it without acking leaves the
/// message eligible for redelivery.
pub struct Acker {
    id: u64,
    sink: Arc<dyn AckSink>,
}

impl Acker {
    pub fn new(id: u64, sink: Arc<dyn AckSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ack(self) {
        self.sink.ack(self.id);
    }
}

impl fmt::Debug for Acker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acker").field("id", &self.id).finish()
    }
}

/// One message handed to a subscriber.
#[derive(Debug)]
pub struct Delivery {
    pub payload: Bytes,
    acker: Acker,
}

impl Delivery {
    pub fn new(payload: Bytes, acker: Acker) -> Self {
        Self { payload, acker }
    }

    /// Broker-assigned message id, increasing in publish order.
    pub fn id(&self) -> u64 {
        self.acker.id()
    }

    pub fn ack(self) {
        self.acker.ack();
    }

    pub fn into_parts(self) -> (Bytes, Acker) {
        (self.payload, self.acker)
    }
}
