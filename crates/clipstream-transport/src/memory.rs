//! In-process broker.
//!
//! One unbounded FIFO queue per topic. Messages published before anyone
//! subscribes are buffered, so a producer can run ahead of the consumer exactly
//! as it would against the daemon.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::{AckSink, Acker, Delivery, Publisher, Subscription, Transport};

struct TopicQueue {
    tx: Option<mpsc::UnboundedSender<(u64, Bytes)>>,
    rx: Option<mpsc::UnboundedReceiver<(u64, Bytes)>>,
    next_id: u64,
}

impl TopicQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
            next_id: 0,
        }
    }
}

#[derive(Default)]
struct AckCounter {
    acked: AtomicU64,
}

impl AckSink for AckCounter {
    fn ack(&self, _id: u64) {
        self.acked.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory [`Transport`]. Cloning shares the same topics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, TopicQueue>>>,
    acks: Arc<AckCounter>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting messages for a topic. The subscriber drains what is
    /// queued and then sees the end of the stream.
    pub fn close(&self, topic: &str) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(queue) = topics.get_mut(topic) {
            queue.tx = None;
        }
    }

    /// Number of messages accepted for a topic so far.
    pub fn published(&self, topic: &str) -> u64 {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.get(topic).map_or(0, |q| q.next_id)
    }

    /// Number of deliveries acknowledged, across all topics.
    pub fn acked(&self) -> u64 {
        self.acks.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);

        let tx = queue
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::Closed(topic.to_string()))?;

        let id = queue.next_id;
        tx.send((id, payload))
            .map_err(|_| TransportError::Closed(topic.to_string()))?;
        queue.next_id += 1;
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);

        let rx = queue
            .rx
            .take()
            .ok_or_else(|| TransportError::AlreadySubscribed(topic.to_string()))?;

        debug!(topic, "Memory subscription opened");
        Ok(Box::new(MemorySubscription {
            rx,
            acks: self.acks.clone(),
        }))
    }
}

struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<(u64, Bytes)>,
    acks: Arc<AckCounter>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        Ok(self.rx.recv().await.map(|(id, payload)| {
            let sink: Arc<dyn AckSink> = self.acks.clone();
            Delivery::new(payload, Acker::new(id, sink))
        }))
    }
}
