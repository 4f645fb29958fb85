//! Broker daemon
//!
//! TCP server that keeps one FIFO queue per topic and hands messages to at most
//! one subscriber per topic.
//!
//! ## Delivery
//!
//! ```text
//!  publisher ──PUB──▶ pending (VecDeque) ──MSG──▶ subscriber
//!                          ▲                          │
//!                          │ requeue on disconnect    │ FIN
//!                          └──── in_flight (BTreeMap) ◀┘
//! ```
//!
//! - a message moves to `in_flight` when it is sent, and is dropped on `FIN`
//! - at most `max_in_flight` messages are outstanding per subscriber
//! - when the subscriber disconnects, everything still in flight goes back to
//!   the front of the queue in id order, so the next subscriber sees the same
//!   sequence again

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::{Frame, FrameCodec};
use crate::error::{Result, TransportError};

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum unacknowledged messages per subscriber
    pub max_in_flight: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4150".to_string(),
            max_in_flight: 64,
        }
    }
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<(u64, Bytes)>,
    in_flight: BTreeMap<u64, Bytes>,
    subscribed: bool,
}

#[derive(Default)]
struct TopicQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TopicQueue {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, payload: Bytes) -> u64 {
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back((id, payload));
            id
        };
        self.notify.notify_one();
        id
    }

    /// Move the next pending message to in-flight, if the window allows.
    fn take_next(&self, max_in_flight: usize) -> Option<(u64, Bytes)> {
        let mut state = self.lock();
        if state.in_flight.len() >= max_in_flight {
            return None;
        }
        let (id, payload) = state.pending.pop_front()?;
        state.in_flight.insert(id, payload.clone());
        Some((id, payload))
    }

    fn finish(&self, id: u64) -> bool {
        self.lock().in_flight.remove(&id).is_some()
    }

    fn try_subscribe(&self) -> bool {
        let mut state = self.lock();
        if state.subscribed {
            return false;
        }
        state.subscribed = true;
        true
    }

    /// Put unacknowledged messages back at the head of the queue.
    fn release(&self) -> usize {
        let requeued = {
            let mut state = self.lock();
            let in_flight = std::mem::take(&mut state.in_flight);
            let requeued = in_flight.len();
            for (id, payload) in in_flight.into_iter().rev() {
                state.pending.push_front((id, payload));
            }
            state.subscribed = false;
            requeued
        };
        self.notify.notify_one();
        requeued
    }
}

/// Shared state for all broker connections
struct BrokerState {
    config: BrokerConfig,
    topics: Mutex<HashMap<String, Arc<TopicQueue>>>,
}

impl BrokerState {
    fn topic(&self, name: &str) -> Arc<TopicQueue> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.entry(name.to_string()).or_default().clone()
    }
}

/// Broker bound to a listening socket.
pub struct Broker {
    listener: TcpListener,
    state: Arc<BrokerState>,
}

impl Broker {
    /// Bind the listener. Use port 0 to pick a free port.
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Broker listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            state: Arc::new(BrokerState {
                config,
                topics: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Get the local address the broker is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::from)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = self.state.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                match handle_connection(stream, addr, state, shutdown).await {
                                    Ok(()) => debug!("Connection closed: {}", addr),
                                    Err(e) => warn!("Connection error from {}: {}", addr, e),
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Broker shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handle a single client connection
#[instrument(skip(stream, state, shutdown), fields(client = %addr))]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<BrokerState>,
    shutdown: CancellationToken,
) -> Result<()> {
    debug!("New connection from {}", addr);

    let mut framed = Framed::new(stream, FrameCodec::new());

    loop {
        let frame = tokio::select! {
            frame = framed.next() => frame,
            _ = shutdown.cancelled() => return Ok(()),
        };

        let Some(frame) = frame else {
            return Ok(());
        };

        match frame? {
            Frame::Publish { topic, payload } => {
                let id = state.topic(&topic).push(payload);
                debug!(topic = %topic, id, "Published");
                framed.send(Frame::Ok).await?;
            }
            Frame::Subscribe { topic } => {
                let queue = state.topic(&topic);
                if !queue.try_subscribe() {
                    framed
                        .send(Frame::Error(format!("topic '{}' already has a subscriber", topic)))
                        .await?;
                    continue;
                }

                info!(topic = %topic, "Subscriber attached");
                framed.send(Frame::Ok).await?;

                let result = serve_subscriber(
                    &mut framed,
                    &queue,
                    state.config.max_in_flight,
                    &shutdown,
                )
                .await;

                let requeued = queue.release();
                info!(topic = %topic, requeued, "Subscriber detached");
                return result;
            }
            Frame::Finish { id } => {
                warn!(id, "FIN on a connection with no subscription");
            }
            other => {
                return Err(TransportError::Protocol(format!(
                    "Unexpected frame from client: {:?}",
                    other
                )));
            }
        }
    }
}

/// Push messages to a subscriber and collect its acknowledgements.
async fn serve_subscriber(
    framed: &mut Framed<TcpStream, FrameCodec>,
    queue: &TopicQueue,
    max_in_flight: usize,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        while let Some((id, payload)) = queue.take_next(max_in_flight) {
            framed.send(Frame::Message { id, payload }).await?;
        }

        tokio::select! {
            frame = framed.next() => {
                match frame {
                    None => return Ok(()),
                    Some(Ok(Frame::Finish { id })) => {
                        if !queue.finish(id) {
                            debug!(id, "FIN for unknown message");
                        }
                    }
                    Some(Ok(other)) => {
                        return Err(TransportError::Protocol(format!(
                            "Unexpected frame from subscriber: {:?}",
                            other
                        )));
                    }
                    Some(Err(e)) => return Err(e),
                }
            }
            _ = queue.notify.notified() => {}
            _ = shutdown.cancelled() => return Ok(()),
        }
    }
}
