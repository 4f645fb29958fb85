//! TCP client for the broker daemon.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{Frame, FrameCodec};
use crate::error::{Result, TransportError};
use crate::{AckSink, Acker, Delivery, Publisher, Subscription, Transport};

type Connection = Framed<TcpStream, FrameCodec>;

/// [`Transport`] backed by a `clipstream-broker` daemon.
///
/// Publishing uses one connection, opened on first use and reopened after an
/// error. Each call waits for the broker's `OK`, so a returned `publish` means
/// the message is queued. Every subscription gets its own connection.
pub struct TcpTransport {
    addr: String,
    publisher: Mutex<Option<Connection>>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            publisher: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "Connected to broker");
        Ok(Framed::new(stream, FrameCodec::new()))
    }
}

async fn expect_ok(conn: &mut Connection) -> Result<()> {
    match conn.next().await {
        Some(Ok(Frame::Ok)) => Ok(()),
        Some(Ok(Frame::Error(message))) => Err(TransportError::Rejected(message)),
        Some(Ok(other)) => Err(TransportError::Protocol(format!(
            "Expected OK, got {:?}",
            other
        ))),
        Some(Err(e)) => Err(e),
        None => Err(TransportError::Closed("broker closed the connection".to_string())),
    }
}

#[async_trait]
impl Publisher for TcpTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let mut guard = self.publisher.lock().await;

        let conn = match guard.as_mut() {
            Some(conn) => conn,
            None => guard.insert(self.connect().await?),
        };

        let result = async {
            conn.send(Frame::Publish {
                topic: topic.to_string(),
                payload,
            })
            .await?;
            expect_ok(conn).await
        }
        .await;

        if let Err(e) = &result {
            if e.is_retryable() || matches!(e, TransportError::Protocol(_)) {
                warn!(addr = %self.addr, error = %e, "Dropping broker connection");
                *guard = None;
            }
        }
        result
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let mut conn = self.connect().await?;
        conn.send(Frame::Subscribe {
            topic: topic.to_string(),
        })
        .await?;

        match expect_ok(&mut conn).await {
            Ok(()) => {}
            Err(TransportError::Rejected(_)) => {
                return Err(TransportError::AlreadySubscribed(topic.to_string()))
            }
            Err(e) => return Err(e),
        }
        info!(addr = %self.addr, topic, "Subscribed");

        let (sink, stream) = conn.split();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_acks(sink, rx));

        Ok(Box::new(TcpSubscription {
            stream,
            acks: Arc::new(TcpAckSink { tx }),
        }))
    }
}

/// Write a FIN for every acknowledged id until all ackers are gone.
async fn forward_acks(
    mut sink: SplitSink<Connection, Frame>,
    mut rx: mpsc::UnboundedReceiver<u64>,
) {
    while let Some(id) = rx.recv().await {
        if let Err(e) = sink.send(Frame::Finish { id }).await {
            warn!(id, error = %e, "Failed to send FIN; message will be redelivered");
            return;
        }
    }
}

struct TcpAckSink {
    tx: mpsc::UnboundedSender<u64>,
}

impl AckSink for TcpAckSink {
    fn ack(&self, id: u64) {
        // A closed channel means the connection is gone and the broker
        // requeues the message anyway.
        let _ = self.tx.send(id);
    }
}

struct TcpSubscription {
    stream: SplitStream<Connection>,
    acks: Arc<TcpAckSink>,
}

#[async_trait]
impl Subscription for TcpSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        match self.stream.next().await {
            Some(Ok(Frame::Message { id, payload })) => {
                let sink: Arc<dyn AckSink> = self.acks.clone();
                Ok(Some(Delivery::new(payload, Acker::new(id, sink))))
            }
            Some(Ok(other)) => Err(TransportError::Protocol(format!(
                "Expected MSG, got {:?}",
                other
            ))),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
