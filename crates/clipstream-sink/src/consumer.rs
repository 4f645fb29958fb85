//! Subscription loop.
//!
//! Subscribes to the events topic and feeds every delivery, in order, to a
//! [`SessionController`]. Stops when the shutdown token fires or the
//! subscription ends, then drains the open session so in-flight writes land
//! before returning.

use std::sync::Arc;

use clipstream_store::Store;
use clipstream_transport::Transport;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::SinkConfig;
use crate::error::Result;
use crate::session::{SessionController, SessionReport};

pub struct Consumer {
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    config: SinkConfig,
    reports: Option<mpsc::UnboundedSender<SessionReport>>,
}

impl Consumer {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn Store>, config: SinkConfig) -> Self {
        Self {
            transport,
            store,
            config,
            reports: None,
        }
    }

    /// Also send every [`SessionReport`] to `tx`.
    pub fn with_report_channel(mut self, tx: mpsc::UnboundedSender<SessionReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Consume until shutdown or end of stream.
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be opened or breaks mid-stream. The
    /// open session is drained before a mid-stream error is returned.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut subscription = self.transport.subscribe(&self.config.topic).await?;
        info!(topic = %self.config.topic, "Subscribed");

        let mut controller =
            SessionController::new(self.store.clone(), &self.config, shutdown.clone());

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping consumption");
                    break Ok(());
                }
                next = subscription.next() => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    if let Some(report) = controller.handle(delivery).await {
                        self.forward(report);
                    }
                }
                Ok(None) => {
                    info!(topic = %self.config.topic, "Subscription ended");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Subscription failed");
                    break Err(e);
                }
            }
        };

        if let Some(report) = controller.drain().await {
            self.forward(report);
        }

        result.map_err(Into::into)
    }

    fn forward(&self, report: SessionReport) {
        if let Some(tx) = &self.reports {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(report);
        }
    }
}
