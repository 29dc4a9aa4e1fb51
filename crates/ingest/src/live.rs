//! Push-based follow mode over a log subscription.

use std::sync::Arc;
use std::time::Duration;

use registry_chain::{ChainClient, ChainError, RawLog};
use registry_store::Projector;
use tokio::sync::{broadcast, watch};

use crate::error::IngestResult;
use crate::project::project_logs;

/// Tuning for the live loop.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Pause before reopening a closed subscription.
    pub resubscribe_delay: Duration,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            resubscribe_delay: Duration::from_secs(5),
        }
    }
}

/// Applies pushed logs as they arrive.
///
/// Live delivery does not move the cursor: a restart re-enters through
/// backfill, and replay detection makes re-applying pushed events safe. A
/// lagged subscription is logged and ridden out; the catch-up path picks
/// up whatever was missed.
pub struct LiveIngestor {
    client: Arc<dyn ChainClient>,
    projector: Arc<Projector>,
    options: LiveOptions,
    shutdown: watch::Receiver<bool>,
}

impl LiveIngestor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        projector: Arc<Projector>,
        options: LiveOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            projector,
            options,
            shutdown,
        }
    }

    /// Consume the subscription until shutdown.
    ///
    /// Fails only with [`ChainError::SubscriptionsUnsupported`] when the
    /// transport cannot push; the caller falls back to polling. Transient
    /// subscription failures are retried with a fixed delay.
    pub async fn run(&mut self) -> IngestResult<()> {
        let mut rx = match self.subscribe_with_retry().await? {
            Some(rx) => rx,
            None => return Ok(()),
        };
        tracing::info!("live ingestion started");
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("live ingestion stopped");
                        return Ok(());
                    }
                }
                received = rx.recv() => match received {
                    Ok(log) => {
                        let result =
                            project_logs(self.client.as_ref(), &self.projector, vec![log]).await;
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "failed to apply pushed log");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "subscription lagged, events lost to push path");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("subscription closed, reopening");
                        if !self.pause(self.options.resubscribe_delay).await {
                            return Ok(());
                        }
                        match self.subscribe_with_retry().await? {
                            Some(reopened) => rx = reopened,
                            None => return Ok(()),
                        }
                    }
                }
            }
        }
    }

    /// Subscribe, retrying transient failures with a fixed delay.
    ///
    /// Returns `Ok(None)` when shutdown arrives mid-retry; only an
    /// unsupported transport escapes as an error.
    async fn subscribe_with_retry(
        &mut self,
    ) -> IngestResult<Option<broadcast::Receiver<RawLog>>> {
        loop {
            match self.client.subscribe() {
                Ok(rx) => return Ok(Some(rx)),
                Err(ChainError::SubscriptionsUnsupported) => {
                    return Err(ChainError::SubscriptionsUnsupported.into());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "subscription failed, retrying");
                    if !self.pause(self.options.resubscribe_delay).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Sleep, waking early on shutdown. Returns `false` if shut down.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => !*self.shutdown.borrow(),
        }
    }
}
