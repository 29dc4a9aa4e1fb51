//! Pull-based follow mode for transports without subscriptions.

use std::sync::Arc;
use std::time::Duration;

use registry_chain::ChainClient;
use registry_store::{ProgressTracker, Projector};
use tokio::sync::watch;

use crate::error::IngestResult;
use crate::project::project_logs;

/// Tuning for the polling loop.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Blocks per `get_logs` request when catching up.
    pub batch_size: u64,
    /// Pause between poll cycles.
    pub poll_interval: Duration,
    /// Shorter pause before the next cycle after a failed one.
    pub retry_interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            poll_interval: Duration::from_secs(12),
            retry_interval: Duration::from_secs(3),
        }
    }
}

/// Periodically compares the cursor against the chain head and processes
/// any new blocks in batches.
///
/// A failed cycle leaves the cursor where it was and is retried on the
/// next tick, so transient provider trouble costs latency, not events.
pub struct Poller {
    client: Arc<dyn ChainClient>,
    projector: Arc<Projector>,
    progress: Arc<ProgressTracker>,
    options: PollOptions,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    pub fn new(
        client: Arc<dyn ChainClient>,
        projector: Arc<Projector>,
        progress: Arc<ProgressTracker>,
        options: PollOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            projector,
            progress,
            options,
            shutdown,
        }
    }

    /// Poll until shutdown.
    pub async fn run(&mut self) -> IngestResult<()> {
        tracing::info!(
            interval_ms = self.options.poll_interval.as_millis() as u64,
            "polling started"
        );
        loop {
            let delay = match self.cycle().await {
                Ok(()) => self.options.poll_interval,
                Err(e) => {
                    tracing::warn!(error = %e, "poll cycle failed, retrying sooner");
                    self.options.retry_interval
                }
            };
            if !self.pause(delay).await {
                tracing::info!("polling stopped");
                return Ok(());
            }
        }
    }

    async fn cycle(&self) -> IngestResult<()> {
        let head = self.client.current_height().await?;
        let batch_size = self.options.batch_size.max(1);
        let mut next = self.progress.next_block()?;
        while next <= head {
            if *self.shutdown.borrow() {
                return Ok(());
            }
            let to = head.min(next + batch_size - 1);
            let logs = self.client.get_logs(next, to).await?;
            let applied = project_logs(self.client.as_ref(), &self.projector, logs).await?;
            self.progress.commit(to)?;
            tracing::debug!(from = next, to, events = applied, "polled range");
            next = to + 1;
        }
        Ok(())
    }

    /// Sleep, waking early on shutdown. Returns `false` if shut down.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => !*self.shutdown.borrow(),
        }
    }
}
