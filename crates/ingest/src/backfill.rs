//! Historical catch-up over a fixed block range.

use std::sync::Arc;
use std::time::Duration;

use registry_chain::ChainClient;
use registry_store::{ProgressTracker, Projector};
use tokio::sync::watch;

use crate::error::IngestResult;
use crate::project::project_logs;
use crate::retry::RetryStrategy;

/// Tuning for the backfill loop.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Blocks per `get_logs` request.
    pub batch_size: u64,
    /// Pause between successive batches, to throttle request rate against
    /// rate-limited providers. Zero disables throttling.
    pub batch_delay: Duration,
    /// Backoff between retries of a failed batch.
    pub retry: RetryStrategy,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            batch_delay: Duration::ZERO,
            retry: RetryStrategy::default(),
        }
    }
}

/// Walks the chain from the cursor (or deployment block) up to a target
/// height in fixed-size batches.
///
/// A batch that fails is retried with backoff until it succeeds or
/// shutdown is requested; the loop never skips a range, so the cursor
/// only ever covers fully processed blocks.
pub struct Backfiller {
    client: Arc<dyn ChainClient>,
    projector: Arc<Projector>,
    progress: Arc<ProgressTracker>,
    options: BackfillOptions,
    shutdown: watch::Receiver<bool>,
}

impl Backfiller {
    pub fn new(
        client: Arc<dyn ChainClient>,
        projector: Arc<Projector>,
        progress: Arc<ProgressTracker>,
        options: BackfillOptions,
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

    /// Backfill up to and including `target`.
    ///
    /// Returns `true` if the target was reached, `false` if interrupted by
    /// shutdown.
    pub async fn run(&mut self, target: u64) -> IngestResult<bool> {
        let batch_size = self.options.batch_size.max(1);
        let mut next = self.progress.next_block()?;
        if next > target {
            tracing::info!(target, "nothing to backfill");
            return Ok(true);
        }

        tracing::info!(from = next, to = target, batch_size, "backfill starting");
        while next <= target {
            if *self.shutdown.borrow() {
                return Ok(false);
            }
            let to = target.min(next + batch_size - 1);
            if !self.process_with_retry(next, to).await {
                return Ok(false);
            }
            next = to + 1;
            if next <= target && !self.options.batch_delay.is_zero() {
                if !self.pause(self.options.batch_delay).await {
                    return Ok(false);
                }
            }
        }
        tracing::info!(target, "backfill complete");
        Ok(true)
    }

    /// Retry the same range until it succeeds. Returns `false` only on
    /// shutdown.
    async fn process_with_retry(&mut self, from: u64, to: u64) -> bool {
        let mut attempt = 0u32;
        loop {
            match self.process_range(from, to).await {
                Ok(applied) => {
                    tracing::debug!(from, to, events = applied, "backfilled range");
                    return true;
                }
                Err(e) => {
                    attempt += 1;
                    let delay = self.options.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        from,
                        to,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "batch failed, retrying same range"
                    );
                    if !self.pause(delay).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn process_range(&self, from: u64, to: u64) -> IngestResult<usize> {
        let logs = self.client.get_logs(from, to).await?;
        let applied = project_logs(self.client.as_ref(), &self.projector, logs).await?;
        self.progress.commit(to)?;
        Ok(applied)
    }

    /// Sleep, waking early on shutdown. Returns `false` if shut down.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => !*self.shutdown.borrow(),
        }
    }
}
