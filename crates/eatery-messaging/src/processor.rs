//! Outbox processor: drains unsent outbox rows into the broker.
//!
//! Each cycle reads up to `batch_size` unsent messages, publishes them in
//! order, and marks the ones the broker accepted in a single batch. A message
//! that fails to publish stays unsent and is retried on the next cycle, so
//! delivery is at-least-once. Every outbox and broker call runs under a
//! deadline so a stuck lock or connection cannot stall the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eatery_core::error::DomainError;
use eatery_core::message::{MessagePublisher, OutboxStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Tuning knobs for [`OutboxProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Maximum number of messages claimed per cycle.
    pub batch_size: i64,
    /// Pause between cycles.
    pub poll_interval: Duration,
    /// Deadline for a single broker publish.
    pub publish_timeout: Duration,
    /// Deadline for reading or marking outbox rows.
    pub store_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Ids accepted by the broker and marked as sent.
    pub published: Vec<String>,
    /// Ids that failed to publish and remain unsent.
    pub failed: Vec<String>,
}

/// Polls the outbox and publishes to a broker.
#[derive(Clone)]
pub struct OutboxProcessor {
    outbox: Arc<dyn OutboxStore>,
    broker: Arc<dyn MessagePublisher>,
    config: ProcessorConfig,
}

impl OutboxProcessor {
    /// Creates a new `OutboxProcessor`.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        broker: Arc<dyn MessagePublisher>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            outbox,
            broker,
            config,
        }
    }

    /// Runs a single poll/publish/mark cycle.
    ///
    /// Publish failures are logged and reported in the [`CycleReport`]; they
    /// do not stop the remaining messages of the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading or marking the outbox fails or
    /// misses its deadline (`DomainError::Transient`).
    #[instrument(skip(self), fields(batch_size = self.config.batch_size), err)]
    pub async fn run_once(&self) -> Result<CycleReport, DomainError> {
        let messages = self
            .store_call(
                "find_unpublished",
                self.outbox.find_unpublished(self.config.batch_size),
            )
            .await?;
        if messages.is_empty() {
            return Ok(CycleReport::default());
        }

        let mut report = CycleReport::default();
        for message in &messages {
            let publish = self.broker.publish(&message.subject, message);
            match tokio::time::timeout(self.config.publish_timeout, publish).await {
                Ok(Ok(())) => report.published.push(message.id.clone()),
                Ok(Err(e)) => {
                    tracing::error!(message_id = %message.id, error = %e, "failed to publish outbox message");
                    report.failed.push(message.id.clone());
                }
                Err(_) => {
                    tracing::error!(
                        message_id = %message.id,
                        timeout = ?self.config.publish_timeout,
                        "outbox publish timed out"
                    );
                    report.failed.push(message.id.clone());
                }
            }
        }

        self.store_call(
            "mark_published",
            self.outbox.mark_published(&report.published),
        )
        .await?;
        tracing::debug!(
            published = report.published.len(),
            failed = report.failed.len(),
            "outbox cycle finished"
        );
        Ok(report)
    }

    async fn store_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, DomainError> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .map_err(|_| {
                DomainError::Transient(format!(
                    "outbox {operation} timed out after {:?}",
                    self.config.store_timeout
                ))
            })?
    }

    /// Spawns the polling loop on the current Tokio runtime.
    ///
    /// The loop checks for shutdown only between cycles, so a cycle that has
    /// started always finishes its publish and mark steps.
    #[must_use]
    pub fn start(self) -> OutboxProcessorHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let join = tokio::spawn(async move {
            tracing::info!(
                poll_interval = ?self.config.poll_interval,
                "outbox processor started"
            );
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "outbox cycle failed");
                        }
                    }
                }
            }

            tracing::info!("outbox processor stopped");
        });

        OutboxProcessorHandle { shutdown, join }
    }
}

/// Lifecycle handle of a running [`OutboxProcessor`].
#[derive(Debug)]
pub struct OutboxProcessorHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl OutboxProcessorHandle {
    /// Signals the loop to stop and waits for the in-flight cycle to finish.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Transient` if the processor task panicked.
    pub async fn stop(self) -> Result<(), DomainError> {
        // The receiver is gone only if the task already ended.
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| DomainError::Transient(format!("outbox processor task failed: {e}")))
    }

    /// Whether the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
