// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-lived worker loop that drives queue deliveries into the consumer.
//!
//! The pump is the runtime stand-in for a platform that invokes the
//! consumer per delivery: it polls the queue for due entries, hands each to
//! [`QueueConsumer::handle_delivery`], and maps the resulting disposition
//! back onto the queue as an ack or a delayed retry. All waiting lives in
//! the queue's visibility times; the pump itself only ticks.

use std::sync::Arc;
use std::time::Duration;

use burble_config::model::ConsumerConfig;
use burble_core::QueueAdapter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consumer::{Disposition, QueueConsumer};

/// Polls the queue and dispatches due deliveries to the consumer.
pub struct QueuePump {
    queue: Arc<dyn QueueAdapter + Send + Sync>,
    consumer: Arc<QueueConsumer>,
    poll_interval: Duration,
    receive_batch_size: usize,
}

impl QueuePump {
    /// Create a pump over the given queue and consumer.
    pub fn new(
        queue: Arc<dyn QueueAdapter + Send + Sync>,
        consumer: Arc<QueueConsumer>,
        config: &ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            consumer,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            receive_batch_size: config.receive_batch_size.max(1),
        }
    }

    /// Run until cancelled, draining due deliveries on every tick.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.receive_batch_size,
            "queue pump started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain_due().await;
                }
                _ = cancel.cancelled() => {
                    info!("queue pump shutting down");
                    break;
                }
            }
        }
    }

    /// Claim and handle every currently-due delivery.
    ///
    /// Deliveries are handled sequentially within one pump; concurrency
    /// across workers is what the per-conversation lock exists for. A batch
    /// enqueued while draining (a materialized flush) is picked up in the
    /// same pass once it is due.
    pub async fn drain_due(&self) {
        loop {
            let deliveries = match self.queue.receive(self.receive_batch_size).await {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    warn!(error = %e, "queue receive failed");
                    break;
                }
            };
            if deliveries.is_empty() {
                break;
            }

            for delivery in deliveries {
                let disposition = self.consumer.handle_delivery(&delivery.batch).await;
                let result = match disposition {
                    Disposition::Ack => self.queue.ack(delivery.id).await,
                    Disposition::Backoff { delay_seconds } => {
                        debug!(id = delivery.id, delay_seconds, "delivery released for backoff");
                        self.queue.release(delivery.id, delay_seconds).await
                    }
                    Disposition::Retry { delay_seconds } => {
                        debug!(
                            id = delivery.id,
                            attempts = delivery.attempts,
                            delay_seconds,
                            "delivery scheduled for redelivery"
                        );
                        self.queue.retry(delivery.id, delay_seconds).await
                    }
                };
                if let Err(e) = result {
                    // The claim window will expire and the entry will be
                    // redelivered; at-least-once covers this.
                    warn!(id = delivery.id, error = %e, "failed to settle delivery");
                }
            }
        }
    }
}
