// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed message queue adapter trait.

use async_trait::async_trait;

use crate::error::BurbleError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Delivery, QueuedBatch};

/// Adapter for the delayed message queue carrying batches and flush-checks.
///
/// Delivery is at-least-once and not necessarily FIFO: a delivered entry
/// that is neither acked nor retried before its claim window expires comes
/// back. The queue substitutes for an in-process timer -- "wait" is always
/// expressed as a redelivery delay, never as a sleep in the consumer.
#[async_trait]
pub trait QueueAdapter: PluginAdapter {
    /// Enqueues a batch for delivery after `delay_seconds` (zero means
    /// deliver as soon as possible).
    async fn send(&self, batch: &QueuedBatch, delay_seconds: u32) -> Result<(), BurbleError>;

    /// Claims up to `max` due entries for processing.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, BurbleError>;

    /// Acknowledges successful handling of a claimed entry.
    async fn ack(&self, id: i64) -> Result<(), BurbleError>;

    /// Returns a failed entry to the queue, redeliverable after
    /// `delay_seconds`. Counts toward the entry's attempt budget; backends
    /// may dead-letter entries that exhaust it instead of requeueing them.
    async fn retry(&self, id: i64, delay_seconds: u32) -> Result<(), BurbleError>;

    /// Returns a claimed entry to the queue without counting an attempt,
    /// redeliverable after `delay_seconds`. Used for contention backoff,
    /// where redelivery is expected behavior rather than a failure.
    async fn release(&self, id: i64, delay_seconds: u32) -> Result<(), BurbleError>;
}
