// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory delayed queue for deterministic testing.
//!
//! `MockQueue` records every `send` (batch plus requested delay) for
//! assertion, and keeps an internal pending list so tests can drive
//! `receive`/`ack`/`retry` without wall-clock time: delays are recorded,
//! never waited on.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use burble_core::types::{AdapterType, Delivery, HealthStatus, QueuedBatch};
use burble_core::{BurbleError, PluginAdapter, QueueAdapter};

/// One recorded `send` call.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub batch: QueuedBatch,
    pub delay_seconds: u32,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    sent: Vec<SentMessage>,
    pending: VecDeque<(i64, QueuedBatch, i32)>,
    claimed: HashMap<i64, (QueuedBatch, i32)>,
    acked: Vec<i64>,
    retried: Vec<(i64, u32)>,
    released: Vec<(i64, u32)>,
}

/// A mock delayed queue for testing.
pub struct MockQueue {
    inner: Mutex<Inner>,
    fail_sends: AtomicBool,
}

impl MockQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Make all subsequent `send` calls fail until disabled.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// All recorded sends, in call order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.inner.lock().await.sent.clone()
    }

    /// Recorded sends that carry items (real batches, not flush-checks).
    pub async fn sent_batches(&self) -> Vec<SentMessage> {
        self.inner
            .lock()
            .await
            .sent
            .iter()
            .filter(|m| !m.batch.is_flush_check())
            .cloned()
            .collect()
    }

    /// Recorded sends that are flush-check triggers.
    pub async fn sent_flush_checks(&self) -> Vec<SentMessage> {
        self.inner
            .lock()
            .await
            .sent
            .iter()
            .filter(|m| m.batch.is_flush_check())
            .cloned()
            .collect()
    }

    /// Ids acknowledged so far.
    pub async fn acked(&self) -> Vec<i64> {
        self.inner.lock().await.acked.clone()
    }

    /// (id, delay) pairs retried so far.
    pub async fn retried(&self) -> Vec<(i64, u32)> {
        self.inner.lock().await.retried.clone()
    }

    /// (id, delay) pairs released so far (contention backoff).
    pub async fn released(&self) -> Vec<(i64, u32)> {
        self.inner.lock().await.released.clone()
    }

    /// Number of entries still deliverable.
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockQueue {
    fn name(&self) -> &str {
        "mock-queue"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, BurbleError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BurbleError> {
        Ok(())
    }
}

#[async_trait]
impl QueueAdapter for MockQueue {
    async fn send(&self, batch: &QueuedBatch, delay_seconds: u32) -> Result<(), BurbleError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BurbleError::Queue {
                message: "injected send failure".into(),
                source: None,
            });
        }
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.sent.push(SentMessage {
            batch: batch.clone(),
            delay_seconds,
        });
        inner.pending.push_back((id, batch.clone(), 0));
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, BurbleError> {
        let mut inner = self.inner.lock().await;
        let mut deliveries = Vec::new();
        while deliveries.len() < max {
            let Some((id, batch, attempts)) = inner.pending.pop_front() else {
                break;
            };
            inner.claimed.insert(id, (batch.clone(), attempts));
            deliveries.push(Delivery { id, batch, attempts });
        }
        Ok(deliveries)
    }

    async fn ack(&self, id: i64) -> Result<(), BurbleError> {
        let mut inner = self.inner.lock().await;
        inner.claimed.remove(&id);
        inner.acked.push(id);
        Ok(())
    }

    async fn retry(&self, id: i64, delay_seconds: u32) -> Result<(), BurbleError> {
        let mut inner = self.inner.lock().await;
        inner.retried.push((id, delay_seconds));
        if let Some((batch, attempts)) = inner.claimed.remove(&id) {
            inner.pending.push_back((id, batch, attempts + 1));
        }
        Ok(())
    }

    async fn release(&self, id: i64, delay_seconds: u32) -> Result<(), BurbleError> {
        let mut inner = self.inner.lock().await;
        inner.released.push((id, delay_seconds));
        if let Some((batch, attempts)) = inner.claimed.remove(&id) {
            inner.pending.push_back((id, batch, attempts));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burble_core::types::ConversationId;

    fn check(id: &str) -> QueuedBatch {
        QueuedBatch::flush_check(ConversationId(id.into()))
    }

    #[tokio::test]
    async fn send_records_batch_and_delay() {
        let queue = MockQueue::new();
        queue.send(&check("c1"), 7).await.unwrap();

        let sent = queue.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].delay_seconds, 7);
        assert!(sent[0].batch.is_flush_check());
    }

    #[tokio::test]
    async fn receive_claims_in_send_order() {
        let queue = MockQueue::new();
        queue.send(&check("a"), 0).await.unwrap();
        queue.send(&check("b"), 0).await.unwrap();

        let deliveries = queue.receive(10).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].batch.conversation_id.0, "a");
        assert_eq!(deliveries[1].batch.conversation_id.0, "b");

        assert!(queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_requeues_with_attempt_bump() {
        let queue = MockQueue::new();
        queue.send(&check("a"), 0).await.unwrap();

        let first = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(first.attempts, 0);
        queue.retry(first.id, 3).await.unwrap();

        let second = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempts, 1);
        assert_eq!(queue.retried().await, vec![(first.id, 3)]);
    }

    #[tokio::test]
    async fn release_requeues_without_attempt_bump() {
        let queue = MockQueue::new();
        queue.send(&check("a"), 0).await.unwrap();

        let first = queue.receive(1).await.unwrap().remove(0);
        queue.release(first.id, 3).await.unwrap();

        let second = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempts, 0);
        assert_eq!(queue.released().await, vec![(first.id, 3)]);
        assert!(queue.retried().await.is_empty());
    }

    #[tokio::test]
    async fn acked_entries_do_not_come_back() {
        let queue = MockQueue::new();
        queue.send(&check("a"), 0).await.unwrap();

        let delivery = queue.receive(1).await.unwrap().remove(0);
        queue.ack(delivery.id).await.unwrap();

        assert!(queue.receive(1).await.unwrap().is_empty());
        assert_eq!(queue.acked().await, vec![delivery.id]);
    }

    #[tokio::test]
    async fn injected_send_failure_surfaces_as_queue_error() {
        let queue = MockQueue::new();
        queue.fail_sends(true);

        let err = queue.send(&check("a"), 0).await.unwrap_err();
        assert!(matches!(err, BurbleError::Queue { .. }));
        assert!(queue.sent().await.is_empty());
    }
}
