// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue consumer and per-conversation lock coordination.
//!
//! For every delivered queue message the consumer guarantees that at most
//! one processing callback runs per conversation at a time. A conversation
//! moves `Idle -> Locked -> Idle` on both the success and the failure path;
//! a crashed worker's lock ages past the staleness threshold and is
//! reclaimed by the next delivery. Waiting is never expressed as an
//! in-process sleep: a contended or failed delivery asks the queue to
//! redeliver it later.

use std::sync::Arc;
use std::time::Duration;

use burble_config::model::ConsumerConfig;
use burble_core::types::now_millis;
use burble_core::{BatchProcessor, BurbleError, ProcessingLock, QueuedBatch, StoreAdapter};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::buffer::BufferManager;

/// What the consumer asks the queue to do with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handling finished; the message is done.
    Ack,
    /// The conversation is locked by another worker: redeliver after a
    /// short delay without counting an attempt. Expected behavior, not a
    /// failure.
    Backoff { delay_seconds: u32 },
    /// Handling failed: redeliver after the given delay, counting toward
    /// the entry's attempt budget.
    Retry { delay_seconds: u32 },
}

/// Coordinates lock acquisition, batch processing, and flush-check
/// re-validation for delivered queue messages.
pub struct QueueConsumer {
    store: Arc<dyn StoreAdapter + Send + Sync>,
    buffers: BufferManager,
    processor: Arc<dyn BatchProcessor>,
    lock_staleness: Duration,
    contention_retry_secs: u32,
    error_retry_secs: u32,
}

impl QueueConsumer {
    /// Create a consumer over the given store, buffer manager, and
    /// processing callback.
    pub fn new(
        store: Arc<dyn StoreAdapter + Send + Sync>,
        buffers: BufferManager,
        processor: Arc<dyn BatchProcessor>,
        config: &ConsumerConfig,
    ) -> Self {
        Self {
            store,
            buffers,
            processor,
            lock_staleness: Duration::from_secs(config.lock_staleness_secs),
            contention_retry_secs: config.contention_retry_secs,
            error_retry_secs: config.error_retry_secs,
        }
    }

    /// Handle one delivered queue message.
    ///
    /// Never returns an error: every outcome maps to a [`Disposition`] for
    /// the queue. Contention on a live lock is a controlled backoff with
    /// the short delay; infrastructure and processing failures retry with
    /// the longer delay. The conversation lock is released on every path
    /// out of the locked section.
    pub async fn handle_delivery(&self, batch: &QueuedBatch) -> Disposition {
        let conversation_id = &batch.conversation_id;
        let lock_key = conversation_id.lock_key();

        match self.read_lock(&lock_key).await {
            Ok(Some(lock)) if !lock.is_stale(now_millis(), self.lock_staleness) => {
                // Another worker is processing this conversation. Back off
                // and let the queue bring the message around again.
                debug!(
                    conversation_id = %conversation_id,
                    "conversation locked by another worker, backing off"
                );
                counter!("burble_lock_contention_total").increment(1);
                return Disposition::Backoff {
                    delay_seconds: self.contention_retry_secs,
                };
            }
            Ok(Some(lock)) => {
                info!(
                    conversation_id = %conversation_id,
                    acquired_at_ms = lock.acquired_at_ms,
                    "reclaiming stale processing lock"
                );
                if let Err(e) = self.store.delete(&lock_key).await {
                    warn!(
                        conversation_id = %conversation_id,
                        error = %e,
                        "failed to clear stale lock"
                    );
                    return Disposition::Retry {
                        delay_seconds: self.error_retry_secs,
                    };
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "failed to read processing lock"
                );
                return Disposition::Retry {
                    delay_seconds: self.error_retry_secs,
                };
            }
        }

        // Acquire with an unconditional put: the store has no
        // compare-and-swap, so two consumers reading "unlocked" at once can
        // both get here. The window is narrow and its worst case is brief
        // duplicate processing, which the callback contract tolerates.
        if let Err(e) = self.acquire_lock(&lock_key).await {
            warn!(
                conversation_id = %conversation_id,
                error = %e,
                "failed to acquire processing lock"
            );
            return Disposition::Retry {
                delay_seconds: self.error_retry_secs,
            };
        }

        let outcome = self.handle_locked(batch).await;

        // Release unconditionally, success or failure. A failed delete is
        // not retried here: the lock will age out and be reclaimed.
        if let Err(e) = self.store.delete(&lock_key).await {
            warn!(
                conversation_id = %conversation_id,
                error = %e,
                "failed to release processing lock"
            );
        }

        match outcome {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "delivery handling failed, scheduling retry"
                );
                counter!("burble_processing_failures_total").increment(1);
                Disposition::Retry {
                    delay_seconds: self.error_retry_secs,
                }
            }
        }
    }

    /// The part of delivery handling that runs while holding the lock.
    async fn handle_locked(&self, batch: &QueuedBatch) -> Result<(), BurbleError> {
        if batch.is_flush_check() {
            // Re-validate against live state: an elapsed window enqueues
            // the buffered items as a real batch, an open window (a newer
            // append reset it) schedules a fresh check, a drained buffer is
            // a no-op. The materialized batch arrives as its own delivery,
            // so a later processing failure retries a message that still
            // carries its items.
            self.buffers.schedule_flush(&batch.conversation_id).await
        } else {
            self.processor
                .process(&batch.conversation_id, &batch.items)
                .await?;
            counter!("burble_batches_processed_total").increment(1);
            debug!(
                conversation_id = %batch.conversation_id,
                count = batch.items.len(),
                "batch processed"
            );
            Ok(())
        }
    }

    async fn read_lock(&self, lock_key: &str) -> Result<Option<ProcessingLock>, BurbleError> {
        match self.store.get(lock_key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn acquire_lock(&self, lock_key: &str) -> Result<(), BurbleError> {
        let lock = ProcessingLock {
            acquired_at_ms: now_millis(),
        };
        let raw = serde_json::to_string(&lock)?;
        self.store.put(lock_key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burble_config::model::BufferConfig;
    use burble_core::types::ConversationBuffer;
    use burble_core::{BufferedItem, ConversationId};
    use burble_test_utils::{MemoryStore, MockQueue, RecordingProcessor};

    const DEBOUNCE_MS: u64 = 10_000;

    fn make_consumer(
        processor: Arc<RecordingProcessor>,
    ) -> (Arc<QueueConsumer>, Arc<MemoryStore>, Arc<MockQueue>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MockQueue::new());
        let buffer_config = BufferConfig {
            debounce_timeout_ms: DEBOUNCE_MS,
            batch_limit: 5,
        };
        let buffers = BufferManager::new(store.clone(), queue.clone(), &buffer_config);
        let consumer_config = ConsumerConfig {
            lock_staleness_secs: 300,
            contention_retry_secs: 3,
            error_retry_secs: 10,
            poll_interval_ms: 500,
            receive_batch_size: 16,
        };
        let consumer = Arc::new(QueueConsumer::new(
            store.clone(),
            buffers,
            processor,
            &consumer_config,
        ));
        (consumer, store, queue)
    }

    fn item(text: &str) -> BufferedItem {
        BufferedItem {
            sender_id: "user-1".into(),
            text: text.into(),
            image_urls: Vec::new(),
            timestamp_ms: now_millis(),
            origin_message_id: format!("m-{text}"),
        }
    }

    fn batch(id: &str, texts: &[&str]) -> QueuedBatch {
        QueuedBatch {
            conversation_id: ConversationId(id.into()),
            items: texts.iter().map(|t| item(t)).collect(),
        }
    }

    async fn put_lock(store: &MemoryStore, conversation_id: &ConversationId, acquired_at_ms: i64) {
        let lock = ProcessingLock { acquired_at_ms };
        store
            .put(
                &conversation_id.lock_key(),
                &serde_json::to_string(&lock).unwrap(),
            )
            .await
            .unwrap();
    }

    async fn put_buffer(
        store: &MemoryStore,
        conversation_id: &ConversationId,
        texts: &[&str],
        last_message_at_ms: i64,
    ) {
        let buffer = ConversationBuffer {
            messages: texts.iter().map(|t| item(t)).collect(),
            last_message_at_ms,
            scheduled_flush_at_ms: None,
        };
        store
            .put(
                &conversation_id.buffer_key(),
                &serde_json::to_string(&buffer).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn batch_delivery_runs_processor_and_acks() {
        let processor = RecordingProcessor::new();
        let (consumer, store, _queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());

        let disposition = consumer.handle_delivery(&batch("chat-1", &["a", "b"])).await;

        assert_eq!(disposition, Disposition::Ack);
        let processed = processor.processed().await;
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].conversation_id, id);
        assert_eq!(processed[0].items.len(), 2);
        assert!(!store.contains_key(&id.lock_key()).await, "lock released");
    }

    #[tokio::test]
    async fn live_lock_backs_off_with_contention_delay() {
        let processor = RecordingProcessor::new();
        let (consumer, store, _queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());
        put_lock(&store, &id, now_millis()).await;

        let disposition = consumer.handle_delivery(&batch("chat-1", &["a"])).await;

        assert_eq!(disposition, Disposition::Backoff { delay_seconds: 3 });
        assert_eq!(processor.processed_count().await, 0);
        // The foreign lock must be left in place.
        assert!(store.contains_key(&id.lock_key()).await);
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed_and_processing_proceeds() {
        let processor = RecordingProcessor::new();
        let (consumer, store, _queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());
        // Lock acquired well past the 300s staleness threshold.
        put_lock(&store, &id, now_millis() - 600_000).await;

        let disposition = consumer.handle_delivery(&batch("chat-1", &["a"])).await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(processor.processed_count().await, 1);
        assert!(!store.contains_key(&id.lock_key()).await);
    }

    #[tokio::test]
    async fn lock_released_when_processor_fails() {
        let processor = RecordingProcessor::failing(1);
        let (consumer, store, _queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());

        let disposition = consumer.handle_delivery(&batch("chat-1", &["a"])).await;

        assert_eq!(disposition, Disposition::Retry { delay_seconds: 10 });
        assert!(
            !store.contains_key(&id.lock_key()).await,
            "lock must be released even on processor failure"
        );

        // The redelivered batch succeeds on a fresh lock.
        let disposition = consumer.handle_delivery(&batch("chat-1", &["a"])).await;
        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(processor.processed_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_deliveries_never_overlap_processing() {
        let (processor, gate) = RecordingProcessor::holding();
        let (consumer, store, _queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());

        let first = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.handle_delivery(&batch("chat-1", &["a"])).await }
        });

        // Wait until the first delivery is inside the processor (holding
        // the lock), then deliver a second batch for the same conversation.
        processor.entered().acquire().await.unwrap().forget();
        assert!(store.contains_key(&id.lock_key()).await);

        let second = consumer.handle_delivery(&batch("chat-1", &["b"])).await;
        assert_eq!(
            second,
            Disposition::Backoff { delay_seconds: 3 },
            "second delivery observes the live lock and backs off"
        );
        assert_eq!(processor.processed_count().await, 0, "no overlap");

        gate.add_permits(1);
        assert_eq!(first.await.unwrap(), Disposition::Ack);
        assert_eq!(processor.processed_count().await, 1);
        assert!(!store.contains_key(&id.lock_key()).await);
    }

    #[tokio::test]
    async fn deliveries_for_different_conversations_are_independent() {
        let (processor, gate) = RecordingProcessor::holding();
        let (consumer, _store, _queue) = make_consumer(processor.clone());

        let first = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.handle_delivery(&batch("chat-1", &["a"])).await }
        });
        processor.entered().acquire().await.unwrap().forget();

        // A different conversation is not blocked by chat-1's lock; release
        // both in-flight calls afterwards.
        let second = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.handle_delivery(&batch("chat-2", &["b"])).await }
        });
        processor.entered().acquire().await.unwrap().forget();

        gate.add_permits(2);
        assert_eq!(first.await.unwrap(), Disposition::Ack);
        assert_eq!(second.await.unwrap(), Disposition::Ack);
        assert_eq!(processor.processed_count().await, 2);
    }

    #[tokio::test]
    async fn flush_check_on_missing_buffer_is_a_noop() {
        let processor = RecordingProcessor::new();
        let (consumer, store, queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());

        let check = QueuedBatch::flush_check(id.clone());
        let disposition = consumer.handle_delivery(&check).await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(processor.processed_count().await, 0);
        assert!(queue.sent().await.is_empty());
        assert!(!store.contains_key(&id.lock_key()).await);
    }

    #[tokio::test]
    async fn flush_check_on_elapsed_window_materializes_the_batch() {
        let processor = RecordingProcessor::new();
        let (consumer, store, queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());
        put_buffer(&store, &id, &["a", "b"], now_millis() - (DEBOUNCE_MS as i64 + 1)).await;

        let check = QueuedBatch::flush_check(id.clone());
        let disposition = consumer.handle_delivery(&check).await;

        assert_eq!(disposition, Disposition::Ack);
        // The items go back onto the queue as a real batch; the processor
        // runs when that batch is delivered, not during the check.
        assert_eq!(processor.processed_count().await, 0);
        let batches = queue.sent_batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch.items.len(), 2);
        assert!(!store.contains_key(&id.buffer_key()).await);
        assert!(!store.contains_key(&id.lock_key()).await);
    }

    #[tokio::test]
    async fn flush_check_on_open_window_reschedules() {
        let processor = RecordingProcessor::new();
        let (consumer, store, queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());
        put_buffer(&store, &id, &["a"], now_millis() - 3_000).await;

        let check = QueuedBatch::flush_check(id.clone());
        let disposition = consumer.handle_delivery(&check).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(queue.sent_batches().await.is_empty());
        let checks = queue.sent_flush_checks().await;
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].delay_seconds, 7);
        assert!(store.contains_key(&id.buffer_key()).await);
    }

    #[tokio::test]
    async fn store_read_failure_retries_with_error_delay() {
        let processor = RecordingProcessor::new();
        let (consumer, store, _queue) = make_consumer(processor.clone());
        let id = ConversationId("chat-1".into());
        // An unreadable lock record maps to the error backoff, not a crash.
        store.put(&id.lock_key(), "not json").await.unwrap();

        let disposition = consumer.handle_delivery(&batch("chat-1", &["a"])).await;
        assert_eq!(disposition, Disposition::Retry { delay_seconds: 10 });
        assert_eq!(processor.processed_count().await, 0);
    }
}
