// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation message buffering and debounce scheduling.
//!
//! The buffer manager coalesces message bursts without an in-process timer:
//! instead of arming a timeout it enqueues a delayed flush-check message
//! that re-reads live state when it arrives. A check carries no generation
//! number -- every append resets `last_message_at_ms`, so a check that fires
//! for a buffer that received newer messages sees an open window and
//! re-schedules instead of flushing. Stale checks are therefore harmless,
//! at the cost of a possible pile-up of redundant check messages.

use std::sync::Arc;
use std::time::Duration;

use burble_config::model::BufferConfig;
use burble_core::types::now_millis;
use burble_core::{
    BufferedItem, BurbleError, ConversationBuffer, ConversationId, QueueAdapter, QueuedBatch,
    StoreAdapter,
};
use metrics::counter;
use tracing::{debug, warn};

/// Owns the debounce logic: appends incoming items to a conversation's
/// buffer and decides whether to flush now (batch limit reached or window
/// already elapsed) or to schedule a future flush-check via the queue.
///
/// Buffer records are read-modify-write with last-writer-wins; the narrow
/// race where two concurrent appends interleave can lose one update and is
/// accepted.
#[derive(Clone)]
pub struct BufferManager {
    store: Arc<dyn StoreAdapter + Send + Sync>,
    queue: Arc<dyn QueueAdapter + Send + Sync>,
    debounce_timeout: Duration,
}

impl BufferManager {
    /// Create a buffer manager over the given store and queue.
    pub fn new(
        store: Arc<dyn StoreAdapter + Send + Sync>,
        queue: Arc<dyn QueueAdapter + Send + Sync>,
        config: &BufferConfig,
    ) -> Self {
        Self {
            store,
            queue,
            debounce_timeout: Duration::from_millis(config.debounce_timeout_ms),
        }
    }

    /// Append one inbound item to the conversation's buffer.
    ///
    /// Resets the debounce window. When the buffer reaches `batch_limit`
    /// the whole buffer is flushed immediately; a queue failure on that
    /// path propagates to the caller, with the pre-append buffer still
    /// persisted. Below the limit the buffer is persisted and a delayed
    /// flush-check is scheduled.
    pub async fn buffer_message(
        &self,
        conversation_id: &ConversationId,
        item: BufferedItem,
        batch_limit: usize,
    ) -> Result<(), BurbleError> {
        let mut buffer = self.load(conversation_id).await?.unwrap_or_default();
        buffer.messages.push(item);
        buffer.last_message_at_ms = now_millis();

        if buffer.messages.len() >= batch_limit.max(1) {
            debug!(
                conversation_id = %conversation_id,
                count = buffer.messages.len(),
                "batch limit reached, flushing"
            );
            counter!("burble_flushes_total", "reason" => "batch_limit").increment(1);
            return self.flush(conversation_id, buffer.messages).await;
        }

        self.persist(conversation_id, &buffer).await?;
        self.schedule_flush(conversation_id).await
    }

    /// Re-evaluate the conversation's buffer against the debounce window.
    ///
    /// Missing or empty buffer: no-op. Window elapsed: flush now. Window
    /// still open: enqueue a flush-check delayed by the remaining time
    /// (rounded up to whole seconds) and record the scheduled time on the
    /// buffer for observability.
    ///
    /// A failure to send the delayed check is logged and swallowed -- the
    /// buffer stays persisted, so the next append or the batch limit will
    /// still flush it, just later.
    pub async fn schedule_flush(&self, conversation_id: &ConversationId) -> Result<(), BurbleError> {
        let Some(mut buffer) = self.load(conversation_id).await? else {
            return Ok(());
        };
        if buffer.messages.is_empty() {
            return Ok(());
        }

        let now = now_millis();
        let elapsed_ms = buffer.elapsed_since_last(now);
        let debounce_ms = self.debounce_timeout.as_millis() as u64;

        if elapsed_ms >= debounce_ms {
            debug!(
                conversation_id = %conversation_id,
                elapsed_ms,
                "debounce window elapsed, flushing"
            );
            counter!("burble_flushes_total", "reason" => "debounce").increment(1);
            return self.flush(conversation_id, buffer.messages).await;
        }

        let remaining_ms = debounce_ms - elapsed_ms;
        let delay_seconds = remaining_ms.div_ceil(1000) as u32;
        let check = QueuedBatch::flush_check(conversation_id.clone());

        match self.queue.send(&check, delay_seconds).await {
            Ok(()) => {
                buffer.scheduled_flush_at_ms = Some(now + remaining_ms as i64);
                debug!(
                    conversation_id = %conversation_id,
                    delay_seconds,
                    "flush-check scheduled"
                );
            }
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "failed to schedule flush-check, buffer will flush on next append"
                );
                buffer.scheduled_flush_at_ms = None;
            }
        }

        // Metadata write only; the messages themselves are already persisted.
        if let Err(e) = self.persist(conversation_id, &buffer).await {
            warn!(
                conversation_id = %conversation_id,
                error = %e,
                "failed to record scheduled flush time"
            );
        }
        Ok(())
    }

    /// Unconditionally flush whatever is buffered, regardless of the
    /// debounce window. Used by cleanup paths. No-op when nothing is
    /// buffered.
    pub async fn flush_buffer(&self, conversation_id: &ConversationId) -> Result<(), BurbleError> {
        let Some(buffer) = self.load(conversation_id).await? else {
            return Ok(());
        };
        if buffer.messages.is_empty() {
            // Present-but-empty record: drop the key, nothing to enqueue.
            return self.store.delete(&conversation_id.buffer_key()).await;
        }
        counter!("burble_flushes_total", "reason" => "manual").increment(1);
        self.flush(conversation_id, buffer.messages).await
    }

    /// Enqueue the items as an immediate batch, then delete the buffer key.
    ///
    /// Send failures propagate with the buffer still persisted. A crash
    /// between the send and the delete leaves the buffer behind and the
    /// batch in flight -- redelivered work, never lost work.
    async fn flush(
        &self,
        conversation_id: &ConversationId,
        items: Vec<BufferedItem>,
    ) -> Result<(), BurbleError> {
        let count = items.len();
        let batch = QueuedBatch {
            conversation_id: conversation_id.clone(),
            items,
        };
        self.queue.send(&batch, 0).await?;
        self.store.delete(&conversation_id.buffer_key()).await?;
        debug!(conversation_id = %conversation_id, count, "buffer flushed");
        Ok(())
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationBuffer>, BurbleError> {
        match self.store.get(&conversation_id.buffer_key()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn persist(
        &self,
        conversation_id: &ConversationId,
        buffer: &ConversationBuffer,
    ) -> Result<(), BurbleError> {
        let raw = serde_json::to_string(buffer)?;
        self.store.put(&conversation_id.buffer_key(), &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burble_test_utils::{MemoryStore, MockQueue};

    const DEBOUNCE_MS: u64 = 10_000;

    fn make_manager() -> (BufferManager, Arc<MemoryStore>, Arc<MockQueue>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MockQueue::new());
        let config = BufferConfig {
            debounce_timeout_ms: DEBOUNCE_MS,
            batch_limit: 5,
        };
        let manager = BufferManager::new(store.clone(), queue.clone(), &config);
        (manager, store, queue)
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
    async fn reaching_batch_limit_flushes_all_items_in_order() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());

        manager.buffer_message(&id, item("a"), 3).await.unwrap();
        manager.buffer_message(&id, item("b"), 3).await.unwrap();
        manager.buffer_message(&id, item("c"), 3).await.unwrap();

        let batches = queue.sent_batches().await;
        assert_eq!(batches.len(), 1, "exactly one real batch");
        assert_eq!(batches[0].delay_seconds, 0);
        let texts: Vec<_> = batches[0].batch.items.iter().map(|i| i.text.clone()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);

        assert!(
            !store.contains_key(&id.buffer_key()).await,
            "buffer key must be deleted on flush"
        );
    }

    #[tokio::test]
    async fn sub_limit_append_persists_and_schedules_check() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());

        manager.buffer_message(&id, item("a"), 5).await.unwrap();

        assert!(store.contains_key(&id.buffer_key()).await);
        assert!(queue.sent_batches().await.is_empty());

        let checks = queue.sent_flush_checks().await;
        assert_eq!(checks.len(), 1);
        // Fresh append: the full window remains.
        assert_eq!(checks[0].delay_seconds, (DEBOUNCE_MS / 1000) as u32);

        let buffer: ConversationBuffer =
            serde_json::from_str(&store.get(&id.buffer_key()).await.unwrap().unwrap()).unwrap();
        assert_eq!(buffer.messages.len(), 1);
        assert!(buffer.scheduled_flush_at_ms.is_some());
    }

    #[tokio::test]
    async fn elapsed_window_flushes_on_schedule_check() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        put_buffer(&store, &id, &["a", "b"], now_millis() - (DEBOUNCE_MS as i64 + 1)).await;

        manager.schedule_flush(&id).await.unwrap();

        let batches = queue.sent_batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch.items.len(), 2);
        assert!(!store.contains_key(&id.buffer_key()).await);
    }

    #[tokio::test]
    async fn open_window_reschedules_with_remaining_delay() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        // 3 seconds into a 10 second window: 7 seconds remain.
        put_buffer(&store, &id, &["a"], now_millis() - 3_000).await;

        manager.schedule_flush(&id).await.unwrap();

        assert!(queue.sent_batches().await.is_empty(), "no items enqueued");
        let checks = queue.sent_flush_checks().await;
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].delay_seconds, 7);
        assert!(store.contains_key(&id.buffer_key()).await);
    }

    #[tokio::test]
    async fn remaining_delay_rounds_up_to_whole_seconds() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        // 9.5 seconds elapsed: 500ms remain, which rounds up to 1 second.
        put_buffer(&store, &id, &["a"], now_millis() - 9_500).await;

        manager.schedule_flush(&id).await.unwrap();

        let checks = queue.sent_flush_checks().await;
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].delay_seconds, 1);
    }

    #[tokio::test]
    async fn new_append_resets_the_window() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        // Buffer nearly eligible for a time-based flush...
        put_buffer(&store, &id, &["a"], now_millis() - 9_000).await;

        // ...but a new append resets last_message_at_ms to now.
        manager.buffer_message(&id, item("b"), 5).await.unwrap();

        assert!(queue.sent_batches().await.is_empty(), "append must not flush");
        let checks = queue.sent_flush_checks().await;
        let last = checks.last().unwrap();
        assert_eq!(
            last.delay_seconds,
            (DEBOUNCE_MS / 1000) as u32,
            "window restarts from the newest append"
        );
    }

    #[tokio::test]
    async fn schedule_flush_on_missing_buffer_is_a_noop() {
        let (manager, _store, queue) = make_manager();
        let id = ConversationId("chat-none".into());

        manager.schedule_flush(&id).await.unwrap();
        assert!(queue.sent().await.is_empty());
    }

    #[tokio::test]
    async fn schedule_send_failure_degrades_gracefully() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        put_buffer(&store, &id, &["a"], now_millis() - 3_000).await;
        queue.fail_sends(true);

        // The failure is swallowed; the buffer survives with no recorded
        // schedule.
        manager.schedule_flush(&id).await.unwrap();

        let buffer: ConversationBuffer =
            serde_json::from_str(&store.get(&id.buffer_key()).await.unwrap().unwrap()).unwrap();
        assert_eq!(buffer.messages.len(), 1);
        assert!(buffer.scheduled_flush_at_ms.is_none());
    }

    #[tokio::test]
    async fn immediate_flush_failure_propagates_and_keeps_prior_buffer() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());

        manager.buffer_message(&id, item("a"), 2).await.unwrap();
        queue.fail_sends(true);

        let err = manager.buffer_message(&id, item("b"), 2).await.unwrap_err();
        assert!(matches!(err, BurbleError::Queue { .. }));

        // The failed append is not persisted; the earlier state is intact
        // and a retried append will still reach the limit.
        let buffer: ConversationBuffer =
            serde_json::from_str(&store.get(&id.buffer_key()).await.unwrap().unwrap()).unwrap();
        assert_eq!(buffer.messages.len(), 1);
        assert_eq!(buffer.messages[0].text, "a");
    }

    #[tokio::test]
    async fn manual_flush_drains_regardless_of_window() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        // Window far from elapsed.
        put_buffer(&store, &id, &["a", "b"], now_millis()).await;

        manager.flush_buffer(&id).await.unwrap();

        let batches = queue.sent_batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch.items.len(), 2);
        assert!(!store.contains_key(&id.buffer_key()).await);
    }

    #[tokio::test]
    async fn manual_flush_of_missing_buffer_is_a_noop() {
        let (manager, _store, queue) = make_manager();
        let id = ConversationId("chat-none".into());

        manager.flush_buffer(&id).await.unwrap();
        assert!(queue.sent().await.is_empty());
    }

    #[tokio::test]
    async fn manual_flush_of_empty_record_drops_the_key() {
        let (manager, store, queue) = make_manager();
        let id = ConversationId("chat-1".into());
        put_buffer(&store, &id, &[], now_millis()).await;

        manager.flush_buffer(&id).await.unwrap();

        assert!(queue.sent().await.is_empty());
        assert!(!store.contains_key(&id.buffer_key()).await);
    }
}
