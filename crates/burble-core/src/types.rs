// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Burble pipeline.
//!
//! The store persists [`ConversationBuffer`] and [`ProcessingLock`] records as
//! JSON under per-conversation keys; the queue carries [`QueuedBatch`] JSON
//! payloads. These shapes are the only wire formats the pipeline defines.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation (a single chat/session).
///
/// The unit of buffering and of lock scoping: all store keys and all queue
/// payloads are scoped by this id, and conversations are fully independent
/// units of concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Store key under which this conversation's buffer record lives.
    pub fn buffer_key(&self) -> String {
        format!("buffer:{}", self.0)
    }

    /// Store key under which this conversation's processing lock lives.
    pub fn lock_key(&self) -> String {
        format!("lock:{}", self.0)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// All buffer and lock timestamps use this clock.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One buffered inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedItem {
    /// Platform identity of the sender.
    pub sender_id: String,
    /// Message text (or caption / sticker-derived text).
    pub text: String,
    /// Optional image payload references carried alongside the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    /// Wall-clock receive time in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Message id assigned by the originating platform.
    pub origin_message_id: String,
}

/// Per-conversation buffer of messages awaiting a flush.
///
/// Lifecycle: created on first append, mutated by every append, deleted on
/// flush. The store has no transactions, so updates are read-modify-write
/// with last-writer-wins; two concurrent appends can lose an interleaved
/// update. That race is accepted: its consequence is bounded to an append
/// not being reflected in a concurrent flush read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationBuffer {
    /// Buffered messages in append order.
    pub messages: Vec<BufferedItem>,
    /// Time of the most recent append; resets the debounce window. This
    /// field, not any scheduled check, is authoritative for flush decisions.
    pub last_message_at_ms: i64,
    /// When a flush-check was last scheduled to fire. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_flush_at_ms: Option<i64>,
}

impl ConversationBuffer {
    /// Milliseconds elapsed since the last append, clamped at zero.
    pub fn elapsed_since_last(&self, now_ms: i64) -> u64 {
        (now_ms - self.last_message_at_ms).max(0) as u64
    }
}

/// Per-conversation processing lock record.
///
/// Absence of the lock key means unlocked. A lock is acquired with an
/// unconditional write (the store offers no compare-and-swap), so a narrow
/// double-acquisition race exists and is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProcessingLock {
    /// When the lock was taken, in epoch milliseconds.
    pub acquired_at_ms: i64,
}

impl ProcessingLock {
    /// Whether the lock is old enough to be presumed abandoned by a crashed
    /// worker and safe to reclaim.
    pub fn is_stale(&self, now_ms: i64, staleness: Duration) -> bool {
        (now_ms - self.acquired_at_ms).max(0) as u128 >= staleness.as_millis()
    }
}

/// A message on the delayed queue.
///
/// An empty `items` list is a flush-check trigger: it asks the consumer to
/// re-inspect the live buffer rather than process anything directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedBatch {
    pub conversation_id: ConversationId,
    pub items: Vec<BufferedItem>,
}

impl QueuedBatch {
    /// Build a flush-check trigger for the given conversation.
    pub fn flush_check(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            items: Vec::new(),
        }
    }

    /// Whether this message is a flush-check trigger rather than a batch.
    pub fn is_flush_check(&self) -> bool {
        self.items.is_empty()
    }
}

/// A queue entry delivered to the consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Backend-assigned entry id, used for ack/retry.
    pub id: i64,
    /// The decoded payload.
    pub batch: QueuedBatch,
    /// How many times this entry has been retried so far.
    pub attempts: i32,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind the plugin trait.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    Queue,
    Processor,
}
