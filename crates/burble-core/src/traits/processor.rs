// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch processing callback boundary.

use async_trait::async_trait;

use crate::error::BurbleError;
use crate::types::{BufferedItem, ConversationId};

/// The processing callback handed each drained batch.
///
/// Implementations perform reply generation and its side effects (history,
/// memory, LLM, platform send APIs). The pipeline never inspects the
/// business result -- it observes only success vs. error, and retries the
/// delivery on error. Because delivery is at-least-once, implementations
/// should tolerate an occasional duplicate or out-of-order batch.
#[async_trait]
pub trait BatchProcessor: Send + Sync + 'static {
    /// Processes one batch of buffered items for a conversation.
    ///
    /// Items arrive in append order. The conversation's processing lock is
    /// held for the duration of the call.
    async fn process(
        &self,
        conversation_id: &ConversationId,
        items: &[BufferedItem],
    ) -> Result<(), BurbleError>;
}
