// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording batch processor for deterministic testing.
//!
//! `RecordingProcessor` captures every processed batch. It can be built to
//! fail its first N calls (retry-path tests) or to block inside `process`
//! until released (overlap and mutual-exclusion tests).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use burble_core::types::{BufferedItem, ConversationId};
use burble_core::{BatchProcessor, BurbleError};

/// One captured `process` call.
#[derive(Debug, Clone)]
pub struct ProcessedBatch {
    pub conversation_id: ConversationId,
    pub items: Vec<BufferedItem>,
}

/// A mock processing callback for testing.
pub struct RecordingProcessor {
    processed: tokio::sync::Mutex<Vec<ProcessedBatch>>,
    fail_remaining: AtomicUsize,
    /// Permit added each time `process` is entered; tests acquire to
    /// synchronize with an in-flight call.
    entered: Arc<Semaphore>,
    /// When present, `process` consumes one permit before returning;
    /// tests release blocked calls by adding permits.
    gate: Option<Arc<Semaphore>>,
}

impl RecordingProcessor {
    /// A processor that records every call and always succeeds.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            processed: tokio::sync::Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(0),
            entered: Arc::new(Semaphore::new(0)),
            gate: None,
        })
    }

    /// A processor whose first `times` calls fail, then succeed.
    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            processed: tokio::sync::Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(times),
            entered: Arc::new(Semaphore::new(0)),
            gate: None,
        })
    }

    /// A processor that blocks inside `process` until the returned gate
    /// receives a permit. Combine with [`entered`] to detect the call.
    ///
    /// [`entered`]: RecordingProcessor::entered
    pub fn holding() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let processor = Arc::new(Self {
            processed: tokio::sync::Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(0),
            entered: Arc::new(Semaphore::new(0)),
            gate: Some(gate.clone()),
        });
        (processor, gate)
    }

    /// Semaphore that gains one permit each time `process` is entered.
    pub fn entered(&self) -> Arc<Semaphore> {
        self.entered.clone()
    }

    /// All batches processed successfully so far.
    pub async fn processed(&self) -> Vec<ProcessedBatch> {
        self.processed.lock().await.clone()
    }

    /// Count of successfully processed batches.
    pub async fn processed_count(&self) -> usize {
        self.processed.lock().await.len()
    }
}

#[async_trait]
impl BatchProcessor for RecordingProcessor {
    async fn process(
        &self,
        conversation_id: &ConversationId,
        items: &[BufferedItem],
    ) -> Result<(), BurbleError> {
        self.entered.add_permits(1);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| BurbleError::Internal(e.to_string()))?
                .forget();
        }

        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BurbleError::Process {
                message: "injected processing failure".into(),
                source: None,
            });
        }

        self.processed.lock().await.push(ProcessedBatch {
            conversation_id: conversation_id.clone(),
            items: items.to_vec(),
        });
        Ok(())
    }
}
