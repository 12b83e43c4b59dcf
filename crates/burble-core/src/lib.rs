// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Burble bot pipeline.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Burble workspace: the durable key-value
//! store and delayed-queue boundaries, the batch-processing callback
//! contract, and the JSON record shapes persisted by the pipeline.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BurbleError;
pub use types::{
    AdapterType, BufferedItem, ConversationBuffer, ConversationId, Delivery, HealthStatus,
    ProcessingLock, QueuedBatch,
};

// Re-export all adapter traits at crate root.
pub use traits::{BatchProcessor, PluginAdapter, QueueAdapter, StoreAdapter};
