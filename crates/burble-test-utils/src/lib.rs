// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Burble integration tests.
//!
//! Provides mock adapters for fast, deterministic, CI-runnable tests
//! without external services.
//!
//! # Components
//!
//! - [`MemoryStore`] - In-memory key-value store with failure injection
//! - [`MockQueue`] - Recording delayed queue with manual delivery control
//! - [`RecordingProcessor`] - Batch processor with fail/hold test hooks

pub mod mock_processor;
pub mod mock_queue;
pub mod mock_store;

pub use mock_processor::{ProcessedBatch, RecordingProcessor};
pub use mock_queue::{MockQueue, SentMessage};
pub use mock_store::MemoryStore;
