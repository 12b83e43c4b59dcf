// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Burble backend boundaries.
//!
//! Store and queue adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility. The processing
//! callback is a plain trait: it is an external collaborator, not a managed
//! backend.

pub mod adapter;
pub mod processor;
pub mod queue;
pub mod store;

// Re-export all traits at the traits module level for convenience.
pub use adapter::PluginAdapter;
pub use processor::BatchProcessor;
pub use queue::QueueAdapter;
pub use store::StoreAdapter;
