// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable key-value store adapter trait.

use async_trait::async_trait;

use crate::error::BurbleError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for the durable key-value store backing buffers and locks.
///
/// The contract is deliberately minimal: get/put/delete by key, values are
/// JSON strings, no transactions and no conditional writes. The pipeline is
/// designed around that surface -- buffer updates are last-writer-wins and
/// the processing lock is acquired with an unconditional put -- so any plain
/// KV backend qualifies.
#[async_trait]
pub trait StoreAdapter: PluginAdapter {
    /// Reads the value at `key`, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, BurbleError>;

    /// Writes `value` at `key`, replacing any existing value.
    async fn put(&self, key: &str, value: &str) -> Result<(), BurbleError>;

    /// Removes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BurbleError>;
}
