// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory key-value store for deterministic testing.
//!
//! `MemoryStore` implements `StoreAdapter` over a HashMap and supports
//! injecting put/delete failures to exercise the pipeline's degraded paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use burble_core::types::{AdapterType, HealthStatus};
use burble_core::{BurbleError, PluginAdapter, StoreAdapter};

/// A mock durable key-value store for testing.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make all subsequent `put` calls fail until disabled.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make all subsequent `delete` calls fail until disabled.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Whether a key is currently present.
    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    /// Snapshot of all entries, for assertions.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BurbleError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BurbleError> {
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BurbleError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), BurbleError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BurbleError::Store {
                source: "injected put failure".into(),
            });
        }
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BurbleError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BurbleError::Store {
                source: "injected delete failure".into(),
            });
        }
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
