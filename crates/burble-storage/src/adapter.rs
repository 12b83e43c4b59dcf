// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store and queue adapter traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use burble_config::model::StorageConfig;
use burble_core::types::{Delivery, QueuedBatch};
use burble_core::{
    AdapterType, BurbleError, HealthStatus, PluginAdapter, QueueAdapter, StoreAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed adapter serving both pipeline boundaries: the durable
/// key-value store (buffers, locks) and the delayed queue (batches,
/// flush-checks) share one database file and one writer thread.
///
/// The database is lazily opened on the first call to [`SqliteStorage::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: SqliteStorage::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database, apply PRAGMAs, and run migrations.
    pub async fn initialize(&self) -> Result<(), BurbleError> {
        let db = Database::open_with_journal(&self.config.database_path, self.config.wal_mode)
            .await?;
        self.db.set(db).map_err(|_| BurbleError::Store {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    /// Checkpoint and release the database.
    pub async fn close(&self) -> Result<(), BurbleError> {
        self.db()?.close().await
    }

    /// Number of entries currently waiting or claimed on the queue.
    /// Used by diagnostics, not by the pipeline itself.
    pub async fn queue_depth(&self) -> Result<i64, BurbleError> {
        self.db()?
            .connection()
            .call(|conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM queue WHERE status IN ('pending', 'processing')",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(crate::database::map_tr_err)
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, BurbleError> {
        self.db.get().ok_or_else(|| BurbleError::Store {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BurbleError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BurbleError> {
        // Shutdown delegates to close if the DB was initialized.
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, BurbleError> {
        queries::kv::get(self.db()?, key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), BurbleError> {
        queries::kv::put(self.db()?, key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), BurbleError> {
        queries::kv::delete(self.db()?, key).await
    }
}

#[async_trait]
impl QueueAdapter for SqliteStorage {
    async fn send(&self, batch: &QueuedBatch, delay_seconds: u32) -> Result<(), BurbleError> {
        let payload = serde_json::to_string(batch)?;
        queries::queue::send(self.db()?, &payload, delay_seconds).await?;
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, BurbleError> {
        let db = self.db()?;
        let entries = queries::queue::receive(db, max).await?;

        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_str::<QueuedBatch>(&entry.payload) {
                Ok(batch) => deliveries.push(Delivery {
                    id: entry.id,
                    batch,
                    attempts: entry.attempts,
                }),
                Err(e) => {
                    // A payload we cannot decode would be redelivered forever;
                    // park it instead of dropping it.
                    warn!(id = entry.id, error = %e, "undecodable queue payload, burying entry");
                    queries::queue::bury(db, entry.id).await?;
                }
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, id: i64) -> Result<(), BurbleError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn retry(&self, id: i64, delay_seconds: u32) -> Result<(), BurbleError> {
        queries::queue::retry(self.db()?, id, delay_seconds).await
    }

    async fn release(&self, id: i64, delay_seconds: u32) -> Result<(), BurbleError> {
        queries::queue::release(self.db()?, id, delay_seconds).await
    }
}
