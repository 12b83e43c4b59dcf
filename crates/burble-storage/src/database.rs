// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use burble_core::BurbleError;
use tracing::debug;

/// Handle to the single SQLite connection.
///
/// Wraps one `tokio_rusqlite::Connection`; all query modules accept
/// `&Database` and go through [`Database::connection`], so every write is
/// serialized on one background thread and SQLITE_BUSY cannot occur between
/// tasks of the same process.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, BurbleError> {
        Self::open_with_journal(path, true).await
    }

    /// Open with an explicit journal mode choice (`wal = false` uses the
    /// rollback journal; only useful on filesystems without mmap support).
    pub async fn open_with_journal(path: &str, wal: bool) -> Result<Self, BurbleError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BurbleError::Store {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| BurbleError::Store {
                source: Box::new(e),
            })?;

        let journal = if wal { "WAL" } else { "DELETE" };
        let pragmas = format!(
            "PRAGMA journal_mode = {journal};\n\
             PRAGMA synchronous = NORMAL;\n\
             PRAGMA foreign_keys = ON;\n\
             PRAGMA busy_timeout = 5000;"
        );

        conn.call(move |conn| -> Result<(), BurbleError> {
            conn.execute_batch(&pragmas).map_err(|e| BurbleError::Store {
                source: Box::new(e),
            })?;
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(|e| BurbleError::Store {
            source: Box::new(e),
        })?;

        debug!(path, journal, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection. All reads and writes go
    /// through `connection().call(..)`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), BurbleError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a tokio-rusqlite error into the store error variant.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> BurbleError {
    BurbleError::Store {
        source: Box::new(err),
    }
}
