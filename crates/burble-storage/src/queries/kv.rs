// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value operations backing conversation buffers and processing locks.
//!
//! The pipeline treats this as a plain KV surface: get/put/delete, values
//! are JSON strings, no transactions across keys.

use burble_core::BurbleError;
use rusqlite::params;

use crate::database::Database;

/// Read the value stored at `key`, or `None` if absent.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, BurbleError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT value FROM kv_entries WHERE key = ?1")?;
            match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write `value` at `key`, replacing any existing value (last writer wins).
pub async fn put(db: &Database, key: &str, value: &str) -> Result<(), BurbleError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove `key`. Deleting an absent key succeeds silently.
pub async fn delete(db: &Database, key: &str) -> Result<(), BurbleError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
