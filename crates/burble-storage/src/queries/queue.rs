// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed-queue operations for crash-safe batch delivery.
//!
//! Entries become visible once `available_at` passes, which is how debounce
//! flush-checks are scheduled without an in-process timer. A claimed entry
//! holds a `locked_until` window; entries whose claim expired (crashed
//! worker) are silently returned to pending on the next receive, giving
//! at-least-once delivery.

use burble_core::BurbleError;
use rusqlite::params;

use crate::database::Database;
use crate::models::QueueEntry;

/// Claim window applied to received entries before they are considered
/// abandoned and redelivered.
const CLAIM_WINDOW: &str = "+5 minutes";

/// Enqueue a payload, visible after `delay_seconds`. Returns the entry id.
pub async fn send(db: &Database, payload: &str, delay_seconds: u32) -> Result<i64, BurbleError> {
    let payload = payload.to_string();
    let modifier = format!("+{delay_seconds} seconds");
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (payload, available_at)
                 VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2))",
                params![payload, modifier],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim up to `max` due entries, oldest first.
///
/// Runs in one transaction: expired claims are first returned to pending,
/// then due pending entries (`available_at` in the past) are marked
/// `processing` with a fresh claim window. Returns an empty vec when
/// nothing is due.
pub async fn receive(db: &Database, max: usize) -> Result<Vec<QueueEntry>, BurbleError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Redeliver entries whose worker died mid-claim.
            tx.execute(
                "UPDATE queue SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;

            let mut entries = {
                let mut stmt = tx.prepare(
                    "SELECT id, payload, status, attempts, max_attempts,
                            available_at, created_at, updated_at, locked_until
                     FROM queue
                     WHERE status = 'pending'
                       AND available_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     ORDER BY id ASC
                     LIMIT ?1",
                )?;
                stmt.query_map(params![max as i64], |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        payload: row.get(1)?,
                        status: row.get(2)?,
                        attempts: row.get(3)?,
                        max_attempts: row.get(4)?,
                        available_at: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                        locked_until: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?
            };

            for entry in &mut entries {
                tx.execute(
                    "UPDATE queue SET status = 'processing',
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![CLAIM_WINDOW, entry.id],
                )?;
                entry.status = "processing".to_string();
            }

            tx.commit()?;
            Ok(entries)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful handling of a claimed entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), BurbleError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return a claimed entry to the queue, redeliverable after `delay_seconds`.
///
/// Increments `attempts`. Once `attempts` reaches `max_attempts` the entry
/// is parked as `dead` instead of requeued -- the queue's dead-letter
/// terminal state for poison messages.
pub async fn retry(db: &Database, id: i64, delay_seconds: u32) -> Result<(), BurbleError> {
    let modifier = format!("+{delay_seconds} seconds");
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (i32, i32) = conn.query_row(
                "SELECT attempts, max_attempts FROM queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE queue SET status = 'dead', attempts = ?1,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![new_attempts, id],
                )?;
            } else {
                conn.execute(
                    "UPDATE queue SET status = 'pending', attempts = ?1,
                     locked_until = NULL,
                     available_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, modifier, id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return a claimed entry to the queue without counting an attempt.
///
/// Contention backoff: the entry was never handled, so it keeps its attempt
/// budget intact no matter how often the conversation's lock is busy.
pub async fn release(db: &Database, id: i64, delay_seconds: u32) -> Result<(), BurbleError> {
    let modifier = format!("+{delay_seconds} seconds");
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'pending', locked_until = NULL,
                 available_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![modifier, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Park an entry as `dead` regardless of its attempt count.
///
/// Used for payloads that cannot be decoded; keeping the row preserves the
/// evidence instead of silently dropping it.
pub async fn bury(db: &Database, id: i64) -> Result<(), BurbleError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'dead', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn status_of(db: &Database, id: i64) -> String {
        db.connection()
            .call(move |conn| -> rusqlite::Result<String> {
                let status = conn.query_row(
                    "SELECT status FROM queue WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                Ok(status)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_and_receive_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, r#"{"conversation_id":"c1","items":[]}"#, 0)
            .await
            .unwrap();
        assert!(id > 0);

        let entries = receive(&db, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].status, "processing");
        assert_eq!(entries[0].attempts, 0);

        // Claimed entry must not be delivered again.
        let again = receive(&db, 10).await.unwrap();
        assert!(again.is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delayed_entry_is_not_yet_visible() {
        let (db, _dir) = setup_db().await;

        send(&db, "payload", 120).await.unwrap();
        let entries = receive(&db, 10).await.unwrap();
        assert!(entries.is_empty(), "entry with future available_at must stay hidden");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn receive_returns_oldest_first_up_to_max() {
        let (db, _dir) = setup_db().await;

        let a = send(&db, "a", 0).await.unwrap();
        let b = send(&db, "b", 0).await.unwrap();
        let _c = send(&db, "c", 0).await.unwrap();

        let entries = receive(&db, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, a);
        assert_eq!(entries[1].id, b);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ack_marks_completed() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "payload", 0).await.unwrap();
        receive(&db, 1).await.unwrap();
        ack(&db, id).await.unwrap();

        assert_eq!(status_of(&db, id).await, "completed");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn retry_requeues_with_attempt_bump() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "payload", 0).await.unwrap();
        receive(&db, 1).await.unwrap();
        retry(&db, id, 0).await.unwrap();

        let entries = receive(&db, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn retry_with_delay_hides_entry_until_due() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "payload", 0).await.unwrap();
        receive(&db, 1).await.unwrap();
        retry(&db, id, 60).await.unwrap();

        assert_eq!(status_of(&db, id).await, "pending");
        assert!(receive(&db, 1).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn retry_dead_letters_at_max_attempts() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "payload", 0).await.unwrap();

        // Default max_attempts is 8.
        for _ in 0..8 {
            let entries = receive(&db, 1).await.unwrap();
            assert_eq!(entries.len(), 1);
            retry(&db, id, 0).await.unwrap();
        }

        assert_eq!(status_of(&db, id).await, "dead");
        assert!(receive(&db, 1).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_requeues_without_counting_an_attempt() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "payload", 0).await.unwrap();
        receive(&db, 1).await.unwrap();
        release(&db, id, 0).await.unwrap();

        let entries = receive(&db, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 0, "release must not burn the attempt budget");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_claim_is_redelivered() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "payload", 0).await.unwrap();
        receive(&db, 1).await.unwrap();

        // Simulate a crashed worker by expiring the claim window.
        db.connection()
            .call(move |conn| -> rusqlite::Result<()> {
                conn.execute(
                    "UPDATE queue SET locked_until = '2000-01-01T00:00:00.000Z' WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let entries = receive(&db, 1).await.unwrap();
        assert_eq!(entries.len(), 1, "expired claim should come back");
        assert_eq!(entries[0].id, id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bury_parks_entry_as_dead() {
        let (db, _dir) = setup_db().await;

        let id = send(&db, "not json", 0).await.unwrap();
        receive(&db, 1).await.unwrap();
        bury(&db, id).await.unwrap();

        assert_eq!(status_of(&db, id).await, "dead");
        assert!(receive(&db, 1).await.unwrap().is_empty());

        db.close().await.unwrap();
    }
}
