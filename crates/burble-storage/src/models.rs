// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities.

/// One row of the delayed queue.
///
/// `status` moves pending -> processing -> completed on the happy path;
/// `retry` returns entries to pending with a future `available_at`, and
/// entries that exhaust `max_attempts` are parked as `dead` (dead-letter)
/// for inspection rather than deleted.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub available_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}
