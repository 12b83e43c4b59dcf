// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Burble bot pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Burble configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BurbleConfig {
    /// Bot identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Message buffering and debounce settings.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Queue consumer and lock coordination settings.
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Bot identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the bot.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "burble".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Message buffering and debounce configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Quiet period after the last message before a buffer becomes eligible
    /// for a time-based flush, in milliseconds.
    #[serde(default = "default_debounce_timeout_ms")]
    pub debounce_timeout_ms: u64,

    /// Buffer length that triggers an immediate flush.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            debounce_timeout_ms: default_debounce_timeout_ms(),
            batch_limit: default_batch_limit(),
        }
    }
}

fn default_debounce_timeout_ms() -> u64 {
    10_000
}

fn default_batch_limit() -> usize {
    5
}

/// Queue consumer and lock coordination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    /// Age beyond which a processing lock is presumed abandoned by a
    /// crashed worker and may be reclaimed, in seconds.
    #[serde(default = "default_lock_staleness_secs")]
    pub lock_staleness_secs: u64,

    /// Redelivery delay when a conversation is locked by another worker,
    /// in seconds. Must not exceed `error_retry_secs`.
    #[serde(default = "default_contention_retry_secs")]
    pub contention_retry_secs: u32,

    /// Redelivery delay after a processing failure, in seconds.
    #[serde(default = "default_error_retry_secs")]
    pub error_retry_secs: u32,

    /// How often the queue pump polls for due deliveries, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum deliveries claimed per poll.
    #[serde(default = "default_receive_batch_size")]
    pub receive_batch_size: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            lock_staleness_secs: default_lock_staleness_secs(),
            contention_retry_secs: default_contention_retry_secs(),
            error_retry_secs: default_error_retry_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            receive_batch_size: default_receive_batch_size(),
        }
    }
}

fn default_lock_staleness_secs() -> u64 {
    300 // 5 minutes
}

fn default_contention_retry_secs() -> u32 {
    3
}

fn default_error_retry_secs() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_receive_batch_size() -> usize {
    16
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("burble").join("burble.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("burble.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}
