// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Burble bot pipeline.

use thiserror::Error;

/// The primary error type used across all Burble adapter traits and pipeline operations.
#[derive(Debug, Error)]
pub enum BurbleError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Key-value store errors (connection, query failure, missing backend).
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Delayed-queue errors (send failure, receive failure, bad entry state).
    #[error("queue error: {message}")]
    Queue {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Batch processor errors (the processing callback failed).
    #[error("processing error: {message}")]
    Process {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON encode/decode errors for persisted buffer, lock, or batch records.
    #[error("codec error: {source}")]
    Codec {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Adapter health check failed.
    #[error("health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BurbleError {
    fn from(err: serde_json::Error) -> Self {
        BurbleError::Codec {
            source: Box::new(err),
        }
    }
}
