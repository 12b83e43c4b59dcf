// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths, non-zero limits, and the relative
//! ordering of the retry delays.

use crate::diagnostic::ConfigError;
use crate::model::BurbleConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BurbleConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate database_path is not empty
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Validate batch_limit: zero would flush every append before buffering
    if config.buffer.batch_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "buffer.batch_limit must be at least 1".to_string(),
        });
    }

    // Validate debounce window is meaningful
    if config.buffer.debounce_timeout_ms < 100 {
        errors.push(ConfigError::Validation {
            message: format!(
                "buffer.debounce_timeout_ms must be at least 100, got {}",
                config.buffer.debounce_timeout_ms
            ),
        });
    }

    // Validate retry delays: contention backoff must not exceed the error
    // backoff, and neither may be zero (a zero delay busy-loops redelivery).
    if config.consumer.contention_retry_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "consumer.contention_retry_secs must be at least 1".to_string(),
        });
    }

    if config.consumer.error_retry_secs < config.consumer.contention_retry_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "consumer.error_retry_secs ({}) must not be less than consumer.contention_retry_secs ({})",
                config.consumer.error_retry_secs, config.consumer.contention_retry_secs
            ),
        });
    }

    // Validate lock staleness threshold
    if config.consumer.lock_staleness_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "consumer.lock_staleness_secs must be at least 1".to_string(),
        });
    }

    // Validate pump settings
    if config.consumer.receive_batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "consumer.receive_batch_size must be at least 1".to_string(),
        });
    }

    if config.consumer.poll_interval_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "consumer.poll_interval_ms must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
