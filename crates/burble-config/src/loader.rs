// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./burble.toml` > `~/.config/burble/burble.toml` > `/etc/burble/burble.toml`
//! with environment variable overrides via `BURBLE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BurbleConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/burble/burble.toml` (system-wide)
/// 3. `~/.config/burble/burble.toml` (user XDG config)
/// 4. `./burble.toml` (local directory)
/// 5. `BURBLE_*` environment variables
pub fn load_config() -> Result<BurbleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BurbleConfig::default()))
        .merge(Toml::file("/etc/burble/burble.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("burble/burble.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("burble.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<BurbleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BurbleConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BurbleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BurbleConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `BURBLE_BUFFER_BATCH_LIMIT`
/// must map to `buffer.batch_limit`, not `buffer.batch.limit`.
fn env_provider() -> Env {
    Env::prefixed("BURBLE_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: BURBLE_BUFFER_DEBOUNCE_TIMEOUT_MS -> "buffer_debounce_timeout_ms"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("buffer_", "buffer.", 1)
            .replacen("consumer_", "consumer.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}
