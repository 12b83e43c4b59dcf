// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `burble doctor` command implementation.
//!
//! Runs diagnostic checks against the Burble environment to identify
//! configuration issues, database problems, and queue backlog.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use burble_config::model::BurbleConfig;
use burble_core::BurbleError;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed successfully.
    Pass,
    /// Check passed with a warning.
    Warn,
    /// Check failed.
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Check status.
    pub status: CheckStatus,
    /// Human-readable message.
    pub message: String,
    /// Duration the check took.
    pub duration: Duration,
}

/// Run the `burble doctor` command.
///
/// Runs quick diagnostic checks. With `--deep`, runs additional intensive
/// checks. With `--plain`, disables colored output.
pub async fn run_doctor(
    config: &BurbleConfig,
    deep: bool,
    plain: bool,
) -> Result<(), BurbleError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let mut results = Vec::new();

    // Quick checks (always run)
    results.push(check_config().await);
    results.push(check_database(&config.storage.database_path).await);
    results.push(check_queue(&config.storage.database_path).await);

    // Deep checks (only with --deep)
    if deep {
        results.push(check_db_integrity(&config.storage.database_path).await);
    }

    // Print results
    println!();
    println!("  burble doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;

    for result in &results {
        let duration_ms = result.duration.as_millis();
        let line;

        match result.status {
            CheckStatus::Pass => {
                if use_color {
                    use colored::Colorize;
                    let symbol = "✓".green().to_string();
                    line = format!(
                        "    {symbol} {:<16} {} ({duration_ms}ms)",
                        result.name, result.message
                    );
                } else {
                    line = format!(
                        "    [OK]   {:<16} {} ({duration_ms}ms)",
                        result.name, result.message
                    );
                }
            }
            CheckStatus::Warn => {
                warn_count += 1;
                if use_color {
                    use colored::Colorize;
                    let symbol = "!".yellow().to_string();
                    line = format!(
                        "    {symbol} {:<16} {} ({duration_ms}ms)",
                        result.name,
                        result.message.yellow()
                    );
                } else {
                    line = format!(
                        "    [WARN] {:<16} {} ({duration_ms}ms)",
                        result.name, result.message
                    );
                }
            }
            CheckStatus::Fail => {
                fail_count += 1;
                if use_color {
                    use colored::Colorize;
                    let symbol = "✗".red().to_string();
                    line = format!(
                        "    {symbol} {:<16} {} ({duration_ms}ms)",
                        result.name,
                        result.message.red()
                    );
                } else {
                    line = format!(
                        "    [FAIL] {:<16} {} ({duration_ms}ms)",
                        result.name, result.message
                    );
                }
            }
        }

        println!("{line}");
    }

    println!();

    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
        if !deep {
            println!("  Run with --deep for detailed diagnostics.");
        }
    } else {
        println!("  All checks passed.");
    }

    println!();

    Ok(())
}

/// Check configuration loads without errors.
async fn check_config() -> CheckResult {
    let start = Instant::now();
    match burble_config::load_and_validate() {
        Ok(_) => CheckResult {
            name: "Configuration".to_string(),
            status: CheckStatus::Pass,
            message: "valid".to_string(),
            duration: start.elapsed(),
        },
        Err(errors) => CheckResult {
            name: "Configuration".to_string(),
            status: CheckStatus::Fail,
            message: format!("{} error(s)", errors.len()),
            duration: start.elapsed(),
        },
    }
}

/// Check database file exists and can be opened.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();
    let path = std::path::Path::new(db_path);

    if !path.exists() {
        return CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Warn,
            message: format!("not found: {db_path} (will be created on first run)"),
            duration: start.elapsed(),
        };
    }

    match rusqlite::Connection::open(db_path) {
        Ok(conn) => match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => CheckResult {
                name: "Database".to_string(),
                status: CheckStatus::Pass,
                message: "opens and responds".to_string(),
                duration: start.elapsed(),
            },
            Err(e) => CheckResult {
                name: "Database".to_string(),
                status: CheckStatus::Fail,
                message: format!("query failed: {e}"),
                duration: start.elapsed(),
            },
        },
        Err(e) => CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Fail,
            message: format!("cannot open: {e}"),
            duration: start.elapsed(),
        },
    }
}

/// Check queue backlog and dead-letter count.
async fn check_queue(db_path: &str) -> CheckResult {
    let start = Instant::now();

    if !std::path::Path::new(db_path).exists() {
        return CheckResult {
            name: "Queue".to_string(),
            status: CheckStatus::Warn,
            message: "database not found".to_string(),
            duration: start.elapsed(),
        };
    }

    let counts = rusqlite::Connection::open(db_path).and_then(|conn| {
        conn.query_row(
            "SELECT
                 COUNT(*) FILTER (WHERE status IN ('pending', 'processing')),
                 COUNT(*) FILTER (WHERE status = 'dead')
             FROM queue",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
    });

    match counts {
        Ok((backlog, dead)) if dead > 0 => CheckResult {
            name: "Queue".to_string(),
            status: CheckStatus::Warn,
            message: format!("{backlog} in flight, {dead} dead-lettered"),
            duration: start.elapsed(),
        },
        Ok((backlog, _)) => CheckResult {
            name: "Queue".to_string(),
            status: CheckStatus::Pass,
            message: format!("{backlog} in flight"),
            duration: start.elapsed(),
        },
        Err(e) => CheckResult {
            name: "Queue".to_string(),
            status: CheckStatus::Fail,
            message: format!("cannot inspect: {e}"),
            duration: start.elapsed(),
        },
    }
}

/// Deep check: run SQLite's integrity check.
async fn check_db_integrity(db_path: &str) -> CheckResult {
    let start = Instant::now();

    if !std::path::Path::new(db_path).exists() {
        return CheckResult {
            name: "Integrity".to_string(),
            status: CheckStatus::Warn,
            message: "database not found".to_string(),
            duration: start.elapsed(),
        };
    }

    let verdict = rusqlite::Connection::open(db_path).and_then(|conn| {
        conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
    });

    match verdict {
        Ok(v) if v == "ok" => CheckResult {
            name: "Integrity".to_string(),
            status: CheckStatus::Pass,
            message: "ok".to_string(),
            duration: start.elapsed(),
        },
        Ok(v) => CheckResult {
            name: "Integrity".to_string(),
            status: CheckStatus::Fail,
            message: v,
            duration: start.elapsed(),
        },
        Err(e) => CheckResult {
            name: "Integrity".to_string(),
            status: CheckStatus::Fail,
            message: format!("check failed: {e}"),
            duration: start.elapsed(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_database_warns_instead_of_failing() {
        let result = check_database("/nonexistent/burble.db").await;
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn missing_queue_database_warns() {
        let result = check_queue("/nonexistent/burble.db").await;
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn config_check_passes_with_defaults() {
        let result = check_config().await;
        assert_eq!(result.status, CheckStatus::Pass);
    }
}
