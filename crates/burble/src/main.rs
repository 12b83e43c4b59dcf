// SPDX-FileCopyrightText: 2026 Burble Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Burble - a conversational bot core with debounced buffering and ordered
//! batch delivery.
//!
//! This is the binary entry point for the Burble worker.

use clap::{Parser, Subcommand};

mod doctor;
mod serve;

/// Burble - a conversational bot core.
#[derive(Parser, Debug)]
#[command(name = "burble", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Burble worker (queue pump + line-based local ingest).
    Serve,
    /// Run diagnostic checks against the Burble environment.
    Doctor {
        /// Run additional intensive checks.
        #[arg(long)]
        deep: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match burble_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            burble_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Doctor { deep, plain }) => doctor::run_doctor(&config, deep, plain).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(burble_core::BurbleError::Internal(e.to_string())),
            }
        }
        None => {
            println!("burble: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
