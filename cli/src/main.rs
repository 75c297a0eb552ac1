// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Bastion Server CLI
//!
//! The `bastion` binary boots the control plane, keeps it running until
//! interrupted, and persists all state on the way out.
//!
//! ## Commands
//!
//! - `bastion serve` - Boot, run until Ctrl+C/SIGTERM, then tear down
//! - `bastion config show|validate|generate` - Configuration management
//! - `bastion plugins list` - Inspect installed plugins

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use bastion::commands::{self, ConfigCommand, PluginsCommand};

/// Bastion - agent orchestration control plane
#[derive(Parser)]
#[command(name = "bastion")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Installation root holding conf/, data/, plugins/ and templates/
    #[arg(long, global = true, env = "BASTION_ROOT", default_value = ".")]
    root: PathBuf,

    /// Path to the main configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "BASTION_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "BASTION_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the control plane and run until interrupted
    #[command(name = "serve")]
    Serve {
        /// Name of the main config document under conf/ (without .yml)
        #[arg(long, value_name = "NAME")]
        main_config: Option<String>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Plugin inspection
    #[command(name = "plugins")]
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Serve { main_config }) => {
            commands::serve::run(cli.root, cli.config, main_config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.root, cli.config).await
        }
        Some(Commands::Plugins { command }) => {
            commands::plugins::handle_command(command, cli.root, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
