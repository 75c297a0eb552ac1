// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use bastion_core::domain::server_config::{ConfigLocation, ConfigSet};

const SAMPLE_MAIN_CONFIG: &str = include_str!("../../templates/default.yml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to the main config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a sample main configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./conf/default.yml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    root: PathBuf,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(&root, config_override, paths).await,
        ConfigCommand::Validate { file } => validate(&root, file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

/// Loads all three documents with environment overrides applied.
pub fn load_effective(location: &ConfigLocation) -> Result<ConfigSet> {
    let mut config = ConfigSet::load(&location.conf_dir, &location.main_config_file)
        .context("Failed to load configuration")?;
    config.apply_env_overrides();
    Ok(config)
}

async fn show(root: &Path, config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let location = ConfigLocation::discover(config_override.as_deref(), root);

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag / BASTION_CONFIG_PATH: {}", path.display());
        } else {
            println!("  1. --config flag / BASTION_CONFIG_PATH: {}", "(not set)".dimmed());
        }
        println!("  2. {}", root.join("conf").join("default.yml").display());
        println!("  3. ~/.bastion/conf/default.yml");
        println!();
    }

    let config = load_effective(&location)?;

    println!(
        "{} {}",
        "Main configuration:".bold(),
        location.main_path().display().to_string().dimmed()
    );
    println!("{}", serde_yaml::to_string(&config.main)?);

    println!("{}", "Agents:".bold());
    println!("{}", serde_yaml::to_string(&config.agents)?);

    println!("{}", "Payloads:".bold());
    println!("{}", serde_yaml::to_string(&config.payloads)?);

    Ok(())
}

async fn validate(root: &Path, config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let location = ConfigLocation::discover(config_path.as_deref(), root);
    let config = load_effective(&location)?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(&output, SAMPLE_MAIN_CONFIG)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
