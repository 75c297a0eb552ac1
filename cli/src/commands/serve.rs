// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `bastion serve`: boot, run until a termination signal, tear down.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, warn};

use bastion_core::application::{ControlPlane, Layout, Services};
use bastion_core::domain::plugin::PluginError;
use bastion_core::domain::server_config::ConfigLocation;
use bastion_core::infrastructure::ConfigStore;

use crate::builtin;

pub async fn run(
    root: PathBuf,
    config_override: Option<PathBuf>,
    main_config: Option<String>,
) -> Result<()> {
    let mut location = ConfigLocation::discover(config_override.as_deref(), &root);
    if let Some(name) = main_config {
        location.main_config_file = name;
    }
    info!("Using configuration {}", location.main_path().display());

    let config = ConfigStore::load(&location.conf_dir, &location.main_config_file)
        .context("Failed to load configuration")?;
    let services = Services::standard(Layout::new(&root), config);
    let plane = ControlPlane::new(
        services,
        builtin::hook_registry(),
        builtin::contact_registry(),
    );

    let report = match plane.boot().await {
        Ok(report) => report,
        Err(e) => {
            if let Some(plugin_error) = e.downcast_ref::<PluginError>() {
                if plugin_error.is_fatal() {
                    eprintln!("{}", format!("✗ {}", plugin_error).red());
                    std::process::exit(1);
                }
            }
            return Err(e.context("Boot failed"));
        }
    };

    println!(
        "{}",
        format!(
            "✓ Bastion is ready: {} plugins loaded ({} enabled), {} contacts, {} abilities",
            report.plugins.loaded.len(),
            report.plugins.enabled.len(),
            report.contacts.registered(),
            report.abilities_loaded
        )
        .green()
    );
    for skipped in &report.plugins.skipped {
        println!("  {} {}: {}", "skipped".yellow(), skipped.name, skipped.reason);
    }
    for name in &report.requirements.unmet_mandatory {
        println!("  {} requirement {} is not met", "error".red(), name);
    }
    for name in &report.requirements.unmet_optional {
        println!("  {} optional requirement {} is not met", "warning".yellow(), name);
    }

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");

    let summary = plane.shutdown(&location.main_config_file).await;
    if summary.is_clean() {
        println!(
            "{}",
            format!("✓ State saved, {} reports written", summary.reports_written).green()
        );
    } else {
        for (step, error) in &summary.step_failures {
            warn!("Shutdown step {} failed: {}", step, error);
        }
        println!(
            "{}",
            format!(
                "State saved with {} failed steps and {} failed reports",
                summary.step_failures.len(),
                summary.report_failures.len()
            )
            .yellow()
        );
    }
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    Ok(())
}
