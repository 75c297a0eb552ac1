// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Plugin inspection commands

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bastion_core::application::plugin_manager::PluginManager;
use bastion_core::application::{Layout, Services};
use bastion_core::domain::server_config::ConfigLocation;
use bastion_core::infrastructure::ConfigStore;

use crate::builtin;
use crate::commands::config::load_effective;

#[derive(Subcommand)]
pub enum PluginsCommand {
    /// List installed and configured plugins
    List,
}

pub async fn handle_command(
    command: PluginsCommand,
    root: PathBuf,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        PluginsCommand::List => list(root, config_override).await,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginListing {
    pub name: String,
    pub installed: bool,
    pub registered: bool,
    pub active: bool,
}

/// Every installed plugin, followed by configured plugins missing from disk.
pub fn plugin_listings(manager: &PluginManager, active: &[String], registered: &[String]) -> Vec<PluginListing> {
    let mut names = manager.installed_plugins();
    for name in active {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
        .into_iter()
        .map(|name| PluginListing {
            installed: manager.check_installation(&name).is_ok(),
            registered: registered.contains(&name),
            active: active.contains(&name),
            name,
        })
        .collect()
}

async fn list(root: PathBuf, config_override: Option<PathBuf>) -> Result<()> {
    let location = ConfigLocation::discover(config_override.as_deref(), &root);
    let config = load_effective(&location)?;
    let active = config.main.plugins.clone();

    let services = Services::standard(Layout::new(&root), ConfigStore::in_memory(config));
    let hooks = builtin::hook_registry();
    let registered = hooks.modules();
    let manager = PluginManager::new(services, hooks);

    let listings = plugin_listings(&manager, &active, &registered);
    if listings.is_empty() {
        println!("{}", "No plugins installed".dimmed());
        return Ok(());
    }

    println!("{}", "Plugins:".bold());
    for listing in listings {
        let state = if !listing.installed {
            "missing hook.yml".red()
        } else if listing.active {
            "active".green()
        } else {
            "installed".normal()
        };
        let registered = if listing.registered {
            "registered".normal()
        } else {
            "no registered hook".yellow()
        };
        println!("  {:<20} {}  {}", listing.name.bold(), state, registered);
    }
    Ok(())
}
