// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for Bastion CLI

pub mod config;
pub mod plugins;
pub mod serve;

pub use self::config::ConfigCommand;
pub use self::plugins::PluginsCommand;
