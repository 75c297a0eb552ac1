// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Plugin Records
//!
//! A plugin is an optional extension installed under `plugins/<name>/`. The
//! record kept in the data store is unique by name; re-storing an existing
//! plugin only updates its `enabled` flag.
//!
//! The executable side of a plugin (its hook) is resolved from the startup
//! registry in `application::plugin_manager`; this module only carries data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File every installed plugin must carry in its directory.
pub const HOOK_DESCRIPTOR: &str = "hook.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    App,
    Red,
    Blue,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    pub enabled: bool,
    pub address: Option<String>,
    pub description: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub access: AccessLevel,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            address: None,
            description: None,
            data_dir: None,
            access: AccessLevel::App,
        }
    }

    /// Pseudo-plugin standing for the core `data/` directory.
    pub fn core(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "core".to_string(),
            enabled: true,
            address: None,
            description: None,
            data_dir: Some(data_dir.into()),
            access: AccessLevel::App,
        }
    }

    /// Directory holding the plugin's installation (`<plugins_root>/<name>`).
    pub fn install_dir(&self, plugins_root: &Path) -> PathBuf {
        plugins_root.join(self.name.to_lowercase())
    }
}

/// Contents of `plugins/<name>/hook.yml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookDescriptor {
    /// Name of the registered hook factory. Defaults to the plugin name.
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Problem locating the \"{name}\" plugin at {path}. Ensure the code base was installed completely")]
    MissingInstallation { name: String, path: PathBuf },

    #[error("Error importing plugin={name}: {reason}")]
    Import { name: String, reason: String },

    #[error("Error enabling plugin={name}: {reason}")]
    Enable { name: String, reason: String },

    #[error("Error destroying plugin={name}: {reason}")]
    Destroy { name: String, reason: String },

    #[error("Error expanding plugin={name}: {reason}")]
    Expand { name: String, reason: String },
}

impl PluginError {
    /// Only a broken installation stops the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PluginError::MissingInstallation { .. })
    }
}
