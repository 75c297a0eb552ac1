// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Ability File Loader
//!
//! Parses ability definition files and replaces the matching abilities in the
//! data store. A file holds a YAML list of abilities:
//!
//! ```yaml
//! - id: 9a30740d
//!   name: Find user
//!   description: Identify the current user
//!   tactic: discovery
//!   technique: { attack_id: T1033, name: System Owner/User Discovery }
//!   platforms:
//!     linux:
//!       sh,bash:
//!         command: whoami
//!         variations:
//!           - { description: numeric id, command: id -u }
//! ```
//!
//! Loading is a full replace keyed by ability id, so reloading an unchanged
//! file is idempotent.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::ability::{Ability, Executor, Technique, Variation};
use crate::domain::plugin::AccessLevel;
use crate::domain::repository::{DataStore, StoreError};

#[derive(Debug, Deserialize)]
struct AbilityDocument {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tactic: String,
    #[serde(default)]
    technique: Option<Technique>,
    #[serde(default)]
    platforms: BTreeMap<String, BTreeMap<String, ExecutorDocument>>,
}

#[derive(Debug, Deserialize)]
struct ExecutorDocument {
    #[serde(default)]
    command: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    variations: Vec<Variation>,
}

fn default_timeout() -> u64 {
    60
}

#[derive(Debug, Error)]
pub enum AbilityLoadError {
    #[error("failed to read ability file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ability file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AbilityLoader {
    store: Arc<dyn DataStore>,
}

impl AbilityLoader {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Parse one file and store every ability in it, tagged with `access`
    /// and the owning plugin.
    pub async fn load_ability_file(
        &self,
        path: &Path,
        access: AccessLevel,
        plugin: Option<&str>,
    ) -> Result<Vec<Ability>, AbilityLoadError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AbilityLoadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let abilities = parse_abilities(&content, path, access, plugin)?;

        let mut stored = Vec::with_capacity(abilities.len());
        for ability in abilities {
            debug!("Storing ability {} from {:?}", ability.ability_id, path);
            stored.push(self.store.store_ability(ability).await?);
        }
        Ok(stored)
    }

    /// Load every `.yml`/`.yaml` file below `dir`. Bad files are logged and
    /// skipped; the count of stored abilities is returned.
    pub async fn load_directory(&self, dir: &Path, access: AccessLevel, plugin: Option<&str>) -> usize {
        let mut loaded = 0;
        for path in ability_files(dir) {
            match self.load_ability_file(&path, access, plugin).await {
                Ok(abilities) => loaded += abilities.len(),
                Err(e) => warn!("Skipping ability file: {}", e),
            }
        }
        loaded
    }
}

/// Every YAML file below `dir`, in walk order. A missing directory yields nothing.
pub fn ability_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect()
}

fn parse_abilities(
    content: &str,
    path: &Path,
    access: AccessLevel,
    plugin: Option<&str>,
) -> Result<Vec<Ability>, AbilityLoadError> {
    let documents: Vec<AbilityDocument> =
        serde_yaml::from_str(content).map_err(|source| AbilityLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(documents
        .into_iter()
        .map(|doc| {
            let mut executors = Vec::new();
            for (platform, by_executor) in doc.platforms {
                for (names, spec) in by_executor {
                    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                        executors.push(Executor {
                            name: name.to_string(),
                            platform: platform.clone(),
                            command: spec.command.trim().to_string(),
                            timeout: spec.timeout,
                            variations: spec.variations.clone(),
                        });
                    }
                }
            }
            Ability {
                ability_id: doc.id,
                name: doc.name,
                description: doc.description,
                tactic: doc.tactic,
                technique: doc.technique,
                executors,
                access,
                plugin: plugin.map(String::from),
                source: Some(path.to_path_buf()),
            }
        })
        .collect())
}
