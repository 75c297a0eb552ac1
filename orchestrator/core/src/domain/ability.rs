// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Capability definitions: an ability has one or more platform-specific
//! executors, each with optional alternate command renderings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::plugin::AccessLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub description: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executor {
    pub name: String,
    pub platform: String,
    pub command: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

fn default_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    pub attack_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    pub ability_id: String,
    pub name: String,
    pub description: String,
    pub tactic: String,
    pub technique: Option<Technique>,
    pub executors: Vec<Executor>,
    pub access: AccessLevel,
    /// Plugin that contributed the ability, `None` for core data.
    pub plugin: Option<String>,
    /// File the definition was loaded from.
    pub source: Option<PathBuf>,
}

impl Ability {
    pub fn executor_for(&self, platform: &str, executor: &str) -> Option<&Executor> {
        self.executors
            .iter()
            .find(|e| e.platform == platform && e.name == executor)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AbilityQuery {
    pub ability_id: Option<String>,
    pub plugin: Option<String>,
    pub access: Option<AccessLevel>,
}

impl AbilityQuery {
    pub fn by_id(ability_id: impl Into<String>) -> Self {
        Self {
            ability_id: Some(ability_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, ability: &Ability) -> bool {
        self.ability_id.as_ref().map_or(true, |id| &ability.ability_id == id)
            && self.plugin.as_ref().map_or(true, |p| ability.plugin.as_ref() == Some(p))
            && self.access.map_or(true, |a| ability.access == a)
    }
}
