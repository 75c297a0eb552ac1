// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the three configuration domains the control plane reads at runtime
// and rewrites on shutdown:
// - main:     active plugins, refresh intervals, report location, requirements
// - agents:   trust and beacon timing for remote agents
// - payloads: opaque payload settings owned by plugins
//
// Keys the core does not interpret are preserved verbatim so a save/load cycle
// never drops settings written by plugins or operators.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ExtraKeys = BTreeMap<String, serde_yaml::Value>;

/// Which configuration document a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigDomain {
    Main,
    Agents,
    Payloads,
}

impl ConfigDomain {
    pub const ALL: [ConfigDomain; 3] = [ConfigDomain::Main, ConfigDomain::Agents, ConfigDomain::Payloads];

    /// File stem under `conf/`. The main document's stem is chosen at startup.
    pub fn file_stem<'a>(&self, main_config_file: &'a str) -> &'a str {
        match self {
            ConfigDomain::Main => main_config_file,
            ConfigDomain::Agents => "agents",
            ConfigDomain::Payloads => "payloads",
        }
    }
}

/// Main configuration document (`conf/<main>.yml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainConfig {
    /// Plugins enabled at boot
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Seconds between ability file scans; also the "recently modified" window
    #[serde(default = "default_ability_refresh")]
    pub ability_refresh: u64,

    /// Root directory for shutdown reports
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// External requirements checked at boot
    #[serde(default)]
    pub requirements: BTreeMap<String, RequirementSpec>,

    /// Every other key, preserved as written
    #[serde(flatten)]
    pub extra: ExtraKeys,
}

/// Agent timing document (`conf/agents.yml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Seconds of silence (on top of an agent's sleep_max) before trust is revoked
    #[serde(default = "default_untrusted_timer")]
    pub untrusted_timer: u64,

    #[serde(default = "default_sleep_min")]
    pub sleep_min: u64,

    #[serde(default = "default_sleep_max")]
    pub sleep_max: u64,

    #[serde(default)]
    pub watchdog: u64,

    #[serde(flatten)]
    pub extra: ExtraKeys,
}

/// Payload document (`conf/payloads.yml`), owned by plugins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadsConfig {
    #[serde(flatten)]
    pub entries: ExtraKeys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSpec {
    /// Minimum acceptable version (e.g. "1.19" or "3.8.0")
    #[serde(deserialize_with = "version_string")]
    pub version: String,

    /// Absence is tolerated when true
    #[serde(default)]
    pub optional: bool,

    /// Why the requirement exists, appended to optional warnings
    #[serde(default)]
    pub reason: String,

    /// Command whose output carries the installed version (e.g. "go version")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// YAML readers often write `version: 1.19` unquoted; accept numbers too.
fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a version string, found {:?}",
            other
        ))),
    }
}

/// All three configuration domains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSet {
    pub main: MainConfig,
    pub agents: AgentsConfig,
    pub payloads: PayloadsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_ability_refresh() -> u64 {
    60
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_untrusted_timer() -> u64 {
    90
}

fn default_sleep_min() -> u64 {
    30
}

fn default_sleep_max() -> u64 {
    60
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            ability_refresh: default_ability_refresh(),
            reports_dir: default_reports_dir(),
            requirements: BTreeMap::new(),
            extra: ExtraKeys::new(),
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            untrusted_timer: default_untrusted_timer(),
            sleep_min: default_sleep_min(),
            sleep_max: default_sleep_max(),
            watchdog: 0,
            extra: ExtraKeys::new(),
        }
    }
}

impl MainConfig {
    /// Keys under the `app.` namespace, as exposed to agents.
    pub fn app_keys(&self) -> BTreeMap<String, serde_yaml::Value> {
        self.extra
            .iter()
            .filter(|(k, _)| k.starts_with("app."))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_plugin_active(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p == name)
    }
}

impl AgentsConfig {
    /// Every agent setting as a flat map, typed fields included.
    pub fn as_map(&self) -> BTreeMap<String, serde_yaml::Value> {
        let mut map = self.extra.clone();
        map.insert("untrusted_timer".to_string(), self.untrusted_timer.into());
        map.insert("sleep_min".to_string(), self.sleep_min.into());
        map.insert("sleep_max".to_string(), self.sleep_max.into());
        map.insert("watchdog".to_string(), self.watchdog.into());
        map
    }
}

impl ConfigSet {
    /// Load all three documents from `conf_dir`. Missing files fall back to
    /// defaults; unreadable or malformed files are errors.
    pub fn load(conf_dir: &Path, main_config_file: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            main: read_yaml_or_default(&conf_path(conf_dir, main_config_file))?,
            agents: read_yaml_or_default(&conf_path(conf_dir, "agents"))?,
            payloads: read_yaml_or_default(&conf_path(conf_dir, "payloads"))?,
        })
    }

    /// Rewrite all three documents wholesale.
    pub fn save(&self, conf_dir: &Path, main_config_file: &str) -> Result<(), ConfigError> {
        std::fs::create_dir_all(conf_dir).map_err(|source| ConfigError::Write {
            path: conf_dir.to_path_buf(),
            source,
        })?;
        for domain in ConfigDomain::ALL {
            let path = conf_path(conf_dir, domain.file_stem(main_config_file));
            let yaml = match domain {
                ConfigDomain::Main => serde_yaml::to_string(&self.main)?,
                ConfigDomain::Agents => serde_yaml::to_string(&self.agents)?,
                ConfigDomain::Payloads => serde_yaml::to_string(&self.payloads)?,
            };
            std::fs::write(&path, yaml).map_err(|source| ConfigError::Write { path, source })?;
        }
        Ok(())
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BASTION_PLUGINS") {
            tracing::info!("Environment override: BASTION_PLUGINS={}", val);
            self.main.plugins = val
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(val) = std::env::var("BASTION_REPORTS_DIR") {
            tracing::info!("Environment override: BASTION_REPORTS_DIR={}", val);
            self.main.reports_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("BASTION_UNTRUSTED_TIMER") {
            match val.parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Environment override: BASTION_UNTRUSTED_TIMER={}", secs);
                    self.agents.untrusted_timer = secs;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for BASTION_UNTRUSTED_TIMER: '{}'. Expected seconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.untrusted_timer == 0 {
            return Err(ConfigError::Invalid(
                "agents.untrusted_timer must be greater than zero".to_string(),
            ));
        }

        if self.main.ability_refresh == 0 {
            return Err(ConfigError::Invalid(
                "ability_refresh must be greater than zero".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for plugin in &self.main.plugins {
            if !seen.insert(plugin.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}' is listed more than once",
                    plugin
                )));
            }
        }

        for (name, requirement) in &self.main.requirements {
            if requirement.version.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "requirement '{}' has an empty version",
                    name
                )));
            }
        }

        Ok(())
    }
}

pub fn conf_path(conf_dir: &Path, stem: &str) -> PathBuf {
    conf_dir.join(format!("{}.yml", stem))
}

/// Directory and file stem of the main configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub conf_dir: PathBuf,
    pub main_config_file: String,
}

impl ConfigLocation {
    pub fn new(conf_dir: impl Into<PathBuf>, main_config_file: impl Into<String>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            main_config_file: main_config_file.into(),
        }
    }

    /// `conf/local.yml` becomes (`conf`, `local`).
    pub fn from_main_file(path: &Path) -> Self {
        let conf_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let main_config_file = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string();
        Self::new(conf_dir, main_config_file)
    }

    pub fn main_path(&self) -> PathBuf {
        conf_path(&self.conf_dir, &self.main_config_file)
    }

    /// Discover configuration using precedence order
    /// 1. Explicit path (`--config` flag or BASTION_CONFIG_PATH)
    /// 2. <root>/conf/default.yml
    /// 3. ~/.bastion/conf/default.yml (user home)
    ///
    /// Falls back to `<root>/conf` with the `default` document, which is
    /// created on the first save.
    pub fn discover(explicit: Option<&Path>, root: &Path) -> Self {
        if let Some(path) = explicit {
            return Self::from_main_file(path);
        }

        let local = root.join("conf");
        if conf_path(&local, "default").exists() {
            return Self::new(local, "default");
        }

        if let Some(home) = dirs::home_dir() {
            let user_conf = home.join(".bastion").join("conf");
            if conf_path(&user_conf, "default").exists() {
                return Self::new(user_conf, "default");
            }
        }

        Self::new(local, "default")
    }
}

fn read_yaml_or_default<T>(path: &Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        tracing::warn!("Configuration file {:?} not found. Using defaults.", path);
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
