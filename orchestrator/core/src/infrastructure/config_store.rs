// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Hot-reloadable holder of the three configuration domains.
//!
//! Readers always get a fresh snapshot, so a loop that re-reads configuration
//! every cycle observes changes made through `update_*` or `reload` without a
//! restart.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::domain::server_config::{
    AgentsConfig, ConfigError, ConfigSet, MainConfig, PayloadsConfig,
};

#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<RwLock<ConfigSet>>,
    conf_dir: PathBuf,
    main_config_file: String,
}

impl ConfigStore {
    pub fn new(config: ConfigSet, conf_dir: impl Into<PathBuf>, main_config_file: impl Into<String>) -> Self {
        Self {
            current: Arc::new(RwLock::new(config)),
            conf_dir: conf_dir.into(),
            main_config_file: main_config_file.into(),
        }
    }

    /// Store that is never read from or written to disk.
    pub fn in_memory(config: ConfigSet) -> Self {
        Self::new(config, PathBuf::new(), "default")
    }

    /// Load all three documents from `conf_dir` and apply env overrides.
    pub fn load(conf_dir: impl Into<PathBuf>, main_config_file: impl Into<String>) -> Result<Self, ConfigError> {
        let conf_dir = conf_dir.into();
        let main_config_file = main_config_file.into();
        let mut config = ConfigSet::load(&conf_dir, &main_config_file)?;
        config.apply_env_overrides();
        config.validate()?;
        info!("Loaded configuration from {:?} (main={})", conf_dir, main_config_file);
        Ok(Self::new(config, conf_dir, main_config_file))
    }

    pub fn main(&self) -> MainConfig {
        self.current.read().main.clone()
    }

    pub fn agents(&self) -> AgentsConfig {
        self.current.read().agents.clone()
    }

    pub fn payloads(&self) -> PayloadsConfig {
        self.current.read().payloads.clone()
    }

    pub fn snapshot(&self) -> ConfigSet {
        self.current.read().clone()
    }

    pub fn untrusted_timer(&self) -> u64 {
        self.current.read().agents.untrusted_timer
    }

    pub fn ability_refresh(&self) -> u64 {
        self.current.read().main.ability_refresh
    }

    pub fn update_main(&self, f: impl FnOnce(&mut MainConfig)) {
        f(&mut self.current.write().main);
    }

    pub fn update_agents(&self, f: impl FnOnce(&mut AgentsConfig)) {
        f(&mut self.current.write().agents);
    }

    pub fn update_payloads(&self, f: impl FnOnce(&mut PayloadsConfig)) {
        f(&mut self.current.write().payloads);
    }

    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    pub fn main_config_file(&self) -> &str {
        &self.main_config_file
    }

    /// Re-read the documents from disk, replacing the live values. An invalid
    /// file leaves the current configuration untouched.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let mut fresh = ConfigSet::load(&self.conf_dir, &self.main_config_file)?;
        fresh.apply_env_overrides();
        fresh.validate()?;
        *self.current.write() = fresh;
        info!("Configuration reloaded from {:?}", self.conf_dir);
        Ok(())
    }

    /// Rewrite the three documents using `main_config_file` as the main stem.
    pub fn save(&self, main_config_file: &str) -> Result<(), ConfigError> {
        let snapshot = self.snapshot();
        snapshot.save(&self.conf_dir, main_config_file)
    }
}
