// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Hot-reloads ability definitions. Every `ability_refresh` seconds the
//! watcher walks `<data_dir>/abilities` of the core and of each enabled
//! plugin, and reloads any file modified within the last refresh window
//! under its owner's access level.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::application::services::Services;
use crate::application::supervisor::BackgroundLoop;
use crate::domain::plugin::Plugin;
use crate::domain::repository::PluginQuery;
use crate::infrastructure::ability_loader::ability_files;

pub struct AbilityFileWatcher {
    services: Services,
}

impl AbilityFileWatcher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Enabled plugins that have a data directory, plus the core.
    pub async fn watched_sources(&self) -> Result<Vec<Plugin>> {
        let mut sources: Vec<Plugin> = self
            .services
            .data
            .locate_plugins(&PluginQuery::enabled())
            .await
            .context("Failed to locate enabled plugins")?
            .into_iter()
            .filter(|p| p.data_dir.is_some())
            .collect();
        sources.push(Plugin::core(self.services.layout.data_dir()));
        Ok(sources)
    }

    /// Reloads recently modified ability files. Returns how many files were
    /// reloaded; a file that fails to load is logged and skipped.
    pub async fn scan(&self, sources: &[Plugin]) -> usize {
        let refresh = self.services.config.ability_refresh();
        let now = self.services.clock.now();
        let mut reloaded = 0;

        for source in sources {
            let Some(data_dir) = source.data_dir.as_ref() else {
                continue;
            };
            let owner = (source.name != "core").then_some(source.name.as_str());
            for path in ability_files(&data_dir.join("abilities")) {
                if !modified_within(&path, now, refresh) {
                    continue;
                }
                debug!("[{}] Reloading {}", source.name, path.display());
                match self
                    .services
                    .abilities
                    .load_ability_file(&path, source.access, owner)
                    .await
                {
                    Ok(_) => reloaded += 1,
                    Err(e) => warn!("Failed to reload {}: {}", path.display(), e),
                }
            }
        }
        reloaded
    }
}

fn modified_within(path: &Path, now: DateTime<Utc>, window_secs: u64) -> bool {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(e) => {
            warn!("Cannot stat {}: {}", path.display(), e);
            return false;
        }
    };
    let age = (now - modified).num_milliseconds() as f64 / 1000.0;
    age < window_secs as f64
}

#[async_trait]
impl BackgroundLoop for AbilityFileWatcher {
    fn name(&self) -> &str {
        "ability_watcher"
    }

    async fn run(&self) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(self.services.config.ability_refresh())).await;
        loop {
            let sources = self.watched_sources().await?;
            self.scan(&sources).await;
            tokio::time::sleep(Duration::from_secs(self.services.config.ability_refresh())).await;
        }
    }
}
