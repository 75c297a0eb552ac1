// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! The service-handle set shared by every component, plugin, and contact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::contact::ContactService;
use crate::domain::knowledge::KnowledgeStore;
use crate::domain::repository::DataStore;
use crate::infrastructure::ability_loader::AbilityLoader;
use crate::infrastructure::config_store::ConfigStore;
use crate::infrastructure::contact_service::InMemoryContactService;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::knowledge_store::InMemoryKnowledgeStore;
use crate::infrastructure::repositories::InMemoryDataStore;

/// On-disk layout of a server installation, rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conf_dir(&self) -> PathBuf {
        self.root.join("conf")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn object_store_path(&self) -> PathBuf {
        self.data_dir().join("object_store")
    }

    pub fn fact_store_path(&self) -> PathBuf {
        self.data_dir().join("fact_store")
    }
}

#[derive(Clone)]
pub struct Services {
    pub data: Arc<dyn DataStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub contacts: Arc<dyn ContactService>,
    pub config: ConfigStore,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub abilities: AbilityLoader,
    pub layout: Layout,
}

impl Services {
    /// Standard wiring: in-memory stores snapshotting under `layout`'s data
    /// directory, system clock.
    pub fn standard(layout: Layout, config: ConfigStore) -> Self {
        let data: Arc<dyn DataStore> =
            Arc::new(InMemoryDataStore::with_snapshot(layout.object_store_path()));
        let knowledge: Arc<dyn KnowledgeStore> =
            Arc::new(InMemoryKnowledgeStore::with_snapshot(layout.fact_store_path()));
        Self::assemble(data, knowledge, config, Arc::new(SystemClock), layout)
    }

    /// Purely in-memory wiring with an injected clock. Nothing touches disk
    /// unless `layout` points somewhere real.
    pub fn ephemeral(layout: Layout, config: ConfigStore, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(
            Arc::new(InMemoryDataStore::new()),
            Arc::new(InMemoryKnowledgeStore::new()),
            config,
            clock,
            layout,
        )
    }

    fn assemble(
        data: Arc<dyn DataStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        config: ConfigStore,
        clock: Arc<dyn Clock>,
        layout: Layout,
    ) -> Self {
        Self {
            abilities: AbilityLoader::new(data.clone()),
            data,
            knowledge,
            contacts: Arc::new(InMemoryContactService::new()),
            config,
            events: EventBus::with_default_capacity(),
            clock,
            layout,
        }
    }

    pub fn with_contact_service(mut self, contacts: Arc<dyn ContactService>) -> Self {
        self.contacts = contacts;
        self
    }
}
