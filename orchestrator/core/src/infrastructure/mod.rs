// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod ability_loader;
pub mod config_store;
pub mod contact_service;
pub mod event_bus;
pub mod knowledge_store;
pub mod report_writer;
pub mod repositories;
pub mod snapshot;

pub use config_store::ConfigStore;
pub use event_bus::EventBus;
pub use repositories::InMemoryDataStore;
