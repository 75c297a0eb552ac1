// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Data Store Implementation
//!
//! In-memory implementation of the domain [`DataStore`] port with optional
//! durability through a JSON snapshot file.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Own every collection the control plane shares between loops
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! Collections live behind a single `RwLock`. Every call takes the lock once
//! and releases it before returning, so concurrent loops see each call as
//! atomic but no multi-call transaction exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ability::{Ability, AbilityQuery};
use crate::domain::agent::Agent;
use crate::domain::objective::Objective;
use crate::domain::operation::{LinkId, LinkTransition, Operation, OperationId};
use crate::domain::plugin::Plugin;
use crate::domain::repository::{
    AgentQuery, DataStore, OperationQuery, PluginQuery, StoreError,
};
use crate::domain::schedule::Schedule;
use crate::infrastructure::snapshot::{read_snapshot, write_snapshot};

/// Everything the store holds. Also the on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Ram {
    agents: BTreeMap<String, Agent>,
    /// Insertion order is kept so reports and resumes are stable.
    operations: Vec<Operation>,
    schedules: BTreeMap<Uuid, Schedule>,
    plugins: Vec<Plugin>,
    abilities: BTreeMap<String, Ability>,
}

#[derive(Clone, Default)]
pub struct InMemoryDataStore {
    ram: Arc<RwLock<Ram>>,
    /// Snapshot location; `None` keeps the store purely in memory.
    snapshot_path: Option<PathBuf>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that persists to `path` on `save_state` and reads it on `restore_state`.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            ram: Arc::default(),
            snapshot_path: Some(path.into()),
        }
    }

    fn operation_index(ram: &Ram, id: OperationId) -> Option<usize> {
        ram.operations.iter().position(|o| o.id == id)
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn locate_agents(&self, query: &AgentQuery) -> Result<Vec<Agent>, StoreError> {
        let ram = self.ram.read();
        Ok(ram.agents.values().filter(|a| query.matches(a)).cloned().collect())
    }

    async fn store_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        let mut ram = self.ram.write();
        ram.agents.insert(agent.paw.clone(), agent.clone());
        Ok(agent)
    }

    async fn revoke_trust(
        &self,
        paw: &str,
        now: DateTime<Utc>,
        untrusted_timer: u64,
    ) -> Result<bool, StoreError> {
        let mut ram = self.ram.write();
        let agent = ram
            .agents
            .get_mut(paw)
            .ok_or_else(|| StoreError::NotFound(format!("agent {}", paw)))?;
        if !agent.trusted || !agent.trust_expired(now, untrusted_timer) {
            return Ok(false);
        }
        agent.trusted = false;
        Ok(true)
    }

    async fn locate_operations(&self, query: &OperationQuery) -> Result<Vec<Operation>, StoreError> {
        let ram = self.ram.read();
        Ok(ram.operations.iter().filter(|o| query.matches(o)).cloned().collect())
    }

    async fn store_operation(&self, operation: Operation) -> Result<Operation, StoreError> {
        let mut ram = self.ram.write();
        match Self::operation_index(&ram, operation.id) {
            Some(idx) => ram.operations[idx] = operation.clone(),
            None => ram.operations.push(operation.clone()),
        }
        Ok(operation)
    }

    async fn update_link(
        &self,
        operation_id: OperationId,
        link_id: LinkId,
        transition: LinkTransition,
    ) -> Result<bool, StoreError> {
        let mut ram = self.ram.write();
        let idx = Self::operation_index(&ram, operation_id)
            .ok_or_else(|| StoreError::NotFound(format!("operation {}", operation_id)))?;
        let link = ram.operations[idx]
            .chain
            .iter_mut()
            .find(|l| l.id == link_id)
            .ok_or_else(|| StoreError::NotFound(format!("link {}", link_id)))?;
        Ok(link.apply(transition))
    }

    async fn finish_operation(
        &self,
        operation_id: OperationId,
        objective: Objective,
        at: DateTime<Utc>,
    ) -> Result<Operation, StoreError> {
        let mut ram = self.ram.write();
        let idx = Self::operation_index(&ram, operation_id)
            .ok_or_else(|| StoreError::NotFound(format!("operation {}", operation_id)))?;
        let operation = &mut ram.operations[idx];
        operation.objective = objective;
        if !operation.is_finished() {
            operation.finish(at);
        }
        Ok(operation.clone())
    }

    async fn locate_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let ram = self.ram.read();
        Ok(ram.schedules.values().cloned().collect())
    }

    async fn store_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        let mut ram = self.ram.write();
        ram.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn remove_schedule(&self, id: Uuid) -> Result<(), StoreError> {
        let mut ram = self.ram.write();
        ram.schedules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", id)))
    }

    async fn locate_plugins(&self, query: &PluginQuery) -> Result<Vec<Plugin>, StoreError> {
        let ram = self.ram.read();
        Ok(ram.plugins.iter().filter(|p| query.matches(p)).cloned().collect())
    }

    async fn store_plugin(&self, plugin: Plugin) -> Result<Plugin, StoreError> {
        let mut ram = self.ram.write();
        if let Some(existing) = ram.plugins.iter_mut().find(|p| p.name == plugin.name) {
            existing.enabled = plugin.enabled;
            if plugin.data_dir.is_some() {
                existing.data_dir = plugin.data_dir;
            }
            return Ok(existing.clone());
        }
        ram.plugins.push(plugin.clone());
        Ok(plugin)
    }

    async fn locate_abilities(&self, query: &AbilityQuery) -> Result<Vec<Ability>, StoreError> {
        let ram = self.ram.read();
        Ok(ram.abilities.values().filter(|a| query.matches(a)).cloned().collect())
    }

    async fn store_ability(&self, ability: Ability) -> Result<Ability, StoreError> {
        let mut ram = self.ram.write();
        ram.abilities.insert(ability.ability_id.clone(), ability.clone());
        Ok(ability)
    }

    async fn save_state(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            debug!("Data store has no snapshot path; nothing to save");
            return Ok(());
        };
        let snapshot = self.ram.read().clone();
        write_snapshot(path, &snapshot).await?;
        info!(
            "Saved data store state to {:?} ({} operations, {} agents)",
            path,
            snapshot.operations.len(),
            snapshot.agents.len()
        );
        Ok(())
    }

    async fn restore_state(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        match read_snapshot::<Ram>(path).await? {
            Some(mut restored) => {
                // Plugins are rediscovered every boot.
                restored.plugins.clear();
                info!(
                    "Restored data store state from {:?} ({} operations)",
                    path,
                    restored.operations.len()
                );
                *self.ram.write() = restored;
            }
            None => debug!("No data store snapshot at {:?}", path),
        }
        Ok(())
    }
}
