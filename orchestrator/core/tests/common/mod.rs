// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use bastion_core::application::launcher::OperationRunner;
use bastion_core::application::plugin_manager::PluginHook;
use bastion_core::application::{Layout, Services};
use bastion_core::domain::ability::{Ability, AbilityQuery};
use bastion_core::domain::agent::Agent;
use bastion_core::domain::clock::Clock;
use bastion_core::domain::objective::Objective;
use bastion_core::domain::operation::{LinkId, LinkStatus, LinkTransition, Operation, OperationId};
use bastion_core::domain::plugin::Plugin;
use bastion_core::domain::repository::{
    AgentQuery, DataStore, OperationQuery, PluginQuery, StoreError,
};
use bastion_core::domain::schedule::Schedule;
use bastion_core::domain::server_config::ConfigSet;
use bastion_core::infrastructure::{ConfigStore, InMemoryDataStore};
use uuid::Uuid;

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
}

pub fn config_with(f: impl FnOnce(&mut ConfigSet)) -> ConfigSet {
    let mut config = ConfigSet::default();
    f(&mut config);
    config
}

/// In-memory stores over an on-disk layout rooted at `root`.
pub fn services_at(root: &Path, config: ConfigSet, clock: Arc<dyn Clock>) -> Services {
    Services::ephemeral(
        Layout::new(root),
        ConfigStore::new(config, root.join("conf"), "default"),
        clock,
    )
}

/// Creates `plugins/<name>/hook.yml`, optionally binding it to `module`.
pub fn install_plugin(root: &Path, name: &str, module: Option<&str>) {
    let dir = root.join("plugins").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let descriptor = match module {
        Some(module) => format!("module: {}\ndescription: {} plugin\n", module, name),
        None => String::new(),
    };
    std::fs::write(dir.join("hook.yml"), descriptor).unwrap();
}

#[derive(Default)]
pub struct RecordingHook {
    pub fail_enable: bool,
    pub enables: AtomicUsize,
    pub destroys: AtomicUsize,
    pub expansions: AtomicUsize,
}

impl RecordingHook {
    pub fn failing() -> Self {
        Self {
            fail_enable: true,
            ..Self::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginHook for RecordingHook {
    fn description(&self) -> &str {
        "records every call"
    }

    async fn enable(&self, _services: &Services) -> anyhow::Result<()> {
        self.enables.fetch_add(1, Ordering::SeqCst);
        if self.fail_enable {
            anyhow::bail!("enable exploded");
        }
        Ok(())
    }

    fn has_destroy(&self) -> bool {
        true
    }

    async fn destroy(&self, _services: &Services) -> anyhow::Result<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn has_expansion(&self) -> bool {
        true
    }

    async fn expansion(&self, _services: &Services) -> anyhow::Result<()> {
        self.expansions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runner that records each launch and finishes the operation immediately.
#[derive(Default)]
pub struct RecordingRunner {
    pub launched: Mutex<Vec<OperationId>>,
}

impl RecordingRunner {
    pub fn launched(&self) -> Vec<OperationId> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl OperationRunner for RecordingRunner {
    async fn run(&self, mut operation: Operation, services: &Services) -> anyhow::Result<Operation> {
        self.launched.lock().push(operation.id);
        operation.finish(services.clock.now());
        Ok(services.data.store_operation(operation).await?)
    }
}

/// Writes another component makes right after an agent lookup returns.
pub enum Interleaved {
    /// The agent checks in at the given time.
    Beacon { paw: String, at: DateTime<Utc> },
    /// A contact reports the link as successful; fires on the lookup of `during_lookup_of`.
    LinkSucceeded {
        during_lookup_of: String,
        operation_id: OperationId,
        link_id: LinkId,
    },
}

/// In-memory store with scripted interference and failures.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: InMemoryDataStore,
    pub interleaved: Mutex<Vec<Interleaved>>,
    /// `revoke_trust` fails for this paw.
    pub refuse_revoke: Option<String>,
    /// `store_operation` fails for operations fired by this schedule.
    pub refuse_schedule: Option<String>,
}

impl ScriptedStore {
    pub fn interleave(&self, write: Interleaved) {
        self.interleaved.lock().push(write);
    }

    async fn run_interleaved(&self, looked_up: Option<&str>) -> Result<(), StoreError> {
        let due: Vec<Interleaved> = {
            let mut queue = self.interleaved.lock();
            let (due, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *queue).into_iter().partition(|w| match w {
                Interleaved::Beacon { .. } => true,
                Interleaved::LinkSucceeded { during_lookup_of, .. } => {
                    looked_up == Some(during_lookup_of.as_str())
                }
            });
            *queue = keep;
            due
        };
        for write in due {
            match write {
                Interleaved::Beacon { paw, at } => {
                    let mut agent = self.inner.locate_agents(&AgentQuery::by_paw(paw)).await?.remove(0);
                    agent.heartbeat(at);
                    self.inner.store_agent(agent).await?;
                }
                Interleaved::LinkSucceeded {
                    operation_id,
                    link_id,
                    ..
                } => {
                    let reported = LinkTransition::new(LinkStatus::Dispatched, LinkStatus::Success);
                    self.inner.update_link(operation_id, link_id, reported).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for ScriptedStore {
    async fn locate_agents(&self, query: &AgentQuery) -> Result<Vec<Agent>, StoreError> {
        let found = self.inner.locate_agents(query).await?;
        self.run_interleaved(query.paw.as_deref()).await?;
        Ok(found)
    }
    async fn store_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        self.inner.store_agent(agent).await
    }
    async fn revoke_trust(
        &self,
        paw: &str,
        now: DateTime<Utc>,
        untrusted_timer: u64,
    ) -> Result<bool, StoreError> {
        if self.refuse_revoke.as_deref() == Some(paw) {
            return Err(StoreError::Io("disk full".to_string()));
        }
        self.inner.revoke_trust(paw, now, untrusted_timer).await
    }
    async fn locate_operations(&self, query: &OperationQuery) -> Result<Vec<Operation>, StoreError> {
        self.inner.locate_operations(query).await
    }
    async fn store_operation(&self, operation: Operation) -> Result<Operation, StoreError> {
        if self.refuse_schedule.is_some() && operation.schedule == self.refuse_schedule {
            return Err(StoreError::Io("disk full".to_string()));
        }
        self.inner.store_operation(operation).await
    }
    async fn update_link(
        &self,
        operation_id: OperationId,
        link_id: LinkId,
        transition: LinkTransition,
    ) -> Result<bool, StoreError> {
        self.inner.update_link(operation_id, link_id, transition).await
    }
    async fn finish_operation(
        &self,
        operation_id: OperationId,
        objective: Objective,
        at: DateTime<Utc>,
    ) -> Result<Operation, StoreError> {
        self.inner.finish_operation(operation_id, objective, at).await
    }
    async fn locate_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        self.inner.locate_schedules().await
    }
    async fn store_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        self.inner.store_schedule(schedule).await
    }
    async fn remove_schedule(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.remove_schedule(id).await
    }
    async fn locate_plugins(&self, query: &PluginQuery) -> Result<Vec<Plugin>, StoreError> {
        self.inner.locate_plugins(query).await
    }
    async fn store_plugin(&self, plugin: Plugin) -> Result<Plugin, StoreError> {
        self.inner.store_plugin(plugin).await
    }
    async fn locate_abilities(&self, query: &AbilityQuery) -> Result<Vec<Ability>, StoreError> {
        self.inner.locate_abilities(query).await
    }
    async fn store_ability(&self, ability: Ability) -> Result<Ability, StoreError> {
        self.inner.store_ability(ability).await
    }
    async fn save_state(&self) -> Result<(), StoreError> {
        self.inner.save_state().await
    }
    async fn restore_state(&self) -> Result<(), StoreError> {
        self.inner.restore_state().await
    }
}
