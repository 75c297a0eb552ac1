// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Data Store Interface
//!
//! The data store is the single shared mutable resource of the control plane.
//! Every component reads and writes collections through it and keeps no
//! private copies it later mutates.
//!
//! | Collection | Key | Store semantics |
//! |------------|-----|-----------------|
//! | agents | `paw` | replace, or `revoke_trust` for the trust flag alone |
//! | operations | `OperationId` | replace, or per-link `update_link` and `finish_operation` |
//! | schedules | schedule id | replace |
//! | plugins | `name` | insert once, afterwards only `enabled` is updated |
//! | abilities | `ability_id` | full replace |
//!
//! Queries use `Default::default()` to mean "match everything". The store
//! offers no multi-collection transactions; each call is independently
//! consistent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::ability::{Ability, AbilityQuery};
use crate::domain::agent::Agent;
use crate::domain::objective::Objective;
use crate::domain::operation::{LinkId, LinkTransition, Operation, OperationId, OperationState};
use crate::domain::plugin::Plugin;
use crate::domain::schedule::Schedule;

#[derive(Debug, Clone, Default)]
pub struct AgentQuery {
    pub paw: Option<String>,
    pub trusted: Option<bool>,
}

impl AgentQuery {
    pub fn by_paw(paw: impl Into<String>) -> Self {
        Self {
            paw: Some(paw.into()),
            ..Self::default()
        }
    }

    pub fn trusted() -> Self {
        Self {
            trusted: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, agent: &Agent) -> bool {
        self.paw.as_ref().map_or(true, |p| &agent.paw == p)
            && self.trusted.map_or(true, |t| agent.trusted == t)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationQuery {
    pub id: Option<OperationId>,
    pub state: Option<OperationState>,
    /// `Some(false)` selects operations whose `finish` is unset.
    pub finished: Option<bool>,
}

impl OperationQuery {
    pub fn by_id(id: OperationId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn unfinished() -> Self {
        Self {
            finished: Some(false),
            ..Self::default()
        }
    }

    pub fn in_state(state: OperationState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn matches(&self, op: &Operation) -> bool {
        self.id.map_or(true, |id| op.id == id)
            && self.state.map_or(true, |s| op.state == s)
            && self.finished.map_or(true, |f| op.is_finished() == f)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PluginQuery {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

impl PluginQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, plugin: &Plugin) -> bool {
        self.name.as_ref().map_or(true, |n| &plugin.name == n)
            && self.enabled.map_or(true, |e| plugin.enabled == e)
    }
}

/// Named-collection store consumed by every control plane component.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn locate_agents(&self, query: &AgentQuery) -> Result<Vec<Agent>, StoreError>;

    async fn store_agent(&self, agent: Agent) -> Result<Agent, StoreError>;

    /// Clears `trusted` on the stored agent if it is still trusted and its
    /// silence still exceeds `untrusted_timer + sleep_max` at `now`. No other
    /// field is written. Returns whether trust was revoked.
    async fn revoke_trust(
        &self,
        paw: &str,
        now: DateTime<Utc>,
        untrusted_timer: u64,
    ) -> Result<bool, StoreError>;

    async fn locate_operations(&self, query: &OperationQuery) -> Result<Vec<Operation>, StoreError>;

    async fn store_operation(&self, operation: Operation) -> Result<Operation, StoreError>;

    /// Applies `transition` to one link of the stored chain. Returns `false`
    /// when the link has already left `transition.from`.
    async fn update_link(
        &self,
        operation_id: OperationId,
        link_id: LinkId,
        transition: LinkTransition,
    ) -> Result<bool, StoreError>;

    /// Records `objective` and finishes the stored operation at `at`, leaving
    /// its chain untouched. An already finished operation keeps its finish time.
    async fn finish_operation(
        &self,
        operation_id: OperationId,
        objective: Objective,
        at: DateTime<Utc>,
    ) -> Result<Operation, StoreError>;

    async fn locate_schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    async fn store_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;

    async fn remove_schedule(&self, id: Uuid) -> Result<(), StoreError>;

    async fn locate_plugins(&self, query: &PluginQuery) -> Result<Vec<Plugin>, StoreError>;

    /// Inserts a plugin, or updates only `enabled` when the name already exists.
    /// Returns the stored record.
    async fn store_plugin(&self, plugin: Plugin) -> Result<Plugin, StoreError>;

    async fn locate_abilities(&self, query: &AbilityQuery) -> Result<Vec<Ability>, StoreError>;

    async fn store_ability(&self, ability: Ability) -> Result<Ability, StoreError>;

    /// Writes the current contents to durable storage.
    async fn save_state(&self) -> Result<(), StoreError>;

    /// Loads the last saved contents, if any.
    async fn restore_state(&self) -> Result<(), StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
