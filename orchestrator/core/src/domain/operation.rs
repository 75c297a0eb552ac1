// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Operation Aggregate
//!
//! An operation is an ordered chain of links (ability invocations bound to an
//! agent). Operations are never deleted; a finished operation keeps its
//! `finish` timestamp and stays in the store for reporting.
//!
//! Operations created by the scheduler are built from an [`OperationTemplate`]
//! through [`Operation::from_template`], which assigns fresh identity to the
//! operation and every link so nothing aliases the schedule's template.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::objective::Objective;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Dispatched,
    Success,
    Failed,
    Discarded,
}

/// A single ability invocation against one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    /// Globally unique correlation token reported back by the agent.
    pub unique: String,
    pub paw: String,
    pub ability_id: String,
    pub command: String,
    pub status: LinkStatus,
    pub created: DateTime<Utc>,
    pub finish: Option<DateTime<Utc>>,
}

impl Link {
    pub fn new(
        paw: impl Into<String>,
        ability_id: impl Into<String>,
        command: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LinkId::new(),
            unique: Uuid::new_v4().to_string(),
            paw: paw.into(),
            ability_id: ability_id.into(),
            command: command.into(),
            status: LinkStatus::Pending,
            created,
            finish: None,
        }
    }

    /// Applies `transition` if the link is still in its `from` status.
    pub fn apply(&mut self, transition: LinkTransition) -> bool {
        if self.status != transition.from {
            return false;
        }
        self.status = transition.to;
        if transition.finish.is_some() {
            self.finish = transition.finish;
        }
        true
    }
}

/// Compare-and-set status change for a single link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTransition {
    pub from: LinkStatus,
    pub to: LinkStatus,
    pub finish: Option<DateTime<Utc>>,
}

impl LinkTransition {
    pub fn new(from: LinkStatus, to: LinkStatus) -> Self {
        Self {
            from,
            to,
            finish: None,
        }
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finish = Some(at);
        self
    }
}

/// Link shape stored inside a schedule's template; carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTemplate {
    pub paw: String,
    pub ability_id: String,
    pub command: String,
}

/// Blueprint a schedule clones into a new operation each time it fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationTemplate {
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub chain: Vec<LinkTemplate>,
    #[serde(default)]
    pub objective: Objective,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    pub group: String,
    pub state: OperationState,
    pub start: Option<DateTime<Utc>>,
    /// `None` while the operation is live.
    pub finish: Option<DateTime<Utc>>,
    pub chain: Vec<Link>,
    /// Name of the schedule that produced this operation, if any.
    pub schedule: Option<String>,
    #[serde(default)]
    pub objective: Objective,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            group: String::new(),
            state: OperationState::Running,
            start: None,
            finish: None,
            chain: Vec::new(),
            schedule: None,
            objective: Objective::default(),
        }
    }

    /// Builds a fresh operation from a schedule's template. Identity fields
    /// (operation id, link ids and uniques) are newly generated and the start
    /// metadata is stamped with `now`.
    pub fn from_template(
        template: &OperationTemplate,
        schedule_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let chain = template
            .chain
            .iter()
            .map(|l| Link::new(l.paw.clone(), l.ability_id.clone(), l.command.clone(), now))
            .collect();

        Self {
            id: OperationId::new(),
            name: format!("{} ({})", template.name, now.format("%Y-%m-%d %H:%M:%S")),
            group: template.group.clone(),
            state: OperationState::Running,
            start: Some(now),
            finish: None,
            chain,
            schedule: Some(schedule_name.to_string()),
            objective: template.objective.fresh_copy(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finish.is_some()
    }

    pub fn has_link(&self, link_id: LinkId) -> bool {
        self.chain.iter().any(|l| l.id == link_id)
    }

    pub fn pending_links(&self) -> impl Iterator<Item = &Link> {
        self.chain.iter().filter(|l| l.status == LinkStatus::Pending)
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.state = OperationState::Finished;
        self.finish = Some(at);
    }
}
