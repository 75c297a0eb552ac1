// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Read-side lookups over the data store used by contacts and the API.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::application::services::Services;
use crate::domain::ability::{AbilityQuery, Variation};
use crate::domain::operation::{Link, LinkId, Operation, OperationId, OperationState};
use crate::domain::repository::{AgentQuery, OperationQuery};

#[derive(Debug, Clone)]
pub enum LinkOwner {
    Operation(OperationId),
    Agent(String),
}

#[derive(Debug, Clone)]
pub struct FoundLink {
    pub owner: LinkOwner,
    pub link: Link,
}

pub struct OperationQueries {
    services: Services,
}

impl OperationQueries {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Finds a link by its correlation token, searching operation chains
    /// before the links dispatched directly to agents.
    pub async fn find_link(&self, unique: &str) -> Result<Option<FoundLink>> {
        for operation in self
            .services
            .data
            .locate_operations(&OperationQuery::default())
            .await?
        {
            if let Some(link) = operation.chain.iter().find(|l| l.unique == unique) {
                return Ok(Some(FoundLink {
                    owner: LinkOwner::Operation(operation.id),
                    link: link.clone(),
                }));
            }
        }
        for agent in self.services.data.locate_agents(&AgentQuery::default()).await? {
            if let Some(link) = agent.links.iter().find(|l| l.unique == unique) {
                return Ok(Some(FoundLink {
                    owner: LinkOwner::Agent(agent.paw.clone()),
                    link: link.clone(),
                }));
            }
        }
        Ok(None)
    }

    /// The operation owning `link_id`. Running operations are searched first.
    pub async fn find_op_with_link(&self, link_id: LinkId) -> Result<Option<Operation>> {
        let running = self
            .services
            .data
            .locate_operations(&OperationQuery::in_state(OperationState::Running))
            .await?;
        if let Some(op) = running.into_iter().find(|o| o.has_link(link_id)) {
            return Ok(Some(op));
        }
        Ok(self
            .services
            .data
            .locate_operations(&OperationQuery::default())
            .await?
            .into_iter()
            .find(|o| o.has_link(link_id)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployCommand {
    pub platform: String,
    pub executor: String,
    pub description: String,
    pub command: String,
    pub variations: Vec<Variation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployCommands {
    pub abilities: Vec<DeployCommand>,
    /// `app.*` keys of the main config plus every agent setting as `agents.<key>`.
    pub app_config: BTreeMap<String, serde_yaml::Value>,
}

pub struct AbilityCatalog {
    services: Services,
}

impl AbilityCatalog {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// One entry per executor of the ability, plus the settings a deploy
    /// command template needs.
    pub async fn deploy_commands(&self, ability_id: &str) -> Result<DeployCommands> {
        let abilities = self
            .services
            .data
            .locate_abilities(&AbilityQuery::by_id(ability_id))
            .await?;

        let mut commands = Vec::new();
        for ability in abilities {
            for executor in &ability.executors {
                commands.push(DeployCommand {
                    platform: executor.platform.clone(),
                    executor: executor.name.clone(),
                    description: ability.description.clone(),
                    command: executor.command.clone(),
                    variations: executor.variations.clone(),
                });
            }
        }

        let mut app_config = self.services.config.main().app_keys();
        for (key, value) in self.services.config.agents().as_map() {
            app_config.insert(format!("agents.{}", key), value);
        }

        Ok(DeployCommands {
            abilities: commands,
            app_config,
        })
    }
}
