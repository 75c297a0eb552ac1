// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Operation Launching
//!
//! Operations run as tracked background tasks. The [`OperationLauncher`]
//! owns the task group: it refuses to start a second task for an operation
//! id that is already live, captures task failures (errors and panics) so
//! they are logged and published instead of vanishing, and can be joined.
//!
//! How a launched operation actually progresses is behind the
//! [`OperationRunner`] port. [`ChainRunner`] is the standard implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::application::services::Services;
use crate::domain::events::ControlPlaneEvent;
use crate::domain::knowledge::FactQuery;
use crate::domain::operation::{
    LinkId, LinkStatus, LinkTransition, Operation, OperationId, OperationState,
};
use crate::domain::repository::{AgentQuery, OperationQuery};

/// Drives one operation from launch until it finishes.
#[async_trait]
pub trait OperationRunner: Send + Sync {
    async fn run(&self, operation: Operation, services: &Services) -> Result<Operation>;
}

/// Dispatches pending links to trusted agents and polls the store until
/// every link reaches a terminal status or the objective's goals are all
/// met, then records the evaluated objective and marks the operation
/// finished.
///
/// Link results are written back by contacts. The runner never stores the
/// whole operation once it is known to the store; each link moves through
/// a compare-and-set [`LinkTransition`] so a result reported mid-poll is
/// kept.
pub struct ChainRunner {
    poll_interval: Duration,
}

impl ChainRunner {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    async fn reload(services: &Services, id: OperationId) -> Result<Option<Operation>> {
        Ok(services
            .data
            .locate_operations(&OperationQuery::by_id(id))
            .await?
            .into_iter()
            .next())
    }

    /// Moves every pending link to `Dispatched` or `Discarded`. Returns
    /// whether any link changed.
    async fn dispatch(operation: &Operation, services: &Services) -> Result<bool> {
        let pending: Vec<(LinkId, String, String)> = operation
            .pending_links()
            .map(|l| (l.id, l.paw.clone(), l.unique.clone()))
            .collect();

        let mut changed = false;
        for (link_id, paw, unique) in pending {
            let agent = services
                .data
                .locate_agents(&AgentQuery::by_paw(paw.clone()))
                .await?
                .into_iter()
                .next();
            let transition = match agent {
                Some(agent) if agent.trusted => {
                    debug!("Dispatching link {} to {}", unique, paw);
                    LinkTransition::new(LinkStatus::Pending, LinkStatus::Dispatched)
                }
                Some(_) => continue,
                None => {
                    warn!("Discarding link {}: no agent with paw {}", unique, paw);
                    LinkTransition::new(LinkStatus::Pending, LinkStatus::Discarded)
                        .finished_at(services.clock.now())
                }
            };
            if services.data.update_link(operation.id, link_id, transition).await? {
                changed = true;
            } else {
                debug!("Link {} moved on before it could be dispatched", unique);
            }
        }
        Ok(changed)
    }
}

impl Default for ChainRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn is_terminal(status: LinkStatus) -> bool {
    matches!(
        status,
        LinkStatus::Success | LinkStatus::Failed | LinkStatus::Discarded
    )
}

#[async_trait]
impl OperationRunner for ChainRunner {
    async fn run(&self, operation: Operation, services: &Services) -> Result<Operation> {
        let id = operation.id;
        if Self::reload(services, id).await?.is_none() {
            services.data.store_operation(operation).await?;
        }

        loop {
            let mut operation = Self::reload(services, id)
                .await?
                .with_context(|| format!("Operation {} vanished from the data store", id))?;

            if operation.is_finished() {
                return Ok(operation);
            }

            if operation.state != OperationState::Paused {
                if Self::dispatch(&operation, services).await? {
                    operation = Self::reload(services, id)
                        .await?
                        .with_context(|| format!("Operation {} vanished from the data store", id))?;
                }

                let links_done = operation.chain.iter().all(|l| is_terminal(l.status));
                let has_goals = !operation.objective.goals.is_empty();
                if links_done || has_goals {
                    let facts = services
                        .knowledge
                        .facts(&FactQuery {
                            source: Some(id.to_string()),
                            ..FactQuery::default()
                        })
                        .await?;
                    let objective_met = operation.objective.completed(&facts) && has_goals;
                    if objective_met {
                        debug!("Operation {} met its objective", id);
                    }
                    if links_done || objective_met {
                        return Ok(services
                            .data
                            .finish_operation(id, operation.objective, services.clock.now())
                            .await?);
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Removes an operation from the live set when its task ends, however it ends.
struct LiveGuard {
    live: Arc<DashSet<OperationId>>,
    id: OperationId,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.remove(&self.id);
    }
}

#[derive(Clone)]
pub struct OperationLauncher {
    services: Services,
    runner: Arc<dyn OperationRunner>,
    live: Arc<DashSet<OperationId>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
    failures: Arc<AtomicUsize>,
}

impl OperationLauncher {
    pub fn new(services: Services, runner: Arc<dyn OperationRunner>) -> Self {
        Self {
            services,
            runner,
            live: Arc::new(DashSet::new()),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Starts `operation` in the background. Returns `false` when the
    /// operation is already finished or already has a live task.
    pub fn launch(&self, operation: Operation) -> bool {
        let id = operation.id;
        if operation.is_finished() {
            debug!("Operation {} already finished, not launching", id);
            return false;
        }
        if !self.live.insert(id) {
            warn!("Operation {} is already running", id);
            return false;
        }

        info!("Launching operation {} ({})", id, operation.name);
        self.services.events.publish(ControlPlaneEvent::OperationLaunched {
            operation_id: id,
            launched_at: self.services.clock.now(),
        });

        let guard = LiveGuard {
            live: self.live.clone(),
            id,
        };
        let services = self.services.clone();
        let runner = self.runner.clone();
        let failures = self.failures.clone();

        let mut tasks = self.tasks.lock();
        self.reap(&mut tasks);
        tasks.spawn(async move {
            let _guard = guard;
            match runner.run(operation, &services).await.context("operation runner failed") {
                Ok(done) => {
                    if done.is_finished() {
                        services.events.publish(ControlPlaneEvent::OperationFinished {
                            operation_id: id,
                            finished_at: services.clock.now(),
                        });
                    }
                }
                Err(e) => {
                    error!("Operation {} failed: {:#}", id, e);
                    failures.fetch_add(1, Ordering::SeqCst);
                    services.events.publish(ControlPlaneEvent::OperationFailed {
                        operation_id: id,
                        error: format!("{:#}", e),
                        failed_at: services.clock.now(),
                    });
                }
            }
        });
        true
    }

    fn reap(&self, tasks: &mut JoinSet<()>) {
        while let Some(joined) = tasks.try_join_next() {
            self.record_join(joined);
        }
    }

    fn record_join(&self, joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Operation task panicked: {}", e);
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn is_live(&self, id: OperationId) -> bool {
        self.live.contains(&id)
    }

    pub fn live_operations(&self) -> Vec<OperationId> {
        self.live.iter().map(|id| *id).collect()
    }

    /// Tasks that ended in an error or a panic.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Waits for every launched operation task to end.
    pub async fn join_all(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                self.record_join(joined);
            }
        }
    }
}
