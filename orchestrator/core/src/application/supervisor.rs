// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Background Loop Supervision
//!
//! Every periodic task the control plane starts at boot (trust monitor,
//! scheduler, ability watcher, resumer) runs under a [`LoopSupervisor`]. A
//! loop that returns an error or panics is logged, reported on the event bus,
//! and restarted with exponential backoff, so one bad cycle never silently
//! ends monitoring for the rest of the process lifetime.
//!
//! Loop health is observable through [`LoopSupervisor::health`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::clock::Clock;
use crate::domain::events::ControlPlaneEvent;
use crate::infrastructure::event_bus::EventBus;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A long-running task driven by the supervisor.
///
/// `run` should loop forever; returning `Ok(())` marks the loop completed
/// (used by one-shot tasks such as the resumer), returning `Err` triggers the
/// restart policy.
#[async_trait]
pub trait BackgroundLoop: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Log the failure and leave the loop stopped.
    Never,
    /// Restart after `initial`, doubling up to `max`. The delay resets once a
    /// run has stayed up for longer than `max`.
    Backoff { initial: Duration, max: Duration },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Backoff {
            initial: INITIAL_BACKOFF,
            max: MAX_BACKOFF,
        }
    }
}

impl RestartPolicy {
    fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            RestartPolicy::Never => None,
            RestartPolicy::Backoff { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
                Some(initial.saturating_mul(factor).min(*max))
            }
        }
    }

    fn healthy_after(&self) -> Duration {
        match self {
            RestartPolicy::Never => Duration::MAX,
            RestartPolicy::Backoff { max, .. } => *max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    Backoff,
    Stopped,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub restarts: u32,
    pub last_error: Option<String>,
    pub since: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LoopSupervisor {
    policy: RestartPolicy,
    events: EventBus,
    clock: Arc<dyn Clock>,
    health: Arc<DashMap<String, LoopStatus>>,
    shutdown: CancellationToken,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl LoopSupervisor {
    pub fn new(policy: RestartPolicy, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            events,
            clock,
            health: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn spawn(&self, task: Arc<dyn BackgroundLoop>) {
        let this = self.clone();
        self.tasks.lock().spawn(async move { this.supervise(task).await });
    }

    async fn supervise(&self, task: Arc<dyn BackgroundLoop>) {
        let name = task.name().to_string();
        let mut attempt: u32 = 0;
        let mut last_error: Option<String> = None;

        loop {
            self.set_status(&name, LoopState::Running, attempt, last_error.clone());
            let started = Instant::now();

            let runner = task.clone();
            let mut handle = tokio::spawn(async move { runner.run().await });
            let abort = handle.abort_handle();
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    abort.abort();
                    self.set_status(&name, LoopState::Stopped, attempt, last_error);
                    return;
                }
                joined = &mut handle => joined,
            };

            let failure = match outcome {
                Ok(Ok(())) => {
                    info!("Background loop {} completed", name);
                    self.set_status(&name, LoopState::Completed, attempt, last_error);
                    return;
                }
                Ok(Err(e)) => {
                    error!("Background loop {} failed: {:?}", name, e);
                    format!("{:#}", e)
                }
                Err(join_error) => {
                    error!("Background loop {} aborted: {}", name, join_error);
                    if join_error.is_panic() {
                        format!("panicked: {}", join_error)
                    } else {
                        join_error.to_string()
                    }
                }
            };

            self.events.publish(ControlPlaneEvent::LoopFailed {
                name: name.clone(),
                error: failure.clone(),
                failed_at: self.clock.now(),
            });
            last_error = Some(failure);

            if started.elapsed() > self.policy.healthy_after() {
                attempt = 0;
            }
            attempt = attempt.saturating_add(1);

            let Some(delay) = self.policy.delay(attempt) else {
                warn!("Background loop {} will not be restarted", name);
                self.set_status(&name, LoopState::Stopped, attempt, last_error);
                return;
            };

            self.set_status(&name, LoopState::Backoff, attempt, last_error.clone());
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.set_status(&name, LoopState::Stopped, attempt, last_error);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            warn!("Restarting background loop {} (attempt {})", name, attempt);
            self.events.publish(ControlPlaneEvent::LoopRestarted {
                name: name.clone(),
                attempt,
                restarted_at: self.clock.now(),
            });
        }
    }

    fn set_status(&self, name: &str, state: LoopState, restarts: u32, last_error: Option<String>) {
        self.health.insert(
            name.to_string(),
            LoopStatus {
                state,
                restarts,
                last_error,
                since: self.clock.now(),
            },
        );
    }

    pub fn health(&self) -> BTreeMap<String, LoopStatus> {
        self.health
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn status(&self, name: &str) -> Option<LoopStatus> {
        self.health.get(name).map(|s| s.value().clone())
    }

    /// Signals every supervised loop to stop. Loops are not otherwise
    /// cancelled by shutdown; this is for embedders that need a clean stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Waits for every supervised loop to exit.
    pub async fn join(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Supervisor task aborted: {}", e);
            }
        }
    }
}
