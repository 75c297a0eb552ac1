// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Operation Scheduler
//!
//! Fires daily schedules. Each cycle compares the current UTC time of day
//! with every schedule's time; a schedule whose time passed less than one
//! interval ago is cloned into a fresh operation, persisted, and launched.
//! The once-per-day guarantee rests on that window being exactly one
//! interval wide. A per-schedule record of the last firing date backs it up
//! when the loop is delayed or the wall clock steps.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::launcher::OperationLauncher;
use crate::application::services::Services;
use crate::application::supervisor::BackgroundLoop;
use crate::domain::events::ControlPlaneEvent;
use crate::domain::operation::{Operation, OperationId};

pub const SCHEDULER_INTERVAL: Duration = Duration::from_secs(60);

pub struct OperationScheduler {
    services: Services,
    launcher: OperationLauncher,
    interval: Duration,
    last_fired: DashMap<Uuid, NaiveDate>,
}

impl OperationScheduler {
    pub fn new(services: Services, launcher: OperationLauncher) -> Self {
        Self {
            services,
            launcher,
            interval: SCHEDULER_INTERVAL,
            last_fired: DashMap::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One scheduler cycle. Returns the ids of the operations it launched.
    pub async fn tick(&self) -> Result<Vec<OperationId>> {
        let schedules = self
            .services
            .data
            .locate_schedules()
            .await
            .context("Failed to locate schedules")?;
        let mut fired = Vec::new();

        for schedule in schedules {
            let now = self.services.clock.now();
            if !schedule.is_due(now, self.interval.as_secs()) {
                continue;
            }
            let today = now.date_naive();
            if self.last_fired.get(&schedule.id).is_some_and(|d| *d == today) {
                debug!("Schedule {} already fired today", schedule.name);
                continue;
            }

            debug!("Pulling {} off the scheduler", schedule.name);
            let operation = Operation::from_template(&schedule.task, &schedule.name, now);
            // Left unmarked on failure so the next tick retries it.
            let operation = match self.services.data.store_operation(operation).await {
                Ok(operation) => operation,
                Err(e) => {
                    warn!("Failed to store operation for schedule {}: {}", schedule.name, e);
                    continue;
                }
            };
            self.last_fired.insert(schedule.id, today);

            info!("Schedule {} fired operation {}", schedule.name, operation.id);
            self.services.events.publish(ControlPlaneEvent::ScheduleFired {
                schedule: schedule.name.clone(),
                operation_id: operation.id,
                fired_at: now,
            });
            fired.push(operation.id);
            self.launcher.launch(operation);
        }

        Ok(fired)
    }
}

#[async_trait]
impl BackgroundLoop for OperationScheduler {
    fn name(&self) -> &str {
        "scheduler"
    }

    async fn run(&self) -> Result<()> {
        loop {
            self.tick().await?;
            tokio::time::sleep(self.interval).await;
        }
    }
}
