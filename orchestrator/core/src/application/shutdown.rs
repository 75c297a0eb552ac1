// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Graceful Teardown
//!
//! Persists everything the server knows before the process exits. Steps run
//! strictly in order, each awaited before the next:
//!
//! 1. destroy hooks of enabled plugins
//! 2. the three configuration documents, to `conf/<name>.yml`
//! 3. the object store snapshot
//! 4. the knowledge store snapshot
//! 5. reports: the aggregate contact report, then one report per operation,
//!    under `<reports_dir>/reports`
//!
//! A failing step is logged and recorded in the summary; later steps still
//! run so one broken store never costs the rest of the state. Report
//! generation is isolated per operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use crate::application::plugin_manager::PluginManager;
use crate::application::services::Services;
use crate::domain::events::ControlPlaneEvent;
use crate::domain::knowledge::FactQuery;
use crate::domain::operation::{Operation, OperationId};
use crate::domain::repository::OperationQuery;
use crate::infrastructure::report_writer::ReportWriter;

/// Renders the report written for one operation at shutdown. Returning
/// `Value::Null` skips the operation.
#[async_trait]
pub trait OperationReporter: Send + Sync {
    async fn report(&self, operation: &Operation, services: &Services) -> Result<serde_json::Value>;
}

/// Operation metadata, objective progress, link steps grouped by agent, and
/// the facts the operation produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOperationReporter;

#[async_trait]
impl OperationReporter for StandardOperationReporter {
    async fn report(&self, operation: &Operation, services: &Services) -> Result<serde_json::Value> {
        let facts = services
            .knowledge
            .facts(&FactQuery {
                source: Some(operation.id.to_string()),
                ..FactQuery::default()
            })
            .await?;
        let mut steps: BTreeMap<&str, Vec<serde_json::Value>> = BTreeMap::new();
        for link in &operation.chain {
            steps.entry(link.paw.as_str()).or_default().push(json!({
                "link_id": link.unique,
                "ability_id": link.ability_id,
                "command": link.command,
                "status": link.status,
                "created": link.created,
                "finish": link.finish,
            }));
        }
        Ok(json!({
            "id": operation.id,
            "name": operation.name,
            "group": operation.group,
            "state": operation.state,
            "start": operation.start,
            "finish": operation.finish,
            "schedule": operation.schedule,
            "objective": {
                "name": operation.objective.name,
                "percentage": operation.objective.percentage(),
            },
            "steps": steps,
            "facts": facts,
        }))
    }
}

#[derive(Debug, Default)]
pub struct ShutdownSummary {
    pub plugins_destroyed: usize,
    pub reports_written: usize,
    pub report_failures: Vec<(OperationId, String)>,
    /// Steps (other than single reports) that failed, with their error.
    pub step_failures: Vec<(&'static str, String)>,
}

impl ShutdownSummary {
    pub fn is_clean(&self) -> bool {
        self.report_failures.is_empty() && self.step_failures.is_empty()
    }
}

pub struct ShutdownCoordinator {
    services: Services,
    plugins: PluginManager,
    reporter: Arc<dyn OperationReporter>,
}

impl ShutdownCoordinator {
    pub fn new(services: Services, plugins: PluginManager, reporter: Arc<dyn OperationReporter>) -> Self {
        Self {
            services,
            plugins,
            reporter,
        }
    }

    pub async fn teardown(&self, main_config_file: &str) -> ShutdownSummary {
        let mut summary = ShutdownSummary {
            plugins_destroyed: self.plugins.destroy_all().await,
            ..ShutdownSummary::default()
        };

        if let Err(e) = self.services.config.save(main_config_file) {
            error!("Failed to save configuration: {}", e);
            summary.step_failures.push(("config", e.to_string()));
        }
        if let Err(e) = self.services.data.save_state().await {
            error!("Failed to save object store: {}", e);
            summary.step_failures.push(("data", e.to_string()));
        }
        if let Err(e) = self.services.knowledge.save_state().await {
            error!("Failed to save knowledge store: {}", e);
            summary.step_failures.push(("knowledge", e.to_string()));
        }
        if let Err(e) = self.write_reports(&mut summary).await {
            error!("Failed to write reports: {:#}", e);
            summary.step_failures.push(("reports", format!("{:#}", e)));
        }

        self.services.events.publish(ControlPlaneEvent::ShutdownCompleted {
            reports_written: summary.reports_written,
            completed_at: self.services.clock.now(),
        });
        info!("shutting down server...good-bye");
        summary
    }

    async fn write_reports(&self, summary: &mut ShutdownSummary) -> Result<()> {
        let reports_dir = self.services.config.main().reports_dir;
        let writer = ReportWriter::create(&reports_dir).await?;

        match writer
            .write("contact_reports", &self.services.contacts.report())
            .await
        {
            Ok(_) => summary.reports_written += 1,
            Err(e) => {
                warn!("Failed to write contact report: {}", e);
                summary.step_failures.push(("contact_reports", e.to_string()));
            }
        }

        let operations = self
            .services
            .data
            .locate_operations(&OperationQuery::default())
            .await?;
        for operation in operations {
            let rendered = match self.reporter.report(&operation, &self.services).await {
                Ok(serde_json::Value::Null) => continue,
                Ok(report) => report,
                Err(e) => {
                    warn!("Failed to build report for operation {}: {:#}", operation.id, e);
                    summary.report_failures.push((operation.id, format!("{:#}", e)));
                    continue;
                }
            };
            match writer
                .write(&format!("operation_{}", operation.id), &rendered)
                .await
            {
                Ok(_) => summary.reports_written += 1,
                Err(e) => {
                    warn!("Failed to write report for operation {}: {}", operation.id, e);
                    summary.report_failures.push((operation.id, e.to_string()));
                }
            }
        }
        Ok(())
    }
}
