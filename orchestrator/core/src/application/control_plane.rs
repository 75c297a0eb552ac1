// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Control Plane
//!
//! Owns every long-lived component and drives the boot and teardown
//! sequences. There is no process-wide registry: components reach shared
//! state only through the [`Services`] handle set held here.
//!
//! ## Boot
//!
//! 1. restore the object and knowledge stores from their snapshots
//! 2. validate external requirements (recorded, never fatal)
//! 3. register contacts and tunnels
//! 4. load core abilities from `data/abilities`
//! 5. load installed plugins (fatal on a broken installation), enabling the
//!    configured ones, then load their abilities
//! 6. run plugin expansions
//! 7. start the supervised background loops

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::ability_watcher::AbilityFileWatcher;
use crate::application::contact_registry::{ContactRegistry, RegistrationSummary};
use crate::application::launcher::{ChainRunner, OperationLauncher, OperationRunner};
use crate::application::plugin_manager::{HookRegistry, PluginLoadReport, PluginManager};
use crate::application::queries::{AbilityCatalog, OperationQueries};
use crate::application::requirements::{
    CommandVersionProbe, RequirementSummary, RequirementValidator, VersionProbe,
};
use crate::application::resumer::{OperationResumer, RESUME_DELAY};
use crate::application::scheduler::{OperationScheduler, SCHEDULER_INTERVAL};
use crate::application::services::Services;
use crate::application::shutdown::{
    OperationReporter, ShutdownCoordinator, ShutdownSummary, StandardOperationReporter,
};
use crate::application::supervisor::{LoopStatus, LoopSupervisor, RestartPolicy};
use crate::application::trust_monitor::{TrustMonitor, TRUST_SETTLE_DELAY};
use crate::domain::error_log::{ErrorLog, RecordedError};
use crate::domain::events::ControlPlaneEvent;
use crate::domain::plugin::AccessLevel;

/// Fixed delays of the background loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTimings {
    pub scheduler_interval: Duration,
    pub trust_settle_delay: Duration,
    pub resume_delay: Duration,
    pub restart_policy: RestartPolicy,
}

impl Default for LoopTimings {
    fn default() -> Self {
        Self {
            scheduler_interval: SCHEDULER_INTERVAL,
            trust_settle_delay: TRUST_SETTLE_DELAY,
            resume_delay: RESUME_DELAY,
            restart_policy: RestartPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct BootReport {
    pub requirements: RequirementSummary,
    pub contacts: RegistrationSummary,
    pub plugins: PluginLoadReport,
    pub abilities_loaded: usize,
    pub expansions: usize,
}

pub struct ControlPlane {
    services: Services,
    errors: ErrorLog,
    plugins: PluginManager,
    contacts: ContactRegistry,
    launcher: OperationLauncher,
    supervisor: LoopSupervisor,
    probe: Arc<dyn VersionProbe>,
    reporter: Arc<dyn OperationReporter>,
    timings: LoopTimings,
}

impl ControlPlane {
    pub fn new(services: Services, hooks: HookRegistry, contacts: ContactRegistry) -> Self {
        let timings = LoopTimings::default();
        Self {
            plugins: PluginManager::new(services.clone(), hooks),
            launcher: OperationLauncher::new(services.clone(), Arc::new(ChainRunner::default())),
            supervisor: LoopSupervisor::new(
                timings.restart_policy,
                services.events.clone(),
                services.clock.clone(),
            ),
            errors: ErrorLog::new(),
            contacts,
            probe: Arc::new(CommandVersionProbe::new()),
            reporter: Arc::new(StandardOperationReporter),
            timings,
            services,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn OperationRunner>) -> Self {
        self.launcher = OperationLauncher::new(self.services.clone(), runner);
        self
    }

    pub fn with_version_probe(mut self, probe: Arc<dyn VersionProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn OperationReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_timings(mut self, timings: LoopTimings) -> Self {
        self.supervisor = LoopSupervisor::new(
            timings.restart_policy,
            self.services.events.clone(),
            self.services.clock.clone(),
        );
        self.timings = timings;
        self
    }

    /// Runs the boot sequence. Fails on unrecoverable problems only: an
    /// unreadable snapshot or a broken plugin installation (a
    /// [`PluginError`](crate::domain::plugin::PluginError), downcastable from
    /// the returned error).
    pub async fn boot(&self) -> Result<BootReport> {
        info!("Booting control plane from {}", self.services.layout.root().display());

        self.services
            .data
            .restore_state()
            .await
            .context("Failed to restore object store")?;
        self.services
            .knowledge
            .restore_state()
            .await
            .context("Failed to restore knowledge store")?;

        let main = self.services.config.main();
        let requirements = RequirementValidator::new(self.probe.clone(), self.errors.clone())
            .validate_requirements(&main.requirements)
            .await;

        let contacts = self.contacts.register_all(&self.services).await;

        let mut abilities_loaded = self
            .services
            .abilities
            .load_directory(
                &self.services.layout.data_dir().join("abilities"),
                AccessLevel::App,
                None,
            )
            .await;

        let mut batch = self.plugins.installed_plugins();
        for name in &main.plugins {
            if !batch.contains(name) {
                batch.push(name.clone());
            }
        }
        let plugins = self.plugins.load_plugins(&batch).await?;

        for plugin in self.plugins.loaded_plugins().await {
            if let (true, Some(data_dir)) = (plugin.enabled, plugin.data_dir.as_ref()) {
                abilities_loaded += self
                    .services
                    .abilities
                    .load_directory(&data_dir.join("abilities"), plugin.access, Some(&plugin.name))
                    .await;
            }
        }

        let expansions = self.plugins.load_plugin_expansions().await;

        self.start_background_loops();

        self.services.events.publish(ControlPlaneEvent::BootCompleted {
            plugins_loaded: plugins.loaded.len(),
            completed_at: self.services.clock.now(),
        });
        info!(
            "Boot complete: {} plugins loaded, {} abilities, {} errors recorded",
            plugins.loaded.len(),
            abilities_loaded,
            self.errors.len()
        );

        Ok(BootReport {
            requirements,
            contacts,
            plugins,
            abilities_loaded,
            expansions,
        })
    }

    fn start_background_loops(&self) {
        let services = &self.services;
        self.supervisor.spawn(Arc::new(
            TrustMonitor::new(services.clone()).with_settle_delay(self.timings.trust_settle_delay),
        ));
        self.supervisor.spawn(Arc::new(
            OperationScheduler::new(services.clone(), self.launcher.clone())
                .with_interval(self.timings.scheduler_interval),
        ));
        self.supervisor
            .spawn(Arc::new(AbilityFileWatcher::new(services.clone())));
        self.supervisor.spawn(Arc::new(
            OperationResumer::new(services.clone(), self.launcher.clone())
                .with_delay(self.timings.resume_delay),
        ));
    }

    /// Persists all state. Background loops are left running.
    pub async fn shutdown(&self, main_config_file: &str) -> ShutdownSummary {
        ShutdownCoordinator::new(self.services.clone(), self.plugins.clone(), self.reporter.clone())
            .teardown(main_config_file)
            .await
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn errors(&self) -> Vec<RecordedError> {
        self.errors.errors()
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn launcher(&self) -> &OperationLauncher {
        &self.launcher
    }

    pub fn supervisor(&self) -> &LoopSupervisor {
        &self.supervisor
    }

    pub fn health(&self) -> BTreeMap<String, LoopStatus> {
        self.supervisor.health()
    }

    pub fn template_paths(&self) -> Vec<PathBuf> {
        self.plugins.template_paths()
    }

    pub fn operations(&self) -> OperationQueries {
        OperationQueries::new(self.services.clone())
    }

    pub fn ability_catalog(&self) -> AbilityCatalog {
        AbilityCatalog::new(self.services.clone())
    }
}
