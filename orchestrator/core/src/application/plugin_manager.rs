// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Plugin Manager
//!
//! Plugins are installed under `plugins/<name>/` and must carry a
//! `hook.yml` descriptor. Their executable side is a [`PluginHook`]
//! registered in a [`HookRegistry`] at startup; the descriptor names which
//! registered hook the directory binds to (the plugin name by default).
//!
//! ## Boot sequence
//!
//! 1. Every requested name is checked for a complete installation before
//!    anything is loaded. A missing directory or descriptor is fatal.
//! 2. Plugins load concurrently. A plugin whose hook cannot be resolved is
//!    logged and skipped; it is neither persisted nor listed as loaded.
//! 3. Loaded plugins named in the main config's `plugins` list are enabled.
//!    Enable failures are logged and never abort boot.
//! 4. The boot-complete signal flips once every load has settled.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::application::services::Services;
use crate::domain::events::ControlPlaneEvent;
use crate::domain::plugin::{AccessLevel, HookDescriptor, Plugin, PluginError, HOOK_DESCRIPTOR};
use crate::domain::repository::PluginQuery;

/// Executable side of a plugin.
#[async_trait]
pub trait PluginHook: Send + Sync {
    fn description(&self) -> &str;

    /// Web address the plugin serves its UI from, if any.
    fn address(&self) -> Option<&str> {
        None
    }

    fn access(&self) -> AccessLevel {
        AccessLevel::App
    }

    async fn enable(&self, services: &Services) -> Result<()>;

    fn has_destroy(&self) -> bool {
        false
    }

    async fn destroy(&self, _services: &Services) -> Result<()> {
        Ok(())
    }

    fn has_expansion(&self) -> bool {
        false
    }

    async fn expansion(&self, _services: &Services) -> Result<()> {
        Ok(())
    }
}

pub type HookFactory = Arc<dyn Fn() -> Result<Arc<dyn PluginHook>> + Send + Sync>;

/// Startup registry of hook constructors, keyed by module name.
#[derive(Clone, Default)]
pub struct HookRegistry {
    factories: BTreeMap<String, HookFactory>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, module: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn PluginHook>> + Send + Sync + 'static,
    {
        self.factories.insert(module.into(), Arc::new(factory));
        self
    }

    pub fn with<F>(mut self, module: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn PluginHook>> + Send + Sync + 'static,
    {
        self.register(module, factory);
        self
    }

    pub fn modules(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Constructs the hook registered under `module` for plugin `name`.
    pub fn resolve(&self, name: &str, module: &str) -> Result<Arc<dyn PluginHook>, PluginError> {
        let factory = self.factories.get(module).ok_or_else(|| PluginError::Import {
            name: name.to_string(),
            reason: format!("no hook registered for module \"{}\"", module),
        })?;
        factory().map_err(|e| PluginError::Import {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

#[derive(Clone)]
pub struct LoadedPlugin {
    pub name: String,
    pub hook: Arc<dyn PluginHook>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPlugin {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PluginLoadReport {
    /// Names in load-completion order.
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedPlugin>,
    pub enabled: Vec<String>,
    pub enable_failed: Vec<String>,
}

enum LoadOutcome {
    Loaded { name: String, enabled: Option<bool> },
    Skipped(SkippedPlugin),
}

impl PluginLoadReport {
    fn absorb(&mut self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Loaded { name, enabled } => {
                match enabled {
                    Some(true) => self.enabled.push(name.clone()),
                    Some(false) => self.enable_failed.push(name.clone()),
                    None => {}
                }
                self.loaded.push(name);
            }
            LoadOutcome::Skipped(skipped) => self.skipped.push(skipped),
        }
    }
}

#[derive(Clone)]
pub struct PluginManager {
    services: Services,
    hooks: Arc<HookRegistry>,
    loaded: Arc<RwLock<Vec<LoadedPlugin>>>,
    boot_complete: Arc<watch::Sender<bool>>,
}

impl PluginManager {
    pub fn new(services: Services, hooks: HookRegistry) -> Self {
        let (boot_complete, _) = watch::channel(false);
        Self {
            services,
            hooks: Arc::new(hooks),
            loaded: Arc::new(RwLock::new(Vec::new())),
            boot_complete: Arc::new(boot_complete),
        }
    }

    /// Directory names under `plugins/`, hidden entries excluded.
    pub fn installed_plugins(&self) -> Vec<String> {
        let root = self.services.layout.plugins_dir();
        let Ok(entries) = std::fs::read_dir(&root) else {
            debug!("No plugin directory at {}", root.display());
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| !n.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    /// Confirms `plugins/<name>/` exists and carries a hook descriptor.
    pub fn check_installation(&self, name: &str) -> Result<PathBuf, PluginError> {
        let dir = Plugin::new(name).install_dir(&self.services.layout.plugins_dir());
        let descriptor = dir.join(HOOK_DESCRIPTOR);
        if dir.is_dir() && descriptor.is_file() {
            Ok(dir)
        } else {
            Err(PluginError::MissingInstallation {
                name: name.to_string(),
                path: dir,
            })
        }
    }

    /// Loads a batch of plugins. Returns `Err` only for a fatal installation
    /// problem, in which case nothing in the batch was loaded.
    pub async fn load_plugins(&self, names: &[String]) -> Result<PluginLoadReport, PluginError> {
        let mut batch: Vec<String> = Vec::new();
        for name in names.iter().filter(|n| !n.starts_with('.')) {
            if !batch.contains(name) {
                batch.push(name.clone());
            }
        }

        for name in &batch {
            if let Err(e) = self.check_installation(name) {
                error!("{}", e);
                return Err(e);
            }
        }

        let mut tasks = JoinSet::new();
        for name in batch {
            let this = self.clone();
            tasks.spawn(async move { this.load(name).await });
        }

        let mut report = PluginLoadReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => error!("Plugin load task aborted: {}", e),
            }
        }

        info!(
            "Loaded {} plugins ({} enabled, {} skipped)",
            report.loaded.len(),
            report.enabled.len(),
            report.skipped.len()
        );
        self.boot_complete.send_replace(true);
        Ok(report)
    }

    async fn load(&self, name: String) -> LoadOutcome {
        let (hook, descriptor) = match self.import(&name).await {
            Ok(found) => found,
            Err(e) => {
                error!("{}", e);
                self.publish_failure(&name, "import", &e);
                return LoadOutcome::Skipped(SkippedPlugin {
                    name,
                    reason: e.to_string(),
                });
            }
        };

        let mut plugin = Plugin::new(&name);
        plugin.description = descriptor
            .description
            .or_else(|| Some(hook.description().to_string()));
        plugin.address = hook.address().map(str::to_string);
        plugin.access = hook.access();

        if let Err(e) = self.services.data.store_plugin(plugin).await {
            error!("Failed to store plugin={}: {}", name, e);
            return LoadOutcome::Skipped(SkippedPlugin {
                name,
                reason: e.to_string(),
            });
        }

        self.loaded.write().push(LoadedPlugin {
            name: name.clone(),
            hook,
        });
        debug!("Loaded plugin={}", name);
        self.services.events.publish(ControlPlaneEvent::PluginLoaded {
            name: name.clone(),
            loaded_at: self.services.clock.now(),
        });

        let enabled = if self.services.config.main().is_plugin_active(&name) {
            Some(self.enable(&name).await.is_ok())
        } else {
            None
        };
        LoadOutcome::Loaded { name, enabled }
    }

    async fn import(&self, name: &str) -> Result<(Arc<dyn PluginHook>, HookDescriptor), PluginError> {
        let path = self.check_installation(name)?.join(HOOK_DESCRIPTOR);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PluginError::Import {
                name: name.to_string(),
                reason: format!("cannot read {}: {}", path.display(), e),
            })?;
        let descriptor: HookDescriptor = if raw.trim().is_empty() {
            HookDescriptor::default()
        } else {
            serde_yaml::from_str(&raw).map_err(|e| PluginError::Import {
                name: name.to_string(),
                reason: format!("invalid {}: {}", path.display(), e),
            })?
        };
        let module = descriptor.module.clone().unwrap_or_else(|| name.to_string());
        let hook = self.hooks.resolve(name, &module)?;
        Ok((hook, descriptor))
    }

    fn hook(&self, name: &str) -> Option<Arc<dyn PluginHook>> {
        self.loaded
            .read()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.hook.clone())
    }

    async fn record(&self, name: &str) -> Option<Plugin> {
        match self.services.data.locate_plugins(&PluginQuery::by_name(name)).await {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                warn!("Failed to locate plugin={}: {}", name, e);
                None
            }
        }
    }

    /// Enables a loaded plugin. Sets its data directory when
    /// `plugins/<name>/data` exists, runs the hook, and persists the
    /// enabled flag on success.
    pub async fn enable(&self, name: &str) -> Result<(), PluginError> {
        let enable_error = |reason: String| PluginError::Enable {
            name: name.to_string(),
            reason,
        };
        let hook = self
            .hook(name)
            .ok_or_else(|| enable_error("plugin is not loaded".to_string()))?;
        let mut plugin = self.record(name).await.unwrap_or_else(|| Plugin::new(name));

        let data_dir = plugin
            .install_dir(&self.services.layout.plugins_dir())
            .join("data");
        if data_dir.is_dir() {
            plugin.data_dir = Some(data_dir);
        }

        if let Err(e) = hook.enable(&self.services).await {
            let err = enable_error(format!("{:#}", e));
            error!("{}", err);
            self.publish_failure(name, "enable", &err);
            return Err(err);
        }

        plugin.enabled = true;
        self.services
            .data
            .store_plugin(plugin)
            .await
            .map_err(|e| enable_error(e.to_string()))?;
        info!("Enabled plugin={}", name);
        self.services.events.publish(ControlPlaneEvent::PluginEnabled {
            name: name.to_string(),
            enabled_at: self.services.clock.now(),
        });
        Ok(())
    }

    async fn is_enabled(&self, name: &str) -> bool {
        self.record(name).await.is_some_and(|p| p.enabled)
    }

    /// Runs the destroy hook of a currently enabled plugin. `Ok(false)` when
    /// there was nothing to do.
    pub async fn destroy(&self, name: &str) -> Result<bool, PluginError> {
        let Some(hook) = self.hook(name) else {
            return Ok(false);
        };
        if !hook.has_destroy() || !self.is_enabled(name).await {
            return Ok(false);
        }
        hook.destroy(&self.services).await.map_err(|e| PluginError::Destroy {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })?;
        Ok(true)
    }

    /// Runs the expansion hook of a currently enabled plugin.
    pub async fn expand(&self, name: &str) -> Result<bool, PluginError> {
        let Some(hook) = self.hook(name) else {
            return Ok(false);
        };
        if !hook.has_expansion() || !self.is_enabled(name).await {
            return Ok(false);
        }
        hook.expansion(&self.services).await.map_err(|e| PluginError::Expand {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })?;
        Ok(true)
    }

    /// Destroys every enabled plugin, in load order. Failures are logged and
    /// do not stop the remaining plugins.
    pub async fn destroy_all(&self) -> usize {
        let mut destroyed = 0;
        for name in self.loaded_names() {
            match self.destroy(&name).await {
                Ok(true) => destroyed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("{}", e);
                    self.publish_failure(&name, "destroy", &e);
                }
            }
        }
        destroyed
    }

    /// Runs every enabled plugin's expansion hook, in load order.
    pub async fn load_plugin_expansions(&self) -> usize {
        let mut expanded = 0;
        for name in self.loaded_names() {
            match self.expand(&name).await {
                Ok(true) => expanded += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("{}", e);
                    self.publish_failure(&name, "expansion", &e);
                }
            }
        }
        expanded
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.loaded.read().iter().map(|p| p.name.clone()).collect()
    }

    /// Current records of every loaded plugin, in load order.
    pub async fn loaded_plugins(&self) -> Vec<Plugin> {
        let mut plugins = Vec::new();
        for name in self.loaded_names() {
            if let Some(plugin) = self.record(&name).await {
                plugins.push(plugin);
            }
        }
        plugins
    }

    /// Template search path: every configured plugin's `templates/`
    /// directory, then the core `templates/`.
    pub fn template_paths(&self) -> Vec<PathBuf> {
        let plugins_dir = self.services.layout.plugins_dir();
        let mut paths: Vec<PathBuf> = self
            .services
            .config
            .main()
            .plugins
            .iter()
            .map(|p| Plugin::new(p.as_str()).install_dir(&plugins_dir).join("templates"))
            .collect();
        paths.push(self.services.layout.templates_dir());
        paths
    }

    pub fn boot_signal(&self) -> watch::Receiver<bool> {
        self.boot_complete.subscribe()
    }

    pub fn is_boot_complete(&self) -> bool {
        *self.boot_complete.borrow()
    }

    /// Resolves once the boot batch has finished loading.
    pub async fn wait_for_boot(&self) {
        let mut rx = self.boot_signal();
        if rx.wait_for(|done| *done).await.is_err() {
            warn!("Boot signal dropped before plugins finished loading");
        }
    }

    fn publish_failure(&self, name: &str, stage: &str, error: &PluginError) {
        self.services.events.publish(ControlPlaneEvent::PluginFailed {
            name: name.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
            failed_at: self.services.clock.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    #[async_trait]
    impl PluginHook for Quiet {
        fn description(&self) -> &str {
            "does nothing"
        }

        async fn enable(&self, _services: &Services) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_resolves_registered_module() {
        let registry = HookRegistry::new().with("quiet", || Ok(Arc::new(Quiet) as Arc<dyn PluginHook>));
        let hook = registry.resolve("quiet", "quiet").unwrap();
        assert_eq!(hook.description(), "does nothing");
        assert_eq!(hook.access(), AccessLevel::App);
    }

    #[test]
    fn test_registry_unknown_module_is_import_error() {
        let registry = HookRegistry::new();
        let err = registry.resolve("stockpile", "stockpile").err().unwrap();
        assert!(matches!(err, PluginError::Import { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_failing_factory_is_import_error() {
        let registry = HookRegistry::new().with("broken", || anyhow::bail!("missing symbol"));
        let err = registry.resolve("broken", "broken").err().unwrap();
        assert!(err.to_string().contains("missing symbol"));
    }
}
