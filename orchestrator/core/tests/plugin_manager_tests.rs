// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::path::Path;
use std::sync::Arc;

use bastion_core::application::plugin_manager::{HookRegistry, PluginHook, PluginManager};
use bastion_core::application::services::Services;
use bastion_core::domain::clock::SystemClock;
use bastion_core::domain::plugin::PluginError;
use bastion_core::domain::repository::PluginQuery;

use common::{config_with, install_plugin, services_at, RecordingHook};

fn registry_with(hooks: &[(&str, Arc<RecordingHook>)]) -> HookRegistry {
    let mut registry = HookRegistry::new();
    for (module, hook) in hooks {
        let hook = hook.clone();
        registry.register(*module, move || Ok(hook.clone() as Arc<dyn PluginHook>));
    }
    registry
}

fn services(root: &Path, active: &[&str]) -> Services {
    let active: Vec<String> = active.iter().map(|s| s.to_string()).collect();
    services_at(
        root,
        config_with(|c| c.main.plugins = active),
        Arc::new(SystemClock),
    )
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_missing_installation_is_fatal_before_anything_loads() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "stockpile", None);
    let stockpile = Arc::new(RecordingHook::default());
    let services = services(root.path(), &["stockpile"]);
    let manager = PluginManager::new(services.clone(), registry_with(&[("stockpile", stockpile.clone())]));

    let err = manager
        .load_plugins(&names(&["stockpile", "ghost"]))
        .await
        .err()
        .unwrap();

    assert!(err.is_fatal());
    assert!(matches!(err, PluginError::MissingInstallation { ref name, .. } if name == "ghost"));
    assert!(manager.loaded_names().is_empty());
    assert!(services
        .data
        .locate_plugins(&PluginQuery::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(RecordingHook::count(&stockpile.enables), 0);
}

#[tokio::test]
async fn test_directory_without_hook_descriptor_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("plugins").join("bare")).unwrap();
    let manager = PluginManager::new(services(root.path(), &[]), HookRegistry::new());

    let err = manager.load_plugins(&names(&["bare"])).await.err().unwrap();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_failing_import_is_skipped_while_sibling_loads_and_enables() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "broken", None);
    install_plugin(root.path(), "stockpile", None);
    let stockpile = Arc::new(RecordingHook::default());
    let services = services(root.path(), &["broken", "stockpile"]);
    let manager = PluginManager::new(services.clone(), registry_with(&[("stockpile", stockpile.clone())]));

    let report = manager
        .load_plugins(&names(&["broken", "stockpile"]))
        .await
        .unwrap();

    assert_eq!(report.loaded, vec!["stockpile"]);
    assert_eq!(report.enabled, vec!["stockpile"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "broken");
    assert_eq!(manager.loaded_names(), vec!["stockpile"]);

    let stored = services
        .data
        .locate_plugins(&PluginQuery::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "stockpile");
    assert!(stored[0].enabled);
    assert_eq!(RecordingHook::count(&stockpile.enables), 1);
}

#[tokio::test]
async fn test_descriptor_module_selects_the_hook() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "caldera-extra", Some("extra"));
    let extra = Arc::new(RecordingHook::default());
    let services = services(root.path(), &[]);
    let manager = PluginManager::new(services.clone(), registry_with(&[("extra", extra)]));

    let report = manager
        .load_plugins(&names(&["caldera-extra"]))
        .await
        .unwrap();

    assert_eq!(report.loaded, vec!["caldera-extra"]);
    assert!(report.enabled.is_empty());
    let stored = services
        .data
        .locate_plugins(&PluginQuery::by_name("caldera-extra"))
        .await
        .unwrap();
    assert_eq!(stored[0].description.as_deref(), Some("caldera-extra plugin"));
    assert!(!stored[0].enabled);
}

#[tokio::test]
async fn test_enable_failure_is_logged_not_fatal() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "flaky", None);
    let flaky = Arc::new(RecordingHook::failing());
    let services = services(root.path(), &["flaky"]);
    let mut events = services.events.subscribe();
    let manager = PluginManager::new(services.clone(), registry_with(&[("flaky", flaky)]));

    let report = manager.load_plugins(&names(&["flaky"])).await.unwrap();

    assert_eq!(report.loaded, vec!["flaky"]);
    assert_eq!(report.enable_failed, vec!["flaky"]);
    let stored = manager.loaded_plugins().await;
    assert!(!stored[0].enabled);
    assert!(events.drain().iter().any(|e| matches!(
        e,
        bastion_core::domain::events::ControlPlaneEvent::PluginFailed { stage, .. } if stage == "enable"
    )));
}

#[tokio::test]
async fn test_enable_sets_data_dir_when_present() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "stockpile", None);
    let data_dir = root.path().join("plugins").join("stockpile").join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    let services = services(root.path(), &["stockpile"]);
    let manager = PluginManager::new(
        services,
        registry_with(&[("stockpile", Arc::new(RecordingHook::default()))]),
    );

    manager.load_plugins(&names(&["stockpile"])).await.unwrap();

    let plugins = manager.loaded_plugins().await;
    assert_eq!(plugins[0].data_dir.as_deref(), Some(data_dir.as_path()));
}

#[tokio::test]
async fn test_destroy_and_expand_only_touch_enabled_plugins() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "active", None);
    install_plugin(root.path(), "dormant", None);
    let active = Arc::new(RecordingHook::default());
    let dormant = Arc::new(RecordingHook::default());
    let services = services(root.path(), &["active"]);
    let manager = PluginManager::new(
        services,
        registry_with(&[("active", active.clone()), ("dormant", dormant.clone())]),
    );
    manager
        .load_plugins(&names(&["active", "dormant"]))
        .await
        .unwrap();

    assert_eq!(manager.load_plugin_expansions().await, 1);
    assert_eq!(manager.destroy_all().await, 1);

    assert_eq!(RecordingHook::count(&active.expansions), 1);
    assert_eq!(RecordingHook::count(&active.destroys), 1);
    assert_eq!(RecordingHook::count(&dormant.expansions), 0);
    assert_eq!(RecordingHook::count(&dormant.destroys), 0);
}

#[tokio::test]
async fn test_hidden_names_are_ignored_and_boot_signal_flips() {
    let root = tempfile::tempdir().unwrap();
    install_plugin(root.path(), "stockpile", None);
    std::fs::create_dir_all(root.path().join("plugins").join(".git")).unwrap();
    let manager = PluginManager::new(
        services(root.path(), &[]),
        registry_with(&[("stockpile", Arc::new(RecordingHook::default()))]),
    );

    assert_eq!(manager.installed_plugins(), vec!["stockpile"]);
    assert!(!manager.is_boot_complete());

    let report = manager
        .load_plugins(&names(&[".git", "stockpile"]))
        .await
        .unwrap();
    manager.wait_for_boot().await;

    assert_eq!(report.loaded, vec!["stockpile"]);
    assert!(manager.is_boot_complete());
}

#[tokio::test]
async fn test_template_paths_follow_configured_plugins() {
    let root = tempfile::tempdir().unwrap();
    let manager = PluginManager::new(services(root.path(), &["Sandcat", "stockpile"]), HookRegistry::new());

    let paths = manager.template_paths();
    let plugins = root.path().join("plugins");
    assert_eq!(
        paths,
        vec![
            plugins.join("sandcat").join("templates"),
            plugins.join("stockpile").join("templates"),
            root.path().join("templates"),
        ]
    );
}
