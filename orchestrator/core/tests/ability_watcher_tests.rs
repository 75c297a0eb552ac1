// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use bastion_core::application::ability_watcher::AbilityFileWatcher;
use bastion_core::application::services::Services;
use bastion_core::application::supervisor::BackgroundLoop;
use bastion_core::domain::ability::{Ability, AbilityQuery};
use bastion_core::domain::clock::ManualClock;
use bastion_core::domain::plugin::{AccessLevel, Plugin};
use bastion_core::domain::server_config::ConfigSet;

use common::services_at;

fn ability_yaml(id: &str) -> String {
    format!(
        r#"
- id: {id}
  name: Ability {id}
  tactic: discovery
  platforms:
    linux:
      sh:
        command: whoami
"#
    )
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn mtime(path: &Path) -> DateTime<Utc> {
    DateTime::from(std::fs::metadata(path).unwrap().modified().unwrap())
}

fn backdate(path: &Path, by: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

fn services(root: &Path, now: DateTime<Utc>) -> (Services, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let services = services_at(root, ConfigSet::default(), clock.clone());
    (services, clock)
}

async fn ability(services: &Services, id: &str) -> Option<Ability> {
    services
        .data
        .locate_abilities(&AbilityQuery::by_id(id))
        .await
        .unwrap()
        .into_iter()
        .next()
}

fn enabled_plugin(name: &str, data_dir: &Path, access: AccessLevel) -> Plugin {
    let mut plugin = Plugin::new(name);
    plugin.enabled = true;
    plugin.data_dir = Some(data_dir.to_path_buf());
    plugin.access = access;
    plugin
}

#[tokio::test]
async fn test_only_files_modified_within_refresh_window_are_reloaded() {
    let root = tempfile::tempdir().unwrap();
    let abilities = root.path().join("data").join("abilities");
    let fresh = write_file(&abilities, "fresh.yml", &ability_yaml("fresh-1"));
    let stale = write_file(&abilities, "stale.yml", &ability_yaml("stale-1"));
    backdate(&stale, Duration::from_secs(3600));

    // Default refresh window is 60 seconds.
    let (services, clock) = services(root.path(), mtime(&fresh) + ChronoDuration::seconds(5));
    let watcher = AbilityFileWatcher::new(services.clone());
    let sources = watcher.watched_sources().await.unwrap();

    assert_eq!(watcher.scan(&sources).await, 1);
    let loaded = ability(&services, "fresh-1").await.unwrap();
    assert_eq!(loaded.access, AccessLevel::App);
    assert_eq!(loaded.plugin, None);
    assert!(ability(&services, "stale-1").await.is_none());

    // Once the window has passed the fresh file is left alone too.
    clock.set(mtime(&fresh) + ChronoDuration::seconds(61));
    assert_eq!(watcher.scan(&sources).await, 0);
}

#[tokio::test]
async fn test_enabled_plugin_files_carry_its_access_level() {
    let root = tempfile::tempdir().unwrap();
    let plugin_data = root.path().join("plugins").join("stockpile").join("data");
    let path = write_file(&plugin_data.join("abilities"), "recon.yml", &ability_yaml("recon-1"));
    let (services, _clock) = services(root.path(), mtime(&path) + ChronoDuration::seconds(1));
    services
        .data
        .store_plugin(enabled_plugin("stockpile", &plugin_data, AccessLevel::Red))
        .await
        .unwrap();

    let watcher = AbilityFileWatcher::new(services.clone());
    let sources = watcher.watched_sources().await.unwrap();
    let names: Vec<&str> = sources.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["stockpile", "core"]);

    assert_eq!(watcher.scan(&sources).await, 1);
    let loaded = ability(&services, "recon-1").await.unwrap();
    assert_eq!(loaded.access, AccessLevel::Red);
    assert_eq!(loaded.plugin.as_deref(), Some("stockpile"));
    assert_eq!(loaded.source, Some(path));
}

#[tokio::test]
async fn test_disabled_and_dirless_plugins_are_not_watched() {
    let root = tempfile::tempdir().unwrap();
    let dormant_data = root.path().join("plugins").join("dormant").join("data");
    let path = write_file(&dormant_data.join("abilities"), "dormant.yml", &ability_yaml("dormant-1"));
    let (services, _clock) = services(root.path(), mtime(&path) + ChronoDuration::seconds(1));

    let mut dormant = enabled_plugin("dormant", &dormant_data, AccessLevel::Red);
    dormant.enabled = false;
    services.data.store_plugin(dormant).await.unwrap();
    let mut bare = Plugin::new("bare");
    bare.enabled = true;
    services.data.store_plugin(bare).await.unwrap();

    let watcher = AbilityFileWatcher::new(services.clone());
    let sources = watcher.watched_sources().await.unwrap();
    let names: Vec<&str> = sources.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["core"]);

    assert_eq!(watcher.scan(&sources).await, 0);
    assert!(ability(&services, "dormant-1").await.is_none());
}

#[tokio::test]
async fn test_malformed_file_is_skipped() {
    let root = tempfile::tempdir().unwrap();
    let abilities = root.path().join("data").join("abilities");
    write_file(&abilities, "broken.yml", "- id: [unterminated\n  name: {");
    let good = write_file(&abilities, "good.yml", &ability_yaml("good-1"));
    let (services, _clock) = services(root.path(), mtime(&good) + ChronoDuration::seconds(1));

    let watcher = AbilityFileWatcher::new(services.clone());
    let sources = watcher.watched_sources().await.unwrap();

    assert_eq!(watcher.scan(&sources).await, 1);
    assert!(ability(&services, "good-1").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_loop_waits_one_refresh_before_first_scan() {
    let root = tempfile::tempdir().unwrap();
    let path = write_file(
        &root.path().join("data").join("abilities"),
        "late.yml",
        &ability_yaml("late-1"),
    );
    let (services, _clock) = services(root.path(), mtime(&path) + ChronoDuration::seconds(1));

    let watcher = AbilityFileWatcher::new(services.clone());
    let handle = tokio::spawn(async move { watcher.run().await });

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(ability(&services, "late-1").await.is_none());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(ability(&services, "late-1").await.is_some());

    handle.abort();
}
