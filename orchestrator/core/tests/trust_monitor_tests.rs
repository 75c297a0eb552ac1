// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use bastion_core::application::services::{Layout, Services};
use bastion_core::application::trust_monitor::TrustMonitor;
use bastion_core::domain::agent::Agent;
use bastion_core::domain::clock::ManualClock;
use bastion_core::domain::events::ControlPlaneEvent;
use bastion_core::domain::repository::{AgentQuery, DataStore};
use bastion_core::domain::server_config::ConfigSet;
use bastion_core::infrastructure::ConfigStore;

use common::{at, Interleaved, ScriptedStore};

fn services(clock: Arc<ManualClock>) -> Services {
    Services::ephemeral(
        Layout::new("/nonexistent"),
        ConfigStore::in_memory(ConfigSet::default()),
        clock,
    )
}

async fn is_trusted(services: &Services, paw: &str) -> bool {
    services
        .data
        .locate_agents(&AgentQuery::by_paw(paw))
        .await
        .unwrap()
        .remove(0)
        .trusted
}

#[tokio::test]
async fn test_agent_silent_past_timer_and_sleep_max_is_untrusted() {
    let now = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(now));
    let services = services(clock.clone());
    let mut events = services.events.subscribe();

    // untrusted_timer 90 + sleep_max 60 = 150s of allowed silence
    services
        .data
        .store_agent(Agent::new("gone", now - ChronoDuration::seconds(151)))
        .await
        .unwrap();
    services
        .data
        .store_agent(Agent::new("fresh", now - ChronoDuration::seconds(10)))
        .await
        .unwrap();

    let outcome = TrustMonitor::new(services.clone()).sweep().await.unwrap();

    assert_eq!(outcome.untrusted, vec!["gone".to_string()]);
    assert!(!is_trusted(&services, "gone").await);
    assert!(is_trusted(&services, "fresh").await);
    assert!((outcome.next_check - 80.0).abs() < 0.001);

    let untrusted_events: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, ControlPlaneEvent::AgentUntrusted { .. }))
        .collect();
    assert_eq!(untrusted_events.len(), 1);
}

#[tokio::test]
async fn test_agent_within_sleep_max_slack_stays_trusted_with_negative_next_check() {
    let now = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(now));
    let services = services(clock);

    services
        .data
        .store_agent(Agent::new("slow", now - ChronoDuration::seconds(100)))
        .await
        .unwrap();

    let outcome = TrustMonitor::new(services.clone()).sweep().await.unwrap();

    assert!(outcome.untrusted.is_empty());
    assert!(is_trusted(&services, "slow").await);
    assert!((outcome.next_check + 10.0).abs() < 0.001);
}

#[tokio::test]
async fn test_untrusted_timer_is_reread_each_sweep() {
    let now = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(now));
    let services = services(clock);
    services
        .data
        .store_agent(Agent::new("idle", now - ChronoDuration::seconds(100)))
        .await
        .unwrap();

    let monitor = TrustMonitor::new(services.clone());
    assert!(monitor.sweep().await.unwrap().untrusted.is_empty());

    services.config.update_agents(|agents| agents.untrusted_timer = 30);
    let outcome = monitor.sweep().await.unwrap();
    assert_eq!(outcome.untrusted, vec!["idle".to_string()]);
}

#[tokio::test]
async fn test_store_failure_for_one_agent_does_not_stop_the_sweep() {
    let now = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(now));
    let store: Arc<dyn DataStore> = Arc::new(ScriptedStore {
        refuse_revoke: Some("stuck".to_string()),
        ..ScriptedStore::default()
    });
    let mut services = services(clock);
    services.data = store;

    for paw in ["stuck", "other"] {
        services
            .data
            .store_agent(Agent::new(paw, now - ChronoDuration::seconds(500)))
            .await
            .unwrap();
    }

    let outcome = TrustMonitor::new(services.clone()).sweep().await.unwrap();

    assert_eq!(outcome.untrusted, vec!["other".to_string()]);
    assert!(is_trusted(&services, "stuck").await);
    assert!(!is_trusted(&services, "other").await);
}

#[tokio::test]
async fn test_check_in_during_sweep_keeps_trust() {
    let now = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(now));
    let store = Arc::new(ScriptedStore::default());
    let mut services = services(clock);
    services.data = store.clone();

    let mut agent = Agent::new("chatty", now - ChronoDuration::seconds(500));
    agent.host = "ws-17".to_string();
    services.data.store_agent(agent).await.unwrap();
    // The agent beacons right after the monitor read the trusted list.
    store.interleave(Interleaved::Beacon {
        paw: "chatty".to_string(),
        at: now,
    });
    let mut events = services.events.subscribe();

    let outcome = TrustMonitor::new(services.clone()).sweep().await.unwrap();

    assert!(outcome.untrusted.is_empty());
    let stored = services
        .data
        .locate_agents(&AgentQuery::by_paw("chatty"))
        .await
        .unwrap()
        .remove(0);
    assert!(stored.trusted);
    assert_eq!(stored.last_trusted_seen, now);
    assert_eq!(stored.last_seen, now);
    assert_eq!(stored.host, "ws-17");
    assert!(!events
        .drain()
        .into_iter()
        .any(|e| matches!(e, ControlPlaneEvent::AgentUntrusted { .. })));
}

#[tokio::test]
async fn test_revocation_leaves_other_fields_alone() {
    let now = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(now));
    let services = services(clock);
    let silent_since = now - ChronoDuration::seconds(500);
    let mut agent = Agent::new("gone", silent_since);
    agent.platform = "linux".to_string();
    services.data.store_agent(agent).await.unwrap();

    TrustMonitor::new(services.clone()).sweep().await.unwrap();

    let stored = services
        .data
        .locate_agents(&AgentQuery::by_paw("gone"))
        .await
        .unwrap()
        .remove(0);
    assert!(!stored.trusted);
    assert_eq!(stored.last_trusted_seen, silent_since);
    assert_eq!(stored.platform, "linux");
}

#[tokio::test(start_paused = true)]
async fn test_loop_waits_for_timer_before_first_sweep() {
    use bastion_core::application::supervisor::BackgroundLoop;

    let start = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(start));
    let services = services(clock.clone());
    services
        .data
        .store_agent(Agent::new("quiet", start))
        .await
        .unwrap();
    clock.advance(ChronoDuration::seconds(400));

    let monitor = TrustMonitor::new(services.clone()).with_settle_delay(Duration::from_secs(15));
    let handle = tokio::spawn(async move { monitor.run().await });

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(is_trusted(&services, "quiet").await);

    // first sweep happens after untrusted_timer + 1 seconds
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert!(!is_trusted(&services, "quiet").await);

    handle.abort();
}
