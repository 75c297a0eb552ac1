// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process registry of started contacts and tunnels, plus the beacon
//! ledger the aggregate contact report is rendered from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::domain::contact::{Contact, ContactError, ContactService, Tunnel};

#[derive(Debug, Clone, Serialize)]
struct BeaconRecord {
    paw: String,
    date: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct InMemoryContactService {
    contacts: Arc<RwLock<Vec<Arc<dyn Contact>>>>,
    tunnels: Arc<RwLock<Vec<Arc<dyn Tunnel>>>>,
    beacons: Arc<RwLock<BTreeMap<String, Vec<BeaconRecord>>>>,
}

impl InMemoryContactService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `paw` reached the control plane through `contact`.
    pub fn record_beacon(&self, contact: &str, paw: &str, at: DateTime<Utc>) {
        self.beacons
            .write()
            .entry(contact.to_string())
            .or_default()
            .push(BeaconRecord {
                paw: paw.to_string(),
                date: at,
            });
    }
}

#[async_trait]
impl ContactService for InMemoryContactService {
    async fn register_contact(&self, contact: Arc<dyn Contact>) -> Result<(), ContactError> {
        if self.contacts.read().iter().any(|c| c.name() == contact.name()) {
            return Err(ContactError::Duplicate(contact.name().to_string()));
        }
        contact.start().await?;
        info!("Registered contact: {}", contact.name());
        self.contacts.write().push(contact);
        Ok(())
    }

    async fn register_tunnel(&self, tunnel: Arc<dyn Tunnel>) -> Result<(), ContactError> {
        if self.tunnels.read().iter().any(|t| t.name() == tunnel.name()) {
            return Err(ContactError::Duplicate(tunnel.name().to_string()));
        }
        tunnel.start().await?;
        info!("Registered contact tunnel: {}", tunnel.name());
        self.tunnels.write().push(tunnel);
        Ok(())
    }

    fn contacts(&self) -> Vec<Arc<dyn Contact>> {
        self.contacts.read().clone()
    }

    fn tunnels(&self) -> Vec<Arc<dyn Tunnel>> {
        self.tunnels.read().clone()
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(&*self.beacons.read()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Loopback;

    #[async_trait]
    impl Contact for Loopback {
        fn name(&self) -> &str {
            "loopback"
        }

        fn description(&self) -> &str {
            "in-process test channel"
        }

        async fn start(&self) -> Result<(), ContactError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_contact_is_rejected() {
        let service = InMemoryContactService::new();
        service.register_contact(Arc::new(Loopback)).await.unwrap();
        let err = service.register_contact(Arc::new(Loopback)).await.unwrap_err();
        assert!(matches!(err, ContactError::Duplicate(name) if name == "loopback"));
        assert_eq!(service.contacts().len(), 1);
    }

    #[test]
    fn test_report_groups_beacons_by_contact() {
        let service = InMemoryContactService::new();
        let now = Utc::now();
        service.record_beacon("http", "abc123", now);
        service.record_beacon("http", "def456", now);
        service.record_beacon("tcp", "abc123", now);

        let report = service.report();
        assert_eq!(report["http"].as_array().unwrap().len(), 2);
        assert_eq!(report["tcp"][0]["paw"], "abc123");
    }
}
