// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Constructs every known contact and tunnel and registers it with the
//! contact service. Each registration stands alone: one contact that fails
//! to build or start is logged and the rest still register.

use std::sync::Arc;

use tracing::{error, info};

use crate::application::services::Services;
use crate::domain::contact::{Contact, ContactError, Tunnel};

pub type ContactFactory = Arc<dyn Fn(&Services) -> Result<Arc<dyn Contact>, ContactError> + Send + Sync>;
pub type TunnelFactory = Arc<dyn Fn(&Services) -> Result<Arc<dyn Tunnel>, ContactError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ContactRegistry {
    contacts: Vec<(String, ContactFactory)>,
    tunnels: Vec<(String, TunnelFactory)>,
}

#[derive(Debug, Default)]
pub struct RegistrationSummary {
    pub contacts: Vec<String>,
    pub tunnels: Vec<String>,
    pub failures: Vec<(String, ContactError)>,
}

impl RegistrationSummary {
    pub fn registered(&self) -> usize {
        self.contacts.len() + self.tunnels.len()
    }
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Services) -> Result<Arc<dyn Contact>, ContactError> + Send + Sync + 'static,
    {
        self.contacts.push((name.into(), Arc::new(factory)));
        self
    }

    pub fn tunnel<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Services) -> Result<Arc<dyn Tunnel>, ContactError> + Send + Sync + 'static,
    {
        self.tunnels.push((name.into(), Arc::new(factory)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.tunnels.is_empty()
    }

    /// Contacts first, then tunnels, each in registration order.
    pub async fn register_all(&self, services: &Services) -> RegistrationSummary {
        let mut summary = RegistrationSummary::default();

        for (name, factory) in &self.contacts {
            let outcome = match factory(services) {
                Ok(contact) => services.contacts.register_contact(contact).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => summary.contacts.push(name.clone()),
                Err(e) => {
                    error!("Failed to register contact {}: {}", name, e);
                    summary.failures.push((name.clone(), e));
                }
            }
        }

        for (name, factory) in &self.tunnels {
            let outcome = match factory(services) {
                Ok(tunnel) => services.contacts.register_tunnel(tunnel).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => summary.tunnels.push(name.clone()),
                Err(e) => {
                    error!("Failed to register tunnel {}: {}", name, e);
                    summary.failures.push((name.clone(), e));
                }
            }
        }

        info!(
            "Registered {} contacts and {} tunnels",
            summary.contacts.len(),
            summary.tunnels.len()
        );
        summary
    }
}
