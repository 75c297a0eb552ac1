// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Contact and tunnel contracts. Concrete transports live outside the core;
//! the control plane only constructs and registers them.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A communication channel agents beacon through.
#[async_trait]
pub trait Contact: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn start(&self) -> Result<(), ContactError>;
}

/// A tunnel carrying traffic to a contact.
#[async_trait]
pub trait Tunnel: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn start(&self) -> Result<(), ContactError>;
}

#[async_trait]
pub trait ContactService: Send + Sync {
    async fn register_contact(&self, contact: Arc<dyn Contact>) -> Result<(), ContactError>;

    async fn register_tunnel(&self, tunnel: Arc<dyn Tunnel>) -> Result<(), ContactError>;

    fn contacts(&self) -> Vec<Arc<dyn Contact>>;

    fn tunnels(&self) -> Vec<Arc<dyn Tunnel>>;

    /// Aggregate contact report written at shutdown.
    fn report(&self) -> serde_json::Value;
}

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("no contact factory registered for '{0}'")]
    Unresolved(String),

    #[error("contact '{name}' failed to construct: {reason}")]
    Construction { name: String, reason: String },

    #[error("contact '{name}' failed to start: {reason}")]
    Start { name: String, reason: String },

    #[error("a channel named '{0}' is already registered")]
    Duplicate(String),
}
