// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Trust Monitor
//!
//! Revokes trust from agents that have gone silent. An agent is untrusted
//! once `now - last_trusted_seen` exceeds `untrusted_timer + sleep_max`; the
//! agent's own beacon interval is added so slow beaconers get proportional
//! slack. The monitor re-reads `untrusted_timer` every cycle and sleeps only
//! as long as it takes for the next still-trusted agent to reach the timer.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::services::Services;
use crate::application::supervisor::BackgroundLoop;
use crate::domain::events::ControlPlaneEvent;
use crate::domain::repository::AgentQuery;

pub const TRUST_SETTLE_DELAY: Duration = Duration::from_secs(15);

pub struct TrustMonitor {
    services: Services,
    settle_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    /// Seconds until the next still-trusted agent reaches the timer.
    pub next_check: f64,
    pub untrusted: Vec<String>,
}

impl TrustMonitor {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            settle_delay: TRUST_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// One pass over the trusted agents. Only the trust flag is written back,
    /// so a check-in racing the pass is never overwritten. A failure to revoke
    /// a single agent is logged and does not stop the pass.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let trusted = self
            .services
            .data
            .locate_agents(&AgentQuery::trusted())
            .await
            .context("Failed to locate trusted agents")?;
        let untrusted_timer = self.services.config.untrusted_timer();
        let now = self.services.clock.now();

        let mut next_check = untrusted_timer as f64;
        let mut untrusted = Vec::new();

        for agent in trusted {
            let silence = agent.silence_seconds(now);
            if agent.trust_expired(now, untrusted_timer) {
                // The store re-checks expiry; a beacon since the read keeps trust.
                let revoked = self.services.data.revoke_trust(&agent.paw, now, untrusted_timer).await;
                match revoked {
                    Ok(true) => {
                        debug!("Agent ({}) now untrusted. Last seen {:.0} sec ago", agent.paw, silence);
                        self.services.events.publish(ControlPlaneEvent::AgentUntrusted {
                            paw: agent.paw.clone(),
                            silence_seconds: silence.max(0.0) as u64,
                            untrusted_at: now,
                        });
                        untrusted.push(agent.paw);
                    }
                    Ok(false) => debug!("Agent ({}) checked in before trust was revoked", agent.paw),
                    Err(e) => warn!("Failed to revoke trust for agent {}: {}", agent.paw, e),
                }
            } else {
                let remaining = untrusted_timer as f64 - silence;
                if remaining < next_check {
                    next_check = remaining;
                }
            }
        }

        Ok(SweepOutcome { next_check, untrusted })
    }
}

#[async_trait]
impl BackgroundLoop for TrustMonitor {
    fn name(&self) -> &str {
        "trust_monitor"
    }

    async fn run(&self) -> Result<()> {
        let mut next_check = self.services.config.untrusted_timer() as f64;
        loop {
            tokio::time::sleep(Duration::from_secs_f64(next_check.max(0.0) + 1.0)).await;
            next_check = self.sweep().await?.next_check;
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}
