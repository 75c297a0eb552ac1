// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Agent Aggregate
//!
//! A remote endpoint that checks in periodically. The control plane only owns
//! the trust flag; check-ins (`last_trusted_seen`, transport metadata) are
//! written by the contact channels.
//!
//! Invariant: `trusted` implies
//! `now - last_trusted_seen <= untrusted_timer + sleep_max`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::operation::Link;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable agent identity ("paw").
    pub paw: String,
    pub trusted: bool,
    pub last_trusted_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Upper bound of the agent's beacon sleep, in seconds.
    pub sleep_max: u64,
    pub sleep_min: u64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub group: String,
    /// Name of the contact channel the agent last beaconed through.
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub executors: Vec<String>,
    /// Links dispatched to this agent outside of any operation.
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Agent {
    pub fn new(paw: impl Into<String>, seen_at: DateTime<Utc>) -> Self {
        Self {
            paw: paw.into(),
            trusted: true,
            last_trusted_seen: seen_at,
            last_seen: seen_at,
            sleep_max: 60,
            sleep_min: 30,
            host: String::new(),
            platform: String::new(),
            group: "red".to_string(),
            contact: String::new(),
            executors: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Seconds since the agent last checked in while trusted.
    pub fn silence_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_trusted_seen).num_milliseconds() as f64 / 1000.0
    }

    /// Whether the agent has been silent past `untrusted_timer + sleep_max`.
    pub fn trust_expired(&self, now: DateTime<Utc>, untrusted_timer: u64) -> bool {
        self.silence_seconds(now) > untrusted_timer.saturating_add(self.sleep_max) as f64
    }

    /// Records a check-in. Re-establishes trust.
    pub fn heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_seen = at;
        self.last_trusted_seen = at;
        self.trusted = true;
    }
}
