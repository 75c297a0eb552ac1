// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::operation::OperationId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlPlaneEvent {
    AgentUntrusted {
        paw: String,
        silence_seconds: u64,
        untrusted_at: DateTime<Utc>,
    },
    ScheduleFired {
        schedule: String,
        operation_id: OperationId,
        fired_at: DateTime<Utc>,
    },
    OperationLaunched {
        operation_id: OperationId,
        launched_at: DateTime<Utc>,
    },
    OperationFinished {
        operation_id: OperationId,
        finished_at: DateTime<Utc>,
    },
    OperationFailed {
        operation_id: OperationId,
        error: String,
        failed_at: DateTime<Utc>,
    },
    PluginLoaded {
        name: String,
        loaded_at: DateTime<Utc>,
    },
    PluginEnabled {
        name: String,
        enabled_at: DateTime<Utc>,
    },
    PluginFailed {
        name: String,
        stage: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    LoopFailed {
        name: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    LoopRestarted {
        name: String,
        attempt: u32,
        restarted_at: DateTime<Utc>,
    },
    BootCompleted {
        plugins_loaded: usize,
        completed_at: DateTime<Utc>,
    },
    ShutdownCompleted {
        reports_written: usize,
        completed_at: DateTime<Utc>,
    },
}

impl ControlPlaneEvent {
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            ControlPlaneEvent::ScheduleFired { operation_id, .. }
            | ControlPlaneEvent::OperationLaunched { operation_id, .. }
            | ControlPlaneEvent::OperationFinished { operation_id, .. }
            | ControlPlaneEvent::OperationFailed { operation_id, .. } => Some(*operation_id),
            _ => None,
        }
    }
}
