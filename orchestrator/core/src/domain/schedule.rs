// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Time-of-day triggers that stamp out new operations from a template.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::operation::OperationTemplate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    /// Time of day (UTC) the schedule fires.
    pub schedule: NaiveTime,
    pub task: OperationTemplate,
}

impl Schedule {
    pub fn new(name: impl Into<String>, schedule: NaiveTime, task: OperationTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            schedule,
            task,
        }
    }

    /// Seconds between the schedule's time of day and `now`'s time of day,
    /// both taken on the same calendar day. Negative before the trigger time.
    pub fn seconds_past(&self, now: DateTime<Utc>) -> f64 {
        (now.time() - self.schedule).num_milliseconds() as f64 / 1000.0
    }

    /// A schedule is due while `0 < seconds_past < interval`.
    pub fn is_due(&self, now: DateTime<Utc>, interval_secs: u64) -> bool {
        let diff = self.seconds_past(now);
        diff > 0.0 && diff < interval_secs as f64
    }
}
