// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Process-wide, append-only record of non-fatal startup problems.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    pub name: String,
    #[serde(rename = "msg")]
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<RwLock<Vec<RecordedError>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: impl Into<String>, message: impl Into<String>) {
        self.entries.write().push(RecordedError {
            name: name.into(),
            message: message.into(),
        });
    }

    /// Snapshot of every recorded problem, oldest first.
    pub fn errors(&self) -> Vec<RecordedError> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
