// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Facts collected by operations and the store that owns them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::repository::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub value: String,
    #[serde(default = "default_score")]
    pub score: i32,
    /// Operation or agent that produced the fact.
    #[serde(default)]
    pub source: Option<String>,
    pub collected_at: DateTime<Utc>,
}

fn default_score() -> i32 {
    1
}

impl Fact {
    pub fn new(trait_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_name: trait_name.into(),
            value: value.into(),
            score: default_score(),
            source: None,
            collected_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FactQuery {
    pub trait_name: Option<String>,
    pub source: Option<String>,
}

impl FactQuery {
    pub fn matches(&self, fact: &Fact) -> bool {
        self.trait_name.as_ref().map_or(true, |t| &fact.trait_name == t)
            && self
                .source
                .as_ref()
                .map_or(true, |s| fact.source.as_ref() == Some(s))
    }
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn add_fact(&self, fact: Fact) -> Result<(), StoreError>;

    async fn facts(&self, query: &FactQuery) -> Result<Vec<Fact>, StoreError>;

    async fn save_state(&self) -> Result<(), StoreError>;

    async fn restore_state(&self) -> Result<(), StoreError>;
}
