// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory fact store with snapshot persistence.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::domain::knowledge::{Fact, FactQuery, KnowledgeStore};
use crate::domain::repository::StoreError;
use crate::infrastructure::snapshot::{read_snapshot, write_snapshot};

#[derive(Clone, Default)]
pub struct InMemoryKnowledgeStore {
    facts: Arc<RwLock<Vec<Fact>>>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            facts: Arc::default(),
            snapshot_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn add_fact(&self, fact: Fact) -> Result<(), StoreError> {
        let mut facts = self.facts.write();
        // Identical trait/value/source triples are collapsed
        if let Some(existing) = facts.iter_mut().find(|f| {
            f.trait_name == fact.trait_name && f.value == fact.value && f.source == fact.source
        }) {
            existing.score += fact.score;
            return Ok(());
        }
        facts.push(fact);
        Ok(())
    }

    async fn facts(&self, query: &FactQuery) -> Result<Vec<Fact>, StoreError> {
        Ok(self
            .facts
            .read()
            .iter()
            .filter(|f| query.matches(f))
            .cloned()
            .collect())
    }

    async fn save_state(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let facts = self.facts.read().clone();
        write_snapshot(path, &facts).await?;
        info!("Saved {} facts to {:?}", facts.len(), path);
        Ok(())
    }

    async fn restore_state(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(facts) = read_snapshot::<Vec<Fact>>(path).await? {
            info!("Restored {} facts from {:?}", facts.len(), path);
            *self.facts.write() = facts;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_facts_accumulate_score() {
        let store = InMemoryKnowledgeStore::new();
        store.add_fact(Fact::new("host.user.name", "admin")).await.unwrap();
        store.add_fact(Fact::new("host.user.name", "admin")).await.unwrap();
        store.add_fact(Fact::new("host.user.name", "guest")).await.unwrap();

        let facts = store
            .facts(&FactQuery {
                trait_name: Some("host.user.name".to_string()),
                source: None,
            })
            .await
            .unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].score, 2);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fact_store");
        let store = InMemoryKnowledgeStore::with_snapshot(&path);
        store.add_fact(Fact::new("domain.name", "corp.local")).await.unwrap();
        store.save_state().await.unwrap();

        let fresh = InMemoryKnowledgeStore::with_snapshot(&path);
        fresh.restore_state().await.unwrap();
        assert_eq!(fresh.facts(&FactQuery::default()).await.unwrap().len(), 1);
    }
}
