// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! JSON snapshot files used by the in-memory stores for durable state.
//!
//! Writes go to a sibling temporary file that is renamed over the target, so
//! a crash mid-write leaves the previous snapshot intact.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::domain::repository::StoreError;

pub async fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}

/// Reads a snapshot, `Ok(None)` when none has been written yet.
pub async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<String>> = read_snapshot(&dir.path().join("absent")).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("object_store");
        write_snapshot(&path, &vec!["a", "b"]).await.unwrap();

        let value: Option<Vec<String>> = read_snapshot(&path).await.unwrap();
        assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!path.with_extension("tmp").exists());
    }
}
