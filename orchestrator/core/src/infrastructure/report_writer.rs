// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Writes shutdown reports as JSON documents under `<reports_dir>/reports/`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to prepare report directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render report '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    /// Ensure `<reports_dir>/reports` exists.
    pub async fn create(reports_dir: &Path) -> Result<Self, ReportError> {
        let dir = reports_dir.join("reports");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ReportError::Directory {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write(&self, name: &str, report: &serde_json::Value) -> Result<PathBuf, ReportError> {
        let bytes = serde_json::to_vec(report).map_err(|source| ReportError::Render {
            name: name.to_string(),
            source,
        })?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
