// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Relaunches operations that were interrupted by a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::launcher::OperationLauncher;
use crate::application::services::Services;
use crate::application::supervisor::BackgroundLoop;
use crate::domain::repository::OperationQuery;

pub const RESUME_DELAY: Duration = Duration::from_secs(10);

pub struct OperationResumer {
    services: Services,
    launcher: OperationLauncher,
    delay: Duration,
    resumed: AtomicBool,
}

impl OperationResumer {
    pub fn new(services: Services, launcher: OperationLauncher) -> Self {
        Self {
            services,
            launcher,
            delay: RESUME_DELAY,
            resumed: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Launches every unfinished operation. Only the first call does any
    /// work; the launcher additionally refuses operations already live.
    pub async fn resume(&self) -> Result<usize> {
        if self.resumed.load(Ordering::SeqCst) {
            warn!("Operations were already resumed for this process");
            return Ok(0);
        }

        let unfinished = self
            .services
            .data
            .locate_operations(&OperationQuery::unfinished())
            .await
            .context("Failed to locate unfinished operations")?;
        if self.resumed.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        let mut launched = 0;
        for operation in unfinished {
            if self.launcher.launch(operation) {
                launched += 1;
            }
        }
        info!("Resumed {} unfinished operations", launched);
        Ok(launched)
    }
}

#[async_trait]
impl BackgroundLoop for OperationResumer {
    fn name(&self) -> &str {
        "resumer"
    }

    async fn run(&self) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.resume().await.map(|_| ())
    }
}
