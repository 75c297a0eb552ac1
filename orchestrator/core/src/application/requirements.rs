// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Requirement Validation
//!
//! The main config lists external tools the server depends on, each with a
//! minimum version. At boot each requirement is probed; an unmet one is
//! logged (warning when optional, error otherwise) and recorded in the
//! [`ErrorLog`] under the name `requirement`. Neither case aborts boot.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::domain::error_log::ErrorLog;
use crate::domain::server_config::RequirementSpec;

static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("Invalid version regex"));

/// Reports the installed version of a requirement, or `None` when it is
/// absent or its version cannot be determined.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn installed_version(&self, requirement: &str, spec: &RequirementSpec) -> Option<Version>;
}

/// How long a version command may run before the requirement counts as absent.
pub const VERSION_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the requirement's `command` (default `<name> --version`) and takes
/// the first `x.y[.z]` token from its combined output. A command that does
/// not exit within the timeout is killed.
#[derive(Debug, Clone, Copy)]
pub struct CommandVersionProbe {
    timeout: Duration,
}

impl CommandVersionProbe {
    pub fn new() -> Self {
        Self::with_timeout(VERSION_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for CommandVersionProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionProbe for CommandVersionProbe {
    async fn installed_version(&self, requirement: &str, spec: &RequirementSpec) -> Option<Version> {
        let command_line = spec
            .command
            .clone()
            .unwrap_or_else(|| format!("{} --version", requirement));
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;

        let run = Command::new(program).args(parts).kill_on_drop(true).output();
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("Cannot run `{}`: {}", command_line, e);
                return None;
            }
            Err(_) => {
                warn!("`{}` did not exit within {:?}", command_line, self.timeout);
                return None;
            }
        };
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        extract_version(&text)
    }
}

/// First `major.minor[.patch]` token in `text`.
pub fn extract_version(text: &str) -> Option<Version> {
    let caps = VERSION_TOKEN.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
    Some(Version::new(major, minor, patch))
}

/// Parses a configured minimum version, accepting `major.minor` shorthand.
pub fn normalize_version(s: &str) -> Option<Version> {
    let s = s.trim();
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }
    Version::parse(&format!("{s}.0")).ok()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSummary {
    pub satisfied: Vec<String>,
    pub unmet_optional: Vec<String>,
    pub unmet_mandatory: Vec<String>,
}

impl RequirementSummary {
    pub fn all_met(&self) -> bool {
        self.unmet_optional.is_empty() && self.unmet_mandatory.is_empty()
    }
}

pub struct RequirementValidator {
    probe: Arc<dyn VersionProbe>,
    errors: ErrorLog,
}

impl RequirementValidator {
    pub fn new(probe: Arc<dyn VersionProbe>, errors: ErrorLog) -> Self {
        Self { probe, errors }
    }

    /// Whether the installed version satisfies the configured minimum. An
    /// unparseable minimum counts as unmet.
    pub async fn check_requirement(&self, requirement: &str, spec: &RequirementSpec) -> bool {
        let Some(minimum) = normalize_version(&spec.version) else {
            warn!("Requirement {} has an invalid version \"{}\"", requirement, spec.version);
            return false;
        };
        match self.probe.installed_version(requirement, spec).await {
            Some(installed) => installed >= minimum,
            None => false,
        }
    }

    pub async fn validate_requirement(&self, requirement: &str, spec: &RequirementSpec) -> bool {
        if self.check_requirement(requirement, spec).await {
            return true;
        }

        let msg = format!(
            "{} does not meet the minimum version of {}",
            requirement, spec.version
        );
        if spec.optional {
            let msg = [
                msg,
                format!(
                    "{} is an optional dependency and its absence will not affect Bastion's core operation",
                    capitalize(requirement)
                ),
                spec.reason.clone(),
            ]
            .join(". ");
            warn!("{}", msg);
        } else {
            error!("{}", msg);
        }
        self.errors.record(
            "requirement",
            format!("{} version needs to be >= {}", requirement, spec.version),
        );
        false
    }

    pub async fn validate_requirements(
        &self,
        requirements: &BTreeMap<String, RequirementSpec>,
    ) -> RequirementSummary {
        let mut summary = RequirementSummary::default();
        for (name, spec) in requirements {
            if self.validate_requirement(name, spec).await {
                summary.satisfied.push(name.clone());
            } else if spec.optional {
                summary.unmet_optional.push(name.clone());
            } else {
                summary.unmet_mandatory.push(name.clone());
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version_from_tool_output() {
        assert_eq!(
            extract_version("go version go1.19.4 linux/amd64"),
            Some(Version::new(1, 19, 4))
        );
        assert_eq!(extract_version("Python 3.8"), Some(Version::new(3, 8, 0)));
        assert_eq!(extract_version("no digits here"), None);
    }

    #[test]
    fn test_normalize_version_accepts_major_minor() {
        assert_eq!(normalize_version("1.19"), Some(Version::new(1, 19, 0)));
        assert_eq!(normalize_version("3.8.2"), Some(Version::new(3, 8, 2)));
        assert_eq!(normalize_version("3"), None);
    }

    fn spec_with_command(command: &str) -> RequirementSpec {
        RequirementSpec {
            version: "1.0".to_string(),
            optional: false,
            reason: String::new(),
            command: Some(command.to_string()),
            kind: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_version_command_counts_as_absent() {
        let started = std::time::Instant::now();
        let version = CommandVersionProbe::with_timeout(Duration::from_millis(200))
            .installed_version("sleepy", &spec_with_command("sleep 30"))
            .await;

        assert_eq!(version, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_command_output_is_parsed() {
        let version = CommandVersionProbe::new()
            .installed_version("echoer", &spec_with_command("echo tool 2.7.1"))
            .await;

        assert_eq!(version, Some(Version::new(2, 7, 1)));
    }

    #[tokio::test]
    async fn test_missing_program_counts_as_absent() {
        let version = CommandVersionProbe::new()
            .installed_version("nope", &spec_with_command("bastion-no-such-tool-xyz --version"))
            .await;

        assert_eq!(version, None);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("go"), "Go");
        assert_eq!(capitalize(""), "");
    }
}
