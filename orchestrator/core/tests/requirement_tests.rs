// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;

use bastion_core::application::requirements::{RequirementValidator, VersionProbe};
use bastion_core::domain::error_log::ErrorLog;
use bastion_core::domain::server_config::RequirementSpec;

/// Answers from a fixed table instead of running commands.
struct TableProbe {
    installed: HashMap<String, Version>,
}

impl TableProbe {
    fn with(entries: &[(&str, Version)]) -> Arc<Self> {
        Arc::new(Self {
            installed: entries
                .iter()
                .map(|(name, version)| (name.to_string(), version.clone()))
                .collect(),
        })
    }
}

#[async_trait]
impl VersionProbe for TableProbe {
    async fn installed_version(&self, requirement: &str, _spec: &RequirementSpec) -> Option<Version> {
        self.installed.get(requirement).cloned()
    }
}

fn go(optional: bool) -> RequirementSpec {
    RequirementSpec {
        version: "1.19".to_string(),
        optional,
        reason: "Used to dynamically compile agents".to_string(),
        command: Some("go version".to_string()),
        kind: Some("installed_program".to_string()),
    }
}

#[tokio::test]
async fn test_satisfied_requirement_records_nothing() {
    let errors = ErrorLog::new();
    let validator = RequirementValidator::new(
        TableProbe::with(&[("go", Version::new(1, 21, 3))]),
        errors.clone(),
    );

    assert!(validator.validate_requirement("go", &go(false)).await);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_missing_optional_requirement_is_recorded_once() {
    let errors = ErrorLog::new();
    let validator = RequirementValidator::new(TableProbe::with(&[]), errors.clone());

    assert!(!validator.validate_requirement("go", &go(true)).await);

    let recorded = errors.errors();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].name, "requirement");
    assert_eq!(recorded[0].message, "go version needs to be >= 1.19");
}

#[tokio::test]
async fn test_outdated_mandatory_requirement_is_recorded_once() {
    let errors = ErrorLog::new();
    let validator = RequirementValidator::new(
        TableProbe::with(&[("go", Version::new(1, 18, 9))]),
        errors.clone(),
    );

    assert!(!validator.validate_requirement("go", &go(false)).await);

    let recorded = errors.errors();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].message, "go version needs to be >= 1.19");
}

#[tokio::test]
async fn test_summary_splits_optional_from_mandatory() {
    let errors = ErrorLog::new();
    let validator = RequirementValidator::new(
        TableProbe::with(&[("python", Version::new(3, 11, 0))]),
        errors.clone(),
    );
    let mut python = go(false);
    python.version = "3.8.0".to_string();
    python.command = None;
    let mut requirements = BTreeMap::new();
    requirements.insert("go".to_string(), go(true));
    requirements.insert("python".to_string(), python);
    requirements.insert("upx".to_string(), go(false));

    let summary = validator.validate_requirements(&requirements).await;

    assert_eq!(summary.satisfied, vec!["python"]);
    assert_eq!(summary.unmet_optional, vec!["go"]);
    assert_eq!(summary.unmet_mandatory, vec!["upx"]);
    assert!(!summary.all_met());
    assert_eq!(errors.len(), 2);
}
