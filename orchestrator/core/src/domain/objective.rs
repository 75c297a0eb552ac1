// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Operation objectives: a set of goals evaluated against collected facts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::knowledge::Fact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GoalOperator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    /// Any value of the target trait counts.
    #[serde(rename = "*")]
    Any,
}

impl GoalOperator {
    /// Compares the goal's `expected` value with an observed fact value.
    /// Ordering operators compare numerically when both sides parse as numbers.
    pub fn accepts(&self, expected: &str, observed: &str) -> bool {
        let numeric = expected
            .parse::<f64>()
            .ok()
            .zip(observed.parse::<f64>().ok());
        match self {
            GoalOperator::Eq => expected == observed,
            GoalOperator::Ne => expected != observed,
            GoalOperator::In => observed.contains(expected),
            GoalOperator::Any => true,
            GoalOperator::Lt => numeric.map_or(expected < observed, |(e, o)| e < o),
            GoalOperator::Gt => numeric.map_or(expected > observed, |(e, o)| e > o),
            GoalOperator::Le => numeric.map_or(expected <= observed, |(e, o)| e <= o),
            GoalOperator::Ge => numeric.map_or(expected >= observed, |(e, o)| e >= o),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Fact trait the goal looks for.
    pub target: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub operator: GoalOperator,
    #[serde(default)]
    pub achieved: bool,
}

fn default_count() -> u32 {
    1
}

impl Goal {
    pub fn new(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            value: value.into(),
            count: default_count(),
            operator: GoalOperator::Eq,
            achieved: false,
        }
    }

    /// Evaluates the goal against `facts`, latching `achieved` once met.
    pub fn evaluate(&mut self, facts: &[Fact]) -> bool {
        let matching = facts
            .iter()
            .filter(|f| f.trait_name == self.target && self.operator.accepts(&self.value, &f.value))
            .count();
        if matching as u32 >= self.count {
            self.achieved = true;
        }
        self.achieved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl Default for Objective {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "default".to_string(),
            description: "no explicit goals".to_string(),
            goals: Vec::new(),
        }
    }
}

impl Objective {
    /// Share of achieved goals, 0 when there are none.
    pub fn percentage(&self) -> f64 {
        if self.goals.is_empty() {
            return 0.0;
        }
        let achieved = self.goals.iter().filter(|g| g.achieved).count();
        100.0 * achieved as f64 / self.goals.len() as f64
    }

    pub fn completed(&mut self, facts: &[Fact]) -> bool {
        self.goals
            .iter_mut()
            .fold(true, |all, goal| goal.evaluate(facts) && all)
    }

    /// Same objective with every goal reset, for a newly created operation.
    pub fn fresh_copy(&self) -> Self {
        let mut copy = self.clone();
        for goal in &mut copy.goals {
            goal.achieved = false;
        }
        copy
    }
}
