// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playbook and step definitions.
//!
//! A playbook is a named, ordered recipe: each step is one tool invocation
//! with a declared risk level and a parameter template map keyed to the
//! triggering event's context. Step order is execution order; there is no
//! parallelism within a playbook.

use indexmap::IndexMap;
use rx_core::Risk;
use serde::{Deserialize, Serialize};

/// What the executor does when a step ends not-Success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and mark it failed
    #[default]
    Abort,
    /// Record the failure and move to the next step
    Continue,
}

/// One tool invocation within a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub name: String,
    pub description: String,
    pub risk: Risk,
    /// Name of the MCP tool this step invokes
    pub tool: String,
    /// Parameter templates, rendered against the event context at run time
    #[serde(default)]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl PlaybookStep {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        risk: Risk,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            risk,
            tool: tool.into(),
            params: IndexMap::new(),
            on_failure: FailurePolicy::Abort,
        }
    }

    pub fn param(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.params.insert(key.into(), template.into());
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// A named, ordered remediation recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub steps: Vec<PlaybookStep>,
}

impl Playbook {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<PlaybookStep>) -> Self {
        Self { id: id.into(), name: name.into(), steps }
    }

    /// Highest risk declared by any step.
    pub fn max_risk(&self) -> Option<Risk> {
        self.steps.iter().map(|s| s.risk).max()
    }
}
