// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule engine: pure matcher from cluster events to playbooks.
//!
//! Rules are registered at startup and evaluated in registration order;
//! an event may fan out to several playbooks. A rule's condition is an
//! exact event-kind match plus an optional namespace regex and a
//! severity floor.

use indexmap::IndexMap;
use regex::Regex;
use rx_core::{ClusterEvent, EventKind, Severity};

/// One registered rule binding an event condition to a playbook.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub kind: EventKind,
    /// Unanchored regex over the event namespace; `None` matches any
    /// namespace. Cluster-scoped events have an empty namespace, which
    /// a filter matches iff it matches the empty string.
    pub namespace_filter: Option<Regex>,
    pub severity_floor: Severity,
    pub playbook_id: String,
    /// Extra context merged into the event's annotations before execution
    /// (existing annotations win).
    pub params: IndexMap<String, String>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: EventKind,
        playbook_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            namespace_filter: None,
            severity_floor: Severity::Info,
            playbook_id: playbook_id.into(),
            params: IndexMap::new(),
        }
    }

    pub fn namespace_filter(mut self, regex: Regex) -> Self {
        self.namespace_filter = Some(regex);
        self
    }

    pub fn severity_floor(mut self, floor: Severity) -> Self {
        self.severity_floor = floor;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn matches(&self, event: &ClusterEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }
        if event.severity < self.severity_floor {
            return false;
        }
        match &self.namespace_filter {
            Some(re) => re.is_match(&event.namespace),
            None => true,
        }
    }
}

/// One rule hit for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_id: String,
    pub playbook_id: String,
}

/// Ordered rule catalog. Pure function of (event, registered rules).
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with the five built-in kind-to-playbook bindings.
    pub fn builtin() -> Self {
        let mut engine = Self::new();
        engine.register(Rule::new(
            "rule-001",
            "crash loop",
            EventKind::CrashLoop,
            "crash_loop_remediation",
        ));
        engine.register(Rule::new(
            "rule-002",
            "oom killed",
            EventKind::OomKilled,
            "oom_kill_remediation",
        ));
        engine.register(Rule::new(
            "rule-003",
            "node not ready",
            EventKind::NotReadyNode,
            "node_not_ready_remediation",
        ));
        engine.register(Rule::new(
            "rule-004",
            "replication failure",
            EventKind::ReplicationFailure,
            "deployment_rollback",
        ));
        engine.register(
            Rule::new(
                "rule-005",
                "scale up on load",
                EventKind::AlertmanagerFiring,
                "scale_up_on_load",
            )
            .param("target_replicas", "3"),
        );
        engine
    }

    pub fn register(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Every matching (rule, playbook) pair, in registration order.
    pub fn match_event(&self, event: &ClusterEvent) -> Vec<RuleMatch> {
        self.rules
            .iter()
            .filter(|r| r.matches(event))
            .map(|r| RuleMatch { rule_id: r.id.clone(), playbook_id: r.playbook_id.clone() })
            .collect()
    }

    /// The full rule for a match, for param merging at dispatch.
    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
