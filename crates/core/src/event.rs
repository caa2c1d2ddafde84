// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster events and the known-issue dedup key.
//!
//! A [`ClusterEvent`] is the normalized form of one anomaly observed on one
//! cluster resource. Events are produced by the watch loop and the
//! Alertmanager ingress, matched by the rule engine, and snapshotted into
//! playbook runs. They are never stored long-term.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Upper bound on free-form annotations carried by one event.
pub const MAX_ANNOTATIONS: usize = 16;

/// Finite classification of a cluster anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A container stuck in `CrashLoopBackOff` (or waiting with reason `Error`)
    CrashLoop,
    /// A container whose last termination reason was `OOMKilled`
    OomKilled,
    /// A node whose `Ready` condition has not been `True` for a full cycle
    NotReadyNode,
    /// A deployment with desired replicas but zero available
    ReplicationFailure,
    /// A firing alert delivered by Alertmanager
    AlertmanagerFiring,
}

crate::simple_display! {
    EventKind {
        CrashLoop => "crash_loop",
        OomKilled => "oom_killed",
        NotReadyNode => "not_ready_node",
        ReplicationFailure => "replication_failure",
        AlertmanagerFiring => "alertmanager_firing",
    }
}

/// Event severity. The derived order is the severity floor order:
/// `Info < Warning < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

crate::simple_display! {
    Severity {
        Info => "info",
        Warning => "warning",
        Critical => "critical",
    }
}

/// One normalized anomaly on one cluster resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub kind: EventKind,
    pub severity: Severity,
    /// Resource kind, lowercase (`pod`, `node`, `deployment`, ...)
    pub resource_kind: String,
    /// Namespace; empty for cluster-scoped resources
    pub namespace: String,
    pub resource_name: String,
    /// Epoch milliseconds at observation time
    pub observed_at_ms: u64,
    /// Free-form context (container name, alert labels, ...), bounded
    #[serde(default)]
    pub annotations: IndexMap<String, String>,
}

impl ClusterEvent {
    pub fn new(
        kind: EventKind,
        severity: Severity,
        resource_kind: impl Into<String>,
        namespace: impl Into<String>,
        resource_name: impl Into<String>,
        observed_at_ms: u64,
    ) -> Self {
        Self {
            kind,
            severity,
            resource_kind: resource_kind.into(),
            namespace: namespace.into(),
            resource_name: resource_name.into(),
            observed_at_ms,
            annotations: IndexMap::new(),
        }
    }

    /// Attach an annotation. Annotations past [`MAX_ANNOTATIONS`] are dropped.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotate(key, value);
        self
    }

    /// Attach an annotation in place. Returns `false` if the bound was hit
    /// and the annotation was dropped.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.annotations.len() >= MAX_ANNOTATIONS && !self.annotations.contains_key(&key) {
            return false;
        }
        self.annotations.insert(key, value.into());
        true
    }

    /// Dedup key for this event's (resource, anomaly kind) identity.
    pub fn known_issue_key(&self) -> KnownIssueKey {
        KnownIssueKey {
            resource_kind: self.resource_kind.clone(),
            namespace: self.namespace.clone(),
            resource_name: self.resource_name.clone(),
            kind: self.kind,
        }
    }

    /// Resolve a dotted context path for parameter templating.
    ///
    /// Top-level fields resolve by name (`resource_name`, `namespace`,
    /// `resource_kind`, `kind`, `severity`); `annotations.<key>` resolves
    /// into the annotation map. Unknown paths return `None`.
    pub fn context_field(&self, path: &str) -> Option<String> {
        match path {
            "resource_name" => Some(self.resource_name.clone()),
            "namespace" => Some(self.namespace.clone()),
            "resource_kind" => Some(self.resource_kind.clone()),
            "kind" => Some(self.kind.to_string()),
            "severity" => Some(self.severity.to_string()),
            _ => path
                .strip_prefix("annotations.")
                .and_then(|key| self.annotations.get(key).cloned()),
        }
    }
}

impl std::fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {} {}", self.kind, self.resource_kind, self.resource_name)
        } else {
            write!(
                f,
                "{} {} {}/{}",
                self.kind, self.resource_kind, self.namespace, self.resource_name
            )
        }
    }
}

/// Identity of one unresolved incident: one entry in the watch loop's
/// known-issues set per (resource, anomaly kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownIssueKey {
    pub resource_kind: String,
    pub namespace: String,
    pub resource_name: String,
    pub kind: EventKind,
}

impl std::fmt::Display for KnownIssueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{}:{}",
            self.resource_kind, self.namespace, self.resource_name, self.kind
        )
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
