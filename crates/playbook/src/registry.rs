// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local playbook catalog.
//!
//! Built at startup, immutable thereafter. Registration validates shape;
//! [`PlaybookRegistry::validate_tools`] checks every step's tool against
//! the discovered tool registry and any miss is fatal to engine startup.

use crate::playbook::{Playbook, PlaybookStep};
use indexmap::IndexMap;
use rx_core::Risk;
use thiserror::Error;

/// Errors registering or validating playbooks. All are startup-fatal.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate playbook id: {0}")]
    DuplicatePlaybook(String),

    #[error("playbook {0} has no steps")]
    EmptyPlaybook(String),

    #[error("playbook {playbook} step {step} names unknown tool {tool}")]
    UnknownTool { playbook: String, step: String, tool: String },
}

/// In-memory keyed catalog of playbooks.
#[derive(Debug, Default)]
pub struct PlaybookRegistry {
    playbooks: IndexMap<String, Playbook>,
}

impl PlaybookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the five built-in remediation playbooks.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for playbook in builtin_playbooks() {
            // Built-ins have unique ids and non-empty steps.
            if let Err(e) = registry.register(playbook) {
                tracing::error!(error = %e, "builtin playbook rejected");
            }
        }
        registry
    }

    pub fn register(&mut self, playbook: Playbook) -> Result<(), RegistryError> {
        if playbook.steps.is_empty() {
            return Err(RegistryError::EmptyPlaybook(playbook.id));
        }
        if self.playbooks.contains_key(&playbook.id) {
            return Err(RegistryError::DuplicatePlaybook(playbook.id));
        }
        self.playbooks.insert(playbook.id.clone(), playbook);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Playbook> {
        self.playbooks.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.playbooks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.playbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playbooks.is_empty()
    }

    /// Check every registered step's tool name against the tool registry.
    pub fn validate_tools(&self, has_tool: impl Fn(&str) -> bool) -> Result<(), RegistryError> {
        for playbook in self.playbooks.values() {
            for step in &playbook.steps {
                if !has_tool(&step.tool) {
                    return Err(RegistryError::UnknownTool {
                        playbook: playbook.id.clone(),
                        step: step.name.clone(),
                        tool: step.tool.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The five built-in remediation playbooks.
pub fn builtin_playbooks() -> Vec<Playbook> {
    vec![
        Playbook::new(
            "crash_loop_remediation",
            "Crash loop remediation",
            vec![
                PlaybookStep::new(
                    "describe_pod",
                    "Inspect pod state and recent events",
                    Risk::Low,
                    "k8s_describe_pod",
                )
                .param("pod_name", "{resource_name}")
                .param("namespace", "{namespace}"),
                PlaybookStep::new(
                    "fetch_logs",
                    "Fetch logs from the crashing container",
                    Risk::Low,
                    "k8s_get_pod_logs",
                )
                .param("pod_name", "{resource_name}")
                .param("namespace", "{namespace}"),
                PlaybookStep::new(
                    "restart_pod",
                    "Delete the pod so its controller recreates it",
                    Risk::Medium,
                    "k8s_restart_pod",
                )
                .param("pod_name", "{resource_name}")
                .param("namespace", "{namespace}"),
                PlaybookStep::new(
                    "verify_pod",
                    "Verify the replacement pod is running",
                    Risk::Low,
                    "k8s_get_pod_status",
                )
                .param("pod_name", "{resource_name}")
                .param("namespace", "{namespace}"),
            ],
        ),
        Playbook::new(
            "oom_kill_remediation",
            "OOM kill remediation",
            vec![
                PlaybookStep::new(
                    "get_limits",
                    "Read current resource limits",
                    Risk::Low,
                    "k8s_get_resource_limits",
                )
                .param("pod_name", "{resource_name}")
                .param("namespace", "{namespace}"),
                PlaybookStep::new(
                    "patch_memory_limit",
                    "Raise the container memory limit",
                    Risk::High,
                    "k8s_patch_memory_limit",
                )
                .param("pod_name", "{resource_name}")
                .param("namespace", "{namespace}")
                .param("container", "{annotations.container}"),
            ],
        ),
        Playbook::new(
            "deployment_rollback",
            "Deployment rollback",
            vec![
                PlaybookStep::new(
                    "rollout_history",
                    "Read the deployment rollout history",
                    Risk::Low,
                    "k8s_rollout_history",
                )
                .param("deployment_name", "{resource_name}")
                .param("namespace", "{namespace}"),
                PlaybookStep::new(
                    "rollback",
                    "Roll the deployment back to the previous revision",
                    Risk::High,
                    "k8s_rollback_deployment",
                )
                .param("deployment_name", "{resource_name}")
                .param("namespace", "{namespace}"),
                PlaybookStep::new(
                    "rollout_status",
                    "Watch the rollback land",
                    Risk::Low,
                    "k8s_rollout_status",
                )
                .param("deployment_name", "{resource_name}")
                .param("namespace", "{namespace}"),
            ],
        ),
        Playbook::new(
            "node_not_ready_remediation",
            "Node not-ready remediation",
            vec![
                PlaybookStep::new(
                    "describe_node",
                    "Inspect node conditions",
                    Risk::Low,
                    "k8s_describe_node",
                )
                .param("node_name", "{resource_name}"),
                PlaybookStep::new(
                    "cordon_node",
                    "Mark the node unschedulable",
                    Risk::Medium,
                    "k8s_cordon_node",
                )
                .param("node_name", "{resource_name}"),
                PlaybookStep::new(
                    "drain_node",
                    "Evict workloads off the node",
                    Risk::High,
                    "k8s_drain_node",
                )
                .param("node_name", "{resource_name}"),
            ],
        ),
        Playbook::new(
            "scale_up_on_load",
            "Scale up on load",
            vec![PlaybookStep::new(
                "scale_deployment",
                "Scale the deployment up",
                Risk::Medium,
                "k8s_scale_deployment",
            )
            .param("deployment_name", "{resource_name}")
            .param("namespace", "{namespace}")
            .param("replicas", "{annotations.target_replicas}")],
        ),
    ]
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
