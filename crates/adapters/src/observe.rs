// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster observation: raw unhealthy findings per scan cycle.
//!
//! The observer reports *observations*, not events: the watch loop owns
//! deduplication, flap suppression, and recovery tracking. Each scan runs
//! three sub-scans (pods, nodes, deployments); a sub-scan that fails is
//! reported failed so the watch loop can skip it without inferring
//! recoveries from missing data.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use rx_core::EventKind;
use std::time::Duration;
use thiserror::Error;

/// Errors from one cluster API call. Cloneable so fakes can replay them.
#[derive(Debug, Clone, Error)]
pub enum ObserveError {
    #[error("cluster API error: {0}")]
    Api(String),
    #[error("no cluster client available: {0}")]
    NoClient(String),
}

/// One raw unhealthy finding on one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub kind: EventKind,
    pub resource_kind: String,
    pub namespace: String,
    pub resource_name: String,
    pub annotations: Vec<(String, String)>,
    /// For node readiness: how long ago the `Ready` condition last
    /// transitioned. Drives the watch loop's flap suppression.
    pub ready_transition_age: Option<Duration>,
}

impl Observation {
    pub fn crash_loop(namespace: &str, pod: &str, container: &str) -> Self {
        Self {
            kind: EventKind::CrashLoop,
            resource_kind: "pod".into(),
            namespace: namespace.into(),
            resource_name: pod.into(),
            annotations: vec![("container".into(), container.into())],
            ready_transition_age: None,
        }
    }

    pub fn oom_killed(namespace: &str, pod: &str, container: &str) -> Self {
        Self {
            kind: EventKind::OomKilled,
            resource_kind: "pod".into(),
            namespace: namespace.into(),
            resource_name: pod.into(),
            annotations: vec![("container".into(), container.into())],
            ready_transition_age: None,
        }
    }

    pub fn not_ready_node(node: &str, transition_age: Option<Duration>) -> Self {
        Self {
            kind: EventKind::NotReadyNode,
            resource_kind: "node".into(),
            namespace: String::new(),
            resource_name: node.into(),
            annotations: Vec::new(),
            ready_transition_age: transition_age,
        }
    }

    pub fn replication_failure(namespace: &str, deployment: &str, desired: i32) -> Self {
        Self {
            kind: EventKind::ReplicationFailure,
            resource_kind: "deployment".into(),
            namespace: namespace.into(),
            resource_name: deployment.into(),
            annotations: vec![("desired_replicas".into(), desired.to_string())],
            ready_transition_age: None,
        }
    }
}

/// Result of one sub-scan; `Err` means the API call failed and the watch
/// loop must not treat absent observations as recoveries.
pub type SubScan = Result<Vec<Observation>, ObserveError>;

/// One full observation cycle over the cluster.
#[derive(Debug, Clone)]
pub struct ClusterScan {
    pub pods: SubScan,
    pub nodes: SubScan,
    pub deployments: SubScan,
}

/// Read-only view of the cluster for the watch loop.
#[async_trait]
pub trait ClusterObserver: Send + Sync + 'static {
    async fn scan(&self) -> ClusterScan;
}

/// Observer backed by the Kubernetes API via kube-rs.
#[derive(Clone)]
pub struct KubeObserver {
    client: Client,
}

impl KubeObserver {
    /// Build from the ambient kubeconfig / in-cluster environment.
    pub async fn new() -> Result<Self, ObserveError> {
        let client =
            Client::try_default().await.map_err(|e| ObserveError::NoClient(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn scan_pods(&self) -> SubScan {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| ObserveError::Api(format!("list pods: {e}")))?;
        Ok(list.iter().flat_map(pod_observations).collect())
    }

    async fn scan_nodes(&self) -> SubScan {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| ObserveError::Api(format!("list nodes: {e}")))?;
        Ok(list.iter().filter_map(node_observation).collect())
    }

    async fn scan_deployments(&self) -> SubScan {
        let deployments: Api<Deployment> = Api::all(self.client.clone());
        let list = deployments
            .list(&ListParams::default())
            .await
            .map_err(|e| ObserveError::Api(format!("list deployments: {e}")))?;
        Ok(list.iter().filter_map(deployment_observation).collect())
    }
}

/// Derive crash-loop and OOM findings from one pod's container statuses.
pub fn pod_observations(pod: &Pod) -> Vec<Observation> {
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let Some(name) = pod.metadata.name.clone() else { return Vec::new() };

    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut found = Vec::new();
    for cs in statuses {
        let waiting_reason =
            cs.state.as_ref().and_then(|s| s.waiting.as_ref()).and_then(|w| w.reason.as_deref());
        if matches!(waiting_reason, Some("CrashLoopBackOff") | Some("Error")) {
            found.push(Observation::crash_loop(&namespace, &name, &cs.name));
        }
        let terminated_reason = cs
            .last_state
            .as_ref()
            .and_then(|s| s.terminated.as_ref())
            .and_then(|t| t.reason.as_deref());
        if terminated_reason == Some("OOMKilled") {
            found.push(Observation::oom_killed(&namespace, &name, &cs.name));
        }
    }
    found
}

/// Derive a not-ready finding from one node's `Ready` condition.
pub fn node_observation(node: &Node) -> Option<Observation> {
    let name = node.metadata.name.clone()?;
    let condition = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.type_ == "Ready"))?;
    if condition.status == "True" {
        return None;
    }
    let age = condition.last_transition_time.as_ref().and_then(|t| {
        k8s_openapi::chrono::Utc::now().signed_duration_since(t.0).to_std().ok()
    });
    let mut obs = Observation::not_ready_node(&name, age);
    if let Some(reason) = condition.reason.as_deref() {
        obs.annotations.push(("reason".into(), reason.into()));
    }
    Some(obs)
}

/// Derive a replication-failure finding from one deployment's status.
pub fn deployment_observation(deployment: &Deployment) -> Option<Observation> {
    let namespace = deployment.metadata.namespace.clone().unwrap_or_default();
    let name = deployment.metadata.name.clone()?;
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    let available = deployment.status.as_ref().and_then(|s| s.available_replicas).unwrap_or(0);
    if desired > 0 && available == 0 {
        Some(Observation::replication_failure(&namespace, &name, desired))
    } else {
        None
    }
}

#[async_trait]
impl ClusterObserver for KubeObserver {
    async fn scan(&self) -> ClusterScan {
        let (pods, nodes, deployments) =
            tokio::join!(self.scan_pods(), self.scan_nodes(), self.scan_deployments());
        if let Err(ref e) = pods {
            tracing::warn!(error = %e, "pod scan failed, skipping this cycle");
        }
        if let Err(ref e) = nodes {
            tracing::warn!(error = %e, "node scan failed, skipping this cycle");
        }
        if let Err(ref e) = deployments {
            tracing::warn!(error = %e, "deployment scan failed, skipping this cycle");
        }
        ClusterScan { pods, nodes, deployments }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::{ClusterObserver, ClusterScan, Observation, ObserveError, SubScan};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeState {
        pods: SubScan,
        nodes: SubScan,
        deployments: SubScan,
        scans: usize,
    }

    /// Programmable observer for tests.
    #[derive(Clone)]
    pub struct FakeObserver {
        state: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeObserver {
        fn default() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeState {
                    pods: Ok(Vec::new()),
                    nodes: Ok(Vec::new()),
                    deployments: Ok(Vec::new()),
                    scans: 0,
                })),
            }
        }
    }

    impl FakeObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_pods(&self, observations: Vec<Observation>) {
            self.state.lock().pods = Ok(observations);
        }

        pub fn set_nodes(&self, observations: Vec<Observation>) {
            self.state.lock().nodes = Ok(observations);
        }

        pub fn set_deployments(&self, observations: Vec<Observation>) {
            self.state.lock().deployments = Ok(observations);
        }

        pub fn fail_pods(&self, reason: &str) {
            self.state.lock().pods = Err(ObserveError::Api(reason.to_string()));
        }

        pub fn fail_nodes(&self, reason: &str) {
            self.state.lock().nodes = Err(ObserveError::Api(reason.to_string()));
        }

        /// Reset every sub-scan to healthy-and-empty.
        pub fn all_healthy(&self) {
            let mut state = self.state.lock();
            state.pods = Ok(Vec::new());
            state.nodes = Ok(Vec::new());
            state.deployments = Ok(Vec::new());
        }

        pub fn scan_count(&self) -> usize {
            self.state.lock().scans
        }
    }

    #[async_trait]
    impl ClusterObserver for FakeObserver {
        async fn scan(&self) -> ClusterScan {
            let mut state = self.state.lock();
            state.scans += 1;
            ClusterScan {
                pods: state.pods.clone(),
                nodes: state.nodes.clone(),
                deployments: state.deployments.clone(),
            }
        }
    }
}

#[cfg(test)]
#[path = "observe_tests.rs"]
mod tests;
