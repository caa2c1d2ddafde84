// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watch loop: steady-interval cluster observation with dedup and re-arm.
//!
//! One supervised task. Each cycle scans the cluster, derives observations,
//! and emits exactly one event per newly-occurring incident: the
//! known-issues set holds one [`rx_core::KnownIssueKey`] per unresolved
//! incident, and a key is removed only when the resource is observed
//! healthy again in a later cycle — which re-arms future alerts. A failed
//! sub-scan skips its resource family for the cycle without touching the
//! set, so missing data is never read as recovery.

use crate::dispatch::Dispatcher;
use parking_lot::Mutex;
use rx_adapters::{ClusterObserver, ClusterScan, Observation, SubScan};
use rx_core::{Clock, ClusterEvent, EventKind, KnownIssueKey, Severity};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Watch loop tuning.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Time between cycle starts
    pub interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(30) }
    }
}

/// The background observer task.
pub struct WatchLoop<O: ClusterObserver, C: Clock> {
    observer: Arc<O>,
    dispatcher: Arc<Dispatcher<C>>,
    config: WatchConfig,
    clock: C,
    cancel: CancellationToken,
    /// One entry per unresolved incident; written only by the cycle task.
    known: Mutex<HashSet<KnownIssueKey>>,
    /// Nodes seen not-ready once, awaiting a second cycle before firing.
    node_candidates: Mutex<HashSet<String>>,
}

impl<O: ClusterObserver, C: Clock> WatchLoop<O, C> {
    pub fn new(
        observer: Arc<O>,
        dispatcher: Arc<Dispatcher<C>>,
        config: WatchConfig,
        clock: C,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            observer,
            dispatcher,
            config,
            clock,
            cancel,
            known: Mutex::new(HashSet::new()),
            node_candidates: Mutex::new(HashSet::new()),
        }
    }

    /// Run until cancelled. Cycles never overlap; a slow cycle delays the
    /// next one.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(interval_secs = self.config.interval.as_secs(), "watch loop started");
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            // The scan is bounded to half the interval; an unresponsive
            // API server costs one cycle, not the loop.
            let scan = tokio::select! {
                scan = tokio::time::timeout(self.config.interval / 2, self.observer.scan()) => {
                    match scan {
                        Ok(scan) => scan,
                        Err(_) => {
                            tracing::warn!("cluster scan timed out, skipping cycle");
                            continue;
                        }
                    }
                }
                _ = self.cancel.cancelled() => break,
            };
            self.cycle(scan).await;
        }
        tracing::info!("watch loop stopped");
    }

    /// Process one completed scan.
    pub async fn cycle(&self, scan: ClusterScan) {
        self.process_family(&scan.pods, &[EventKind::CrashLoop, EventKind::OomKilled]).await;
        self.process_family(&scan.nodes, &[EventKind::NotReadyNode]).await;
        self.process_family(&scan.deployments, &[EventKind::ReplicationFailure]).await;
    }

    /// Immutable snapshot of the known-issues set, for diagnostics.
    pub fn known_issues(&self) -> HashSet<KnownIssueKey> {
        self.known.lock().clone()
    }

    async fn process_family(&self, sub_scan: &SubScan, kinds: &[EventKind]) {
        let observations = match sub_scan {
            Ok(observations) => observations,
            // Skipped scan: leave the set alone so nothing reads as recovered.
            Err(_) => return,
        };

        let mut observed_keys: HashSet<KnownIssueKey> = HashSet::new();
        let mut fresh = Vec::new();
        for obs in observations {
            if obs.kind == EventKind::NotReadyNode && !self.node_ready_to_fire(obs) {
                continue;
            }
            let key = KnownIssueKey {
                resource_kind: obs.resource_kind.clone(),
                namespace: obs.namespace.clone(),
                resource_name: obs.resource_name.clone(),
                kind: obs.kind,
            };
            observed_keys.insert(key.clone());
            if self.known.lock().insert(key) {
                fresh.push(obs.clone());
            }
        }

        // Recovery pass: keys of these kinds no longer observed re-arm.
        let recovered: Vec<KnownIssueKey> = {
            let known = self.known.lock();
            known
                .iter()
                .filter(|k| kinds.contains(&k.kind) && !observed_keys.contains(*k))
                .cloned()
                .collect()
        };
        for key in recovered {
            self.known.lock().remove(&key);
            if key.kind == EventKind::NotReadyNode {
                self.node_candidates.lock().remove(&key.resource_name);
            }
            tracing::info!(%key, "resource recovered, re-arming");
        }

        // Recovered node candidates that never fired also reset.
        if kinds.contains(&EventKind::NotReadyNode) {
            let observed_nodes: HashSet<&str> = observations
                .iter()
                .filter(|o| o.kind == EventKind::NotReadyNode)
                .map(|o| o.resource_name.as_str())
                .collect();
            self.node_candidates.lock().retain(|n| observed_nodes.contains(n.as_str()));
        }

        for obs in fresh {
            let event = self.build_event(&obs);
            self.dispatcher.dispatch(event).await;
        }
    }

    /// Flap suppression: a node fires only when its `Ready` condition has
    /// been non-True across two consecutive cycles, or transitioned longer
    /// than one interval ago.
    fn node_ready_to_fire(&self, obs: &Observation) -> bool {
        if let Some(age) = obs.ready_transition_age {
            if age >= self.config.interval {
                return true;
            }
        }
        let mut candidates = self.node_candidates.lock();
        if candidates.contains(&obs.resource_name) {
            true
        } else {
            candidates.insert(obs.resource_name.clone());
            false
        }
    }

    fn build_event(&self, obs: &Observation) -> ClusterEvent {
        let mut event = ClusterEvent::new(
            obs.kind,
            Severity::Critical,
            obs.resource_kind.clone(),
            obs.namespace.clone(),
            obs.resource_name.clone(),
            self.clock.epoch_ms(),
        );
        for (key, value) in &obs.annotations {
            event.annotate(key.clone(), value.clone());
        }
        event
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
