// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP ingress: the Alertmanager webhook.
//!
//! `POST /api/webhook/alertmanager` converts each firing alert into a
//! cluster event and hands it to the dispatch worker over a bounded
//! channel — the handler acknowledges the batch immediately and never
//! blocks on remediation. Firing alerts bypass the watch loop's
//! known-issues set entirely; Alertmanager owns their lifecycle.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rx_core::{Clock, ClusterEvent, EventKind, Severity};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Bound on events buffered between the webhook and the dispatch worker.
pub const INGRESS_QUEUE_DEPTH: usize = 256;

/// One alert in an Alertmanager batch. Unknown fields are ignored;
/// unknown shapes drop the alert, never the batch.
#[derive(Debug, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertBatch {
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Convert one firing alert into a cluster event. Resolved (or otherwise
/// non-firing) alerts yield `None`.
pub fn event_from_alert(alert: &Alert, now_ms: u64) -> Option<ClusterEvent> {
    if alert.status != "firing" {
        return None;
    }
    let labels = &alert.labels;
    let namespace = labels.get("namespace").cloned().unwrap_or_default();
    let (resource_kind, resource_name) = if let Some(pod) = labels.get("pod") {
        ("pod", pod.clone())
    } else if let Some(deployment) = labels.get("deployment") {
        ("deployment", deployment.clone())
    } else if let Some(node) = labels.get("node") {
        ("node", node.clone())
    } else {
        ("", String::new())
    };

    let mut event = ClusterEvent::new(
        EventKind::AlertmanagerFiring,
        Severity::Critical,
        resource_kind,
        if resource_kind == "node" { String::new() } else { namespace },
        resource_name,
        now_ms,
    );
    if let Some(alertname) = labels.get("alertname") {
        event.annotate("alertname", alertname.clone());
    }
    for (key, value) in &alert.annotations {
        if !event.annotate(key.clone(), value.clone()) {
            tracing::debug!(key, "alert annotation dropped at the bound");
        }
    }
    Some(event)
}

#[derive(Clone)]
struct IngressState {
    events: mpsc::Sender<ClusterEvent>,
    clock: rx_core::SystemClock,
}

/// Build the ingress router over the dispatch queue.
pub fn router(events: mpsc::Sender<ClusterEvent>) -> Router {
    let state = IngressState { events, clock: rx_core::SystemClock };
    Router::new()
        .route("/api/webhook/alertmanager", post(alertmanager))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn alertmanager(
    State(state): State<IngressState>,
    Json(batch): Json<AlertBatch>,
) -> (StatusCode, Json<Value>) {
    let now_ms = state.clock.epoch_ms();
    let mut accepted = 0usize;
    for alert in &batch.alerts {
        let Some(event) = event_from_alert(alert, now_ms) else { continue };
        match state.events.try_send(event) {
            Ok(()) => accepted += 1,
            Err(e) => {
                tracing::warn!(error = %e, "ingress queue full, dropping alert");
            }
        }
    }
    tracing::info!(batch = batch.alerts.len(), accepted, "alertmanager batch accepted");
    (StatusCode::OK, Json(json!({"status": "accepted"})))
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod tests;
