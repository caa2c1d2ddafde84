// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch: one entry point from detection to remediation.
//!
//! Both the watch loop and the Alertmanager ingress feed events here.
//! Dispatch matches rules, alerts the SRE channel, and — when
//! auto-remediation is on — launches one run per matched playbook. A
//! failure dispatching one event never propagates to the caller's loop.

use crate::executor::PlaybookExecutor;
use rx_adapters::ChannelRouter;
use rx_core::{ChannelTarget, Clock, ClusterEvent, RunId};
use rx_playbook::RuleEngine;
use std::sync::Arc;

/// Matches events to playbooks and launches runs.
pub struct Dispatcher<C: Clock> {
    rules: Arc<RuleEngine>,
    executor: Arc<PlaybookExecutor<C>>,
    channels: ChannelRouter,
    /// Where alerts and run progress go
    notification_target: ChannelTarget,
    /// When false, alert only — never launch runs
    auto_remediation: bool,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(
        rules: Arc<RuleEngine>,
        executor: Arc<PlaybookExecutor<C>>,
        channels: ChannelRouter,
        notification_target: ChannelTarget,
        auto_remediation: bool,
    ) -> Self {
        Self { rules, executor, channels, notification_target, auto_remediation }
    }

    /// Process one event end to end. Returns the launched run ids.
    pub async fn dispatch(&self, event: ClusterEvent) -> Vec<RunId> {
        let matches = self.rules.match_event(&event);
        tracing::info!(
            event = %event,
            severity = %event.severity,
            matched = matches.len(),
            "dispatching cluster event"
        );

        let alert = format_alert(&event, &matches, self.auto_remediation);
        if let Err(e) = self.channels.send(&self.notification_target, &alert).await {
            tracing::warn!(error = %e, "alert delivery failed");
        }

        if !self.auto_remediation {
            return Vec::new();
        }

        let mut run_ids = Vec::new();
        for matched in &matches {
            // Rule params become event context, never overriding what the
            // observation itself captured.
            let mut run_event = event.clone();
            if let Some(rule) = self.rules.rule(&matched.rule_id) {
                for (key, value) in &rule.params {
                    if !run_event.annotations.contains_key(key) {
                        run_event.annotate(key.clone(), value.clone());
                    }
                }
            }
            match self.executor.execute(
                &matched.playbook_id,
                run_event,
                self.notification_target.clone(),
            ) {
                Ok(run_id) => run_ids.push(run_id),
                Err(e) => {
                    tracing::error!(
                        rule = %matched.rule_id,
                        playbook = %matched.playbook_id,
                        error = %e,
                        "failed to launch run"
                    );
                }
            }
        }
        run_ids
    }
}

/// SRE-channel alert: kind, resource, severity, matched playbooks.
fn format_alert(
    event: &ClusterEvent,
    matches: &[rx_playbook::RuleMatch],
    auto_remediation: bool,
) -> String {
    let mut out = format!(
        "🔴 {severity} incident: {event}",
        severity = event.severity.to_string().to_uppercase(),
    );
    if matches.is_empty() {
        out.push_str("\nNo remediation playbook matched.");
    } else {
        let ids: Vec<&str> = matches.iter().map(|m| m.playbook_id.as_str()).collect();
        out.push_str(&format!("\nMatched playbooks: {}", ids.join(", ")));
        if !auto_remediation {
            out.push_str("\nAuto-remediation is disabled; no runs launched.");
        }
    }
    out
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
