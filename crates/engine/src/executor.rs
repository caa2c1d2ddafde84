// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playbook executor: one task per run, strict step order, risk gating.
//!
//! LOW steps call the tool directly; MEDIUM/HIGH steps suspend on the
//! approval manager. Per-step failures are captured into the run record,
//! never raised past it. Terminal runs stay queryable for a retention
//! window.

use crate::approval::{ApprovalManager, ApprovalOutcome, ApprovalRequest};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rx_adapters::ChannelRouter;
use rx_core::{
    short, ChannelTarget, Clock, ClusterEvent, PlaybookRun, RunId, RunStatus, StepOutcome,
};
use rx_mcp::{McpManager, ToolResult};
use rx_playbook::{template, FailurePolicy, PlaybookRegistry, PlaybookStep};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tool output beyond this many bytes is elided in channel posts; the run
/// record keeps the full output.
const MAX_CHANNEL_OUTPUT: usize = 2048;

/// How long terminal runs stay queryable.
pub const DEFAULT_RUN_RETENTION: Duration = Duration::from_secs(900);

/// Errors starting a run. Step-level failures never surface here.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("unknown playbook: {0}")]
    UnknownPlaybook(String),
}

/// Shutdown drain accounting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Runs that reached a terminal state within the grace window
    pub completed: usize,
    /// Runs cancelled when the grace window closed
    pub cancelled: usize,
}

/// Runs playbooks on behalf of incidents.
pub struct PlaybookExecutor<C: Clock> {
    registry: Arc<PlaybookRegistry>,
    mcp: Arc<McpManager>,
    approvals: Arc<ApprovalManager<C>>,
    channels: ChannelRouter,
    runs: Arc<Mutex<HashMap<RunId, PlaybookRun>>>,
    tasks: Mutex<HashMap<RunId, JoinHandle<()>>>,
    cancel: CancellationToken,
    retention: Duration,
    clock: C,
}

impl<C: Clock> PlaybookExecutor<C> {
    pub fn new(
        registry: Arc<PlaybookRegistry>,
        mcp: Arc<McpManager>,
        approvals: Arc<ApprovalManager<C>>,
        channels: ChannelRouter,
        cancel: CancellationToken,
        clock: C,
    ) -> Self {
        Self {
            registry,
            mcp,
            approvals,
            channels,
            runs: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(HashMap::new()),
            cancel,
            retention: DEFAULT_RUN_RETENTION,
            clock,
        }
    }

    /// Start one run. Returns its id immediately; the run proceeds on its
    /// own task and progress is observable via [`PlaybookExecutor::run`].
    pub fn execute(
        self: &Arc<Self>,
        playbook_id: &str,
        event: ClusterEvent,
        channel_target: ChannelTarget,
    ) -> Result<RunId, ExecutorError> {
        let playbook = self
            .registry
            .get(playbook_id)
            .ok_or_else(|| ExecutorError::UnknownPlaybook(playbook_id.to_string()))?
            .clone();

        let run = PlaybookRun::new(playbook_id, event, channel_target, self.clock.epoch_ms());
        let run_id = run.run_id.clone();
        self.runs.lock().insert(run_id.clone(), run);

        let executor = Arc::clone(self);
        let task_run_id = run_id.clone();
        let handle = tokio::spawn(async move {
            executor.run_task(&task_run_id, playbook).await;
        });
        self.tasks.lock().insert(run_id.clone(), handle);
        Ok(run_id)
    }

    /// Snapshot of one run (live or retained).
    pub fn run(&self, run_id: &RunId) -> Option<PlaybookRun> {
        self.runs.lock().get(run_id).cloned()
    }

    /// Ids of runs not yet terminal.
    pub fn active_runs(&self) -> Vec<RunId> {
        self.runs.lock().values().filter(|r| !r.is_terminal()).map(|r| r.run_id.clone()).collect()
    }

    /// Wait for one run's task to finish (test and drain support).
    pub async fn join_run(&self, run_id: &RunId) {
        let handle = self.tasks.lock().remove(run_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(%run_id, error = %e, "run task panicked");
            }
        }
    }

    /// Drain in-flight runs: wait up to `grace`, then cancel the rest.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        let handles: Vec<(RunId, JoinHandle<()>)> = self.tasks.lock().drain().collect();
        if handles.is_empty() {
            return DrainReport::default();
        }

        let mut stranded = Vec::new();
        let deadline = tokio::time::Instant::now() + grace;
        for (run_id, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => {}
                Err(_) => stranded.push((run_id, handle)),
            }
        }

        if !stranded.is_empty() {
            tracing::warn!(stranded = stranded.len(), "grace elapsed, cancelling runs");
            self.cancel.cancel();
            // Cancellation lands at each task's next suspension point.
            for (run_id, handle) in stranded {
                if let Err(e) = handle.await {
                    tracing::error!(%run_id, error = %e, "cancelled run task panicked");
                }
            }
        }

        let mut report = DrainReport::default();
        let runs = self.runs.lock();
        for run in runs.values() {
            match run.status {
                RunStatus::Cancelled => report.cancelled += 1,
                s if s.is_terminal() => report.completed += 1,
                _ => {}
            }
        }
        report
    }

    async fn run_task(self: &Arc<Self>, run_id: &RunId, playbook: rx_playbook::Playbook) {
        let (event, target) = match self.run(run_id) {
            Some(run) => (run.event, run.channel_target),
            None => return,
        };

        self.notify(
            &target,
            &format!(
                "🚑 Run {} started: {} for {}",
                short(run_id.as_str(), 12),
                playbook.name,
                event
            ),
        )
        .await;
        tracing::info!(%run_id, playbook = %playbook.id, event = %event, "run started");

        let total = playbook.steps.len();
        let mut terminal = RunStatus::Completed;

        for (index, step) in playbook.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                terminal = RunStatus::Cancelled;
                break;
            }

            self.with_run(run_id, |run| run.begin_step(index, &step.name, self.clock.epoch_ms()));
            self.notify(
                &target,
                &format!("[{}/{}] {} ({} risk) …", index + 1, total, step.name, step.risk),
            )
            .await;

            let outcome = self.execute_step(run_id, step, &event, &target).await;
            let epoch_ms = self.clock.epoch_ms();
            self.with_run(run_id, |run| run.finalize_step(outcome.clone(), epoch_ms));
            self.notify(&target, &step_summary(index, total, &step.name, &outcome)).await;

            match &outcome {
                StepOutcome::Success(_) => {}
                StepOutcome::Cancelled => {
                    terminal = RunStatus::Cancelled;
                    break;
                }
                _ if step.on_failure == FailurePolicy::Continue => {
                    tracing::warn!(%run_id, step = %step.name, "step failed, policy continue");
                }
                StepOutcome::Expired => {
                    // An expiry on the final step reads as "died waiting at
                    // the end"; anywhere else it is an ordinary failure.
                    terminal =
                        if index + 1 == total { RunStatus::Expired } else { RunStatus::Failed };
                    break;
                }
                _ => {
                    terminal = RunStatus::Failed;
                    break;
                }
            }
        }

        let epoch_ms = self.clock.epoch_ms();
        self.with_run(run_id, |run| {
            run.transition(terminal, epoch_ms);
        });
        self.notify(
            &target,
            &format!("Run {} finished: {}", short(run_id.as_str(), 12), terminal),
        )
        .await;
        tracing::info!(%run_id, status = %terminal, "run finished");

        // Retain the record briefly for status queries, then forget it.
        let runs = Arc::clone(&self.runs);
        let retention = self.retention;
        let cleanup_id = run_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            runs.lock().remove(&cleanup_id);
        });
    }

    /// Execute one step to a terminal step outcome.
    async fn execute_step(
        self: &Arc<Self>,
        run_id: &RunId,
        step: &PlaybookStep,
        event: &ClusterEvent,
        target: &ChannelTarget,
    ) -> StepOutcome {
        // Render parameter templates; a parameter referencing absent
        // context is a step failure, not an empty-string tool call.
        let mut arguments: IndexMap<String, String> = IndexMap::new();
        let mut missing = Vec::new();
        for (key, template) in &step.params {
            let rendered = template::render(template, event);
            if !rendered.is_complete() {
                missing.extend(rendered.missing);
            }
            arguments.insert(key.clone(), rendered.value);
        }
        if !missing.is_empty() {
            return StepOutcome::Failure(format!(
                "missing context field(s): {}",
                missing.join(", ")
            ));
        }

        if step.risk.auto_executes() {
            let call = self.mcp.call_tool(&step.tool, json!(arguments));
            let result = tokio::select! {
                result = call => result,
                _ = self.cancel.cancelled() => return StepOutcome::Cancelled,
            };
            return match result {
                Ok(result) => tool_outcome(result),
                Err(e) => StepOutcome::Failure(e.to_string()),
            };
        }

        // Gated step: suspend on the approval handshake.
        let epoch_ms = self.clock.epoch_ms();
        self.with_run(run_id, |run| {
            run.transition(RunStatus::AwaitingApproval, epoch_ms);
        });
        let request = ApprovalRequest {
            tool_name: step.tool.clone(),
            arguments,
            risk: step.risk,
            description: step.description.clone(),
            run_id: run_id.clone(),
            channel_target: target.clone(),
        };
        let outcome = tokio::select! {
            outcome = self.approvals.request(request) => outcome,
            _ = self.cancel.cancelled() => return StepOutcome::Cancelled,
        };
        let epoch_ms = self.clock.epoch_ms();
        self.with_run(run_id, |run| {
            run.transition(RunStatus::Running, epoch_ms);
        });

        match outcome {
            ApprovalOutcome::Executed(result) => tool_outcome(result),
            ApprovalOutcome::Rejected { user_id } => StepOutcome::Rejected(user_id),
            ApprovalOutcome::Expired => StepOutcome::Expired,
        }
    }

    fn with_run(&self, run_id: &RunId, f: impl FnOnce(&mut PlaybookRun)) {
        if let Some(run) = self.runs.lock().get_mut(run_id) {
            f(run);
        }
    }

    async fn notify(&self, target: &ChannelTarget, text: &str) {
        if let Err(e) = self.channels.send(target, text).await {
            tracing::debug!(%target, error = %e, "progress message not delivered");
        }
    }
}

fn tool_outcome(result: ToolResult) -> StepOutcome {
    match result {
        ToolResult::Ok { .. } => StepOutcome::Success(result.text()),
        ToolResult::Error { code, message } => {
            StepOutcome::Failure(format!("tool error {code}: {message}"))
        }
    }
}

/// One-line step summary for the notification channel, output elided.
fn step_summary(index: usize, total: usize, name: &str, outcome: &StepOutcome) -> String {
    let detail = match outcome {
        StepOutcome::Success(output) => elide(output),
        StepOutcome::Failure(reason) => elide(reason),
        StepOutcome::Rejected(user) => format!("rejected by {user}"),
        StepOutcome::Expired => "approval expired".to_string(),
        StepOutcome::Cancelled => "cancelled".to_string(),
        StepOutcome::Running => String::new(),
    };
    if detail.is_empty() {
        format!("[{}/{}] {} → {}", index + 1, total, name, outcome)
    } else {
        format!("[{}/{}] {} → {}: {}", index + 1, total, name, outcome, detail)
    }
}

fn elide(text: &str) -> String {
    if text.len() <= MAX_CHANNEL_OUTPUT {
        text.to_string()
    } else {
        let mut end = MAX_CHANNEL_OUTPUT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}… ({} bytes elided)", &text[..end], text.len() - end)
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
