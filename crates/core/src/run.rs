// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playbook run identifier and state machine.

use crate::channel::ChannelTarget;
use crate::event::ClusterEvent;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for one playbook run.
    pub struct RunId("run-");
}

/// Status of a playbook run. Transitions are monotone: terminal states
/// are sinks and `AwaitingApproval` occurs only at a step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired
        )
    }
}

crate::simple_display! {
    RunStatus {
        Running => "running",
        AwaitingApproval => "awaiting_approval",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

/// Outcome of one step, carrying the serialized tool output or the
/// failure/rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Step is still executing (placeholder until finalized)
    Running,
    /// Tool returned without error; carries the serialized tool output
    Success(String),
    /// Tool or templating failed; carries the reason
    Failure(String),
    /// A human rejected the approval; carries the responder's user id
    Rejected(String),
    /// The approval expired unanswered
    Expired,
    /// Engine shutdown interrupted the step
    Cancelled,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }
}

crate::simple_display! {
    StepOutcome {
        Running => "running",
        Success(..) => "success",
        Failure(..) => "failure",
        Rejected(..) => "rejected",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

/// Record of one executed step in a run's output list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub outcome: StepOutcome,
}

/// One instance of a playbook executing against one triggering event.
///
/// Owned by the executor; kept in memory for the duration of the run plus
/// a short retention window for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookRun {
    pub run_id: RunId,
    pub playbook_id: String,
    /// Snapshot of the triggering event
    pub event: ClusterEvent,
    pub status: RunStatus,
    /// Index of the step currently executing (or next to execute)
    pub cursor: usize,
    pub steps: Vec<StepRecord>,
    pub channel_target: ChannelTarget,
    pub started_at_ms: u64,
    pub terminal_at_ms: Option<u64>,
}

impl PlaybookRun {
    pub fn new(
        playbook_id: impl Into<String>,
        event: ClusterEvent,
        channel_target: ChannelTarget,
        started_at_ms: u64,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            playbook_id: playbook_id.into(),
            event,
            status: RunStatus::Running,
            cursor: 0,
            steps: Vec::new(),
            channel_target,
            started_at_ms,
            terminal_at_ms: None,
        }
    }

    /// Open a record for the step at `index`. The cursor advances with it.
    pub fn begin_step(&mut self, index: usize, name: &str, epoch_ms: u64) {
        self.cursor = index;
        self.steps.push(StepRecord {
            index,
            name: name.to_string(),
            started_at_ms: epoch_ms,
            finished_at_ms: None,
            outcome: StepOutcome::Running,
        });
    }

    /// Finalize the most recent step record
    pub fn finalize_step(&mut self, outcome: StepOutcome, epoch_ms: u64) {
        if let Some(record) = self.steps.last_mut() {
            if record.finished_at_ms.is_none() {
                record.finished_at_ms = Some(epoch_ms);
                record.outcome = outcome;
            }
        }
    }

    /// Attempt a status transition. Terminal states are sinks: a transition
    /// out of a terminal state is refused and `false` is returned.
    pub fn transition(&mut self, next: RunStatus, epoch_ms: u64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.terminal_at_ms = Some(epoch_ms);
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
