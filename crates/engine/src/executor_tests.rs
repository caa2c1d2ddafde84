// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_stack::{stack, wait_until, Stack};
use rx_core::{EventKind, Severity};

fn crash_event() -> ClusterEvent {
    ClusterEvent::new(EventKind::CrashLoop, Severity::Critical, "pod", "prod", "nginx-abc", 1_000)
        .with_annotation("container", "web")
}

fn firing_event(with_replicas: bool) -> ClusterEvent {
    let event = ClusterEvent::new(
        EventKind::AlertmanagerFiring,
        Severity::Critical,
        "deployment",
        "prod",
        "api",
        1_000,
    );
    if with_replicas {
        event.with_annotation("target_replicas", "5")
    } else {
        event
    }
}

async fn approve_next(s: &Stack) -> String {
    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();
    s.approvals.handle_reply(&format!("approve {short_id}"), "oncall").await;
    short_id
}

#[tokio::test]
async fn crash_loop_run_completes_through_the_approval_gate() {
    let s = stack().await;
    s.transport.set_result("k8s_describe_pod", "pod description");
    s.transport.set_result("k8s_get_pod_logs", "panic: out of cheese");
    s.transport.set_result("k8s_restart_pod", "pod restarted");
    s.transport.set_result("k8s_get_pod_status", "Running, all containers ready");

    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();

    // The two LOW steps complete and the MEDIUM step parks on approval.
    wait_until(|| {
        s.executor.run(&run_id).map(|r| r.status == RunStatus::AwaitingApproval).unwrap_or(false)
    })
    .await;
    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.steps.len(), 3);
    assert!(run.steps[0].outcome.is_success());
    assert!(run.steps[1].outcome.is_success());
    assert!(s.transport.tool_calls("k8s_restart_pod").is_empty(), "gated tool not yet called");

    let pending = &s.approvals.pending()[0];
    assert_eq!(pending.tool_name, "k8s_restart_pod");
    assert_eq!(pending.arguments.get("pod_name").map(String::as_str), Some("nginx-abc"));
    assert_eq!(pending.arguments.get("namespace").map(String::as_str), Some("prod"));
    assert_eq!(pending.run_id, run_id);

    approve_next(&s).await;
    s.executor.join_run(&run_id).await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    let indices: Vec<usize> = run.steps.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(run.steps[2].outcome, StepOutcome::Success("pod restarted".into()));

    let restart_args = s.transport.tool_calls("k8s_restart_pod");
    assert_eq!(restart_args.len(), 1);
    assert_eq!(restart_args[0]["pod_name"], "nginx-abc");
    assert_eq!(restart_args[0]["namespace"], "prod");
    // Step order on the wire: describe, logs, restart, verify.
    assert_eq!(s.transport.tool_calls("k8s_get_pod_status").len(), 1);
}

#[tokio::test]
async fn rejected_approval_fails_the_run_without_calling_the_tool() {
    let s = stack().await;
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();

    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();
    s.approvals.handle_reply(&format!("reject {short_id}"), "user-9").await;
    s.executor.join_run(&run_id).await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.steps.len(), 3, "no step after the rejected one");
    assert_eq!(run.steps[2].outcome, StepOutcome::Rejected("user-9".into()));
    assert!(s.transport.tool_calls("k8s_restart_pod").is_empty());
    assert!(s.transport.tool_calls("k8s_get_pod_status").is_empty());
}

#[tokio::test(start_paused = true)]
async fn expired_approval_mid_run_fails_the_run() {
    let s = stack().await;
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();
    s.executor.join_run(&run_id).await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.steps[2].outcome, StepOutcome::Expired);
    assert!(s.transport.tool_calls("k8s_restart_pod").is_empty());
}

#[tokio::test(start_paused = true)]
async fn expiry_on_the_final_step_marks_the_run_expired() {
    let s = stack().await;
    let run_id =
        s.executor.execute("scale_up_on_load", firing_event(true), s.target.clone()).unwrap();
    s.executor.join_run(&run_id).await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Expired);
    assert_eq!(run.steps[0].outcome, StepOutcome::Expired);
}

#[tokio::test]
async fn missing_required_parameter_fails_the_step_with_a_reason() {
    let s = stack().await;
    let run_id =
        s.executor.execute("scale_up_on_load", firing_event(false), s.target.clone()).unwrap();
    s.executor.join_run(&run_id).await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    match &run.steps[0].outcome {
        StepOutcome::Failure(reason) => {
            assert!(reason.contains("annotations.target_replicas"), "reason: {reason}");
            assert!(!reason.contains("None"));
        }
        other => panic!("expected Failure, got {other:?}"),
    }
    assert!(s.transport.tool_calls("k8s_scale_deployment").is_empty());
}

#[tokio::test]
async fn low_step_tool_error_fails_the_run() {
    let s = stack().await;
    s.transport.set_error("k8s_describe_pod", -32000, "API server unavailable");
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();
    s.executor.join_run(&run_id).await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.steps.len(), 1);
    match &run.steps[0].outcome {
        StepOutcome::Failure(reason) => assert!(reason.contains("API server unavailable")),
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_playbook_is_rejected_up_front() {
    let s = stack().await;
    let err = s.executor.execute("no_such_playbook", crash_event(), s.target.clone()).unwrap_err();
    assert!(matches!(err, ExecutorError::UnknownPlaybook(_)));
}

#[tokio::test]
async fn concurrent_runs_are_isolated() {
    let s = stack().await;
    let event_b = ClusterEvent::new(
        EventKind::AlertmanagerFiring,
        Severity::Critical,
        "deployment",
        "staging",
        "worker",
        2_000,
    )
    .with_annotation("target_replicas", "9");

    let run_a =
        s.executor.execute("scale_up_on_load", firing_event(true), s.target.clone()).unwrap();
    let run_b = s.executor.execute("scale_up_on_load", event_b, s.target.clone()).unwrap();
    assert_ne!(run_a, run_b);

    wait_until(|| s.approvals.pending().len() == 2).await;
    for pending in s.approvals.pending() {
        s.approvals.handle_reply(&format!("approve {}", pending.short_id), "oncall").await;
    }
    s.executor.join_run(&run_a).await;
    s.executor.join_run(&run_b).await;

    let a = s.executor.run(&run_a).unwrap();
    let b = s.executor.run(&run_b).unwrap();
    assert_eq!(a.status, RunStatus::Completed);
    assert_eq!(b.status, RunStatus::Completed);
    assert_eq!(a.event.resource_name, "api");
    assert_eq!(b.event.resource_name, "worker");
    assert!(a.steps.iter().all(|r| r.index == 0));
    assert!(b.steps.iter().all(|r| r.index == 0));

    let mut replicas: Vec<String> = s
        .transport
        .tool_calls("k8s_scale_deployment")
        .iter()
        .map(|args| args["replicas"].as_str().unwrap_or_default().to_string())
        .collect();
    replicas.sort();
    assert_eq!(replicas, vec!["5".to_string(), "9".to_string()]);
}

#[tokio::test]
async fn drain_cancels_runs_stuck_awaiting_approval() {
    let s = stack().await;
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();
    wait_until(|| {
        s.executor.run(&run_id).map(|r| r.status == RunStatus::AwaitingApproval).unwrap_or(false)
    })
    .await;

    let report = s.executor.drain(Duration::from_millis(50)).await;
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.completed, 0);

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.steps[2].outcome, StepOutcome::Cancelled);
    assert!(s.transport.tool_calls("k8s_restart_pod").is_empty());
}

#[tokio::test]
async fn completed_runs_count_in_the_drain_report() {
    let s = stack().await;
    s.transport.set_result("k8s_describe_pod", "ok");
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();
    let approvals_task = {
        let s_approvals = std::sync::Arc::clone(&s.approvals);
        tokio::spawn(async move {
            loop {
                let pending = s_approvals.pending();
                if let Some(p) = pending.first() {
                    s_approvals.handle_reply(&format!("approve {}", p.short_id), "u").await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };
    let report = s.executor.drain(Duration::from_secs(2)).await;
    approvals_task.await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.cancelled, 0);
    assert_eq!(s.executor.run(&run_id).unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn progress_messages_bracket_the_run() {
    let s = stack().await;
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();
    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();
    s.approvals.handle_reply(&format!("approve {short_id}"), "u").await;
    s.executor.join_run(&run_id).await;

    let messages = s.sender.sent_to("sre");
    assert!(messages.first().unwrap().contains("Run"), "start line first");
    assert!(messages.first().unwrap().contains("Crash loop remediation"));
    assert!(messages.last().unwrap().contains("finished: completed"));
    // Every step start and end is posted, plus the approval prompt.
    assert!(messages.iter().any(|m| m.contains("[3/4] restart_pod")));
    assert!(messages.iter().any(|m| m.contains("requires approval")));
}

#[tokio::test]
async fn long_tool_output_is_elided_in_channel_posts_but_kept_in_the_record() {
    let s = stack().await;
    let big = "x".repeat(10_000);
    s.transport.set_result("k8s_describe_pod", &big);
    let run_id = s
        .executor
        .execute("crash_loop_remediation", crash_event(), s.target.clone())
        .unwrap();
    wait_until(|| {
        s.executor.run(&run_id).map(|r| r.status == RunStatus::AwaitingApproval).unwrap_or(false)
    })
    .await;

    let run = s.executor.run(&run_id).unwrap();
    assert_eq!(run.steps[0].outcome, StepOutcome::Success(big.clone()));

    let oversized = s.sender.messages().iter().any(|m| m.text.len() > 4096);
    assert!(!oversized, "channel posts stay bounded");
    assert!(s.sender.messages().iter().any(|m| m.text.contains("bytes elided")));

    // Let the parked run conclude so the task does not outlive the test.
    let short_id = s.approvals.pending()[0].short_id.clone();
    s.approvals.handle_reply(&format!("reject {short_id}"), "u").await;
    s.executor.join_run(&run_id).await;
}
