// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_stack::{stack, wait_until};
use rx_core::FakeClock;

fn sample_request(target: &ChannelTarget) -> ApprovalRequest {
    let mut arguments = IndexMap::new();
    arguments.insert("pod_name".to_string(), "nginx-abc".to_string());
    arguments.insert("namespace".to_string(), "prod".to_string());
    ApprovalRequest {
        tool_name: "k8s_restart_pod".to_string(),
        arguments,
        risk: Risk::Medium,
        description: "Delete the pod so its controller recreates it".to_string(),
        run_id: RunId::new(),
        channel_target: target.clone(),
    }
}

#[test]
fn prompt_names_the_short_id_and_expiry() {
    let clock = FakeClock::new();
    let now_ms = clock.epoch_ms();
    let mut arguments = IndexMap::new();
    arguments.insert("pod_name".to_string(), "nginx-abc".to_string());
    let approval_id = ApprovalId::new();
    let pending = PendingApproval {
        short_id: approval_id.short_id().to_string(),
        approval_id: approval_id.clone(),
        tool_name: "k8s_restart_pod".to_string(),
        arguments,
        risk: Risk::Medium,
        description: "Delete the pod so its controller recreates it".to_string(),
        run_id: RunId::new(),
        channel_target: ChannelTarget::new("telegram", "sre"),
        created_at_ms: now_ms,
        expires_at_ms: now_ms + 900_000,
        status: ApprovalStatus::Pending,
    };

    let prompt = format_prompt(&pending, now_ms);
    let id = approval_id.short_id();
    assert!(prompt.contains("⚠️ MEDIUM risk step requires approval"));
    assert!(prompt.contains("Delete the pod so its controller recreates it"));
    assert!(prompt.contains("Tool: k8s_restart_pod"));
    assert!(prompt.contains("pod_name: nginx-abc"));
    assert!(prompt.contains(&format!("Reply with `approve {id}` to proceed or `reject {id}` to cancel.")));
    assert!(prompt.contains("Expires in 15 minutes."));
}

#[tokio::test]
async fn approve_reply_invokes_the_tool_and_resolves_executed() {
    let s = stack().await;
    s.transport.set_result("k8s_restart_pod", "pod restarted");

    let approvals = Arc::clone(&s.approvals);
    let request = sample_request(&s.target);
    let waiter = tokio::spawn(async move { approvals.request(request).await });

    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();
    assert_eq!(s.sender.sent_to("sre").len(), 1, "prompt posted");

    let action = s.approvals.handle_reply(&format!("approve {short_id}"), "user-7").await;
    assert_eq!(action, Some(ReplyAction::Approved));

    let outcome = waiter.await.unwrap();
    match outcome {
        ApprovalOutcome::Executed(result) => assert_eq!(result.text(), "pod restarted"),
        other => panic!("expected Executed, got {other:?}"),
    }
    let calls = s.transport.tool_calls("k8s_restart_pod");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["pod_name"], "nginx-abc");
    assert_eq!(calls[0]["namespace"], "prod");
}

#[tokio::test]
async fn reject_reply_resolves_without_calling_the_tool() {
    let s = stack().await;
    let approvals = Arc::clone(&s.approvals);
    let request = sample_request(&s.target);
    let waiter = tokio::spawn(async move { approvals.request(request).await });

    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();

    let action = s.approvals.handle_reply(&format!("reject {short_id}"), "user-9").await;
    assert_eq!(action, Some(ReplyAction::Rejected));

    let outcome = waiter.await.unwrap();
    assert!(matches!(outcome, ApprovalOutcome::Rejected { ref user_id } if user_id == "user-9"));
    assert!(s.transport.tool_calls("k8s_restart_pod").is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_approval_expires() {
    let s = stack().await;
    let approvals = Arc::clone(&s.approvals);
    let request = sample_request(&s.target);
    let outcome = approvals.request(request).await;
    assert!(matches!(outcome, ApprovalOutcome::Expired));
    assert!(s.transport.tool_calls("k8s_restart_pod").is_empty());
}

#[tokio::test]
async fn second_reply_for_terminal_approval_is_ignored() {
    let s = stack().await;
    let approvals = Arc::clone(&s.approvals);
    let request = sample_request(&s.target);
    let waiter = tokio::spawn(async move { approvals.request(request).await });

    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();

    assert!(s.approvals.handle_reply(&format!("yes {short_id}"), "a").await.is_some());
    let _ = waiter.await;
    // Now terminal: further matching replies are no-ops.
    assert!(s.approvals.handle_reply(&format!("reject {short_id}"), "b").await.is_none());
    assert!(s.approvals.handle_reply(&format!("approve {short_id}"), "c").await.is_none());
    assert_eq!(s.transport.tool_calls("k8s_restart_pod").len(), 1);
}

#[tokio::test]
async fn unrelated_messages_are_ignored() {
    let s = stack().await;
    assert!(s.approvals.handle_reply("what is going on with prod?", "u").await.is_none());
    assert!(s.approvals.handle_reply("approve deadbeef", "u").await.is_none());
}

#[tokio::test]
async fn tool_failure_after_approval_stays_executed_not_rejected() {
    let s = stack().await;
    s.transport.set_error("k8s_restart_pod", -32000, "pods \"nginx-abc\" is forbidden");

    let approvals = Arc::clone(&s.approvals);
    let request = sample_request(&s.target);
    let waiter = tokio::spawn(async move { approvals.request(request).await });

    wait_until(|| !s.approvals.pending().is_empty()).await;
    let short_id = s.approvals.pending()[0].short_id.clone();
    s.approvals.handle_reply(&format!("confirm {short_id}"), "user-1").await;

    let outcome = waiter.await.unwrap();
    match outcome {
        ApprovalOutcome::Executed(rx_mcp::ToolResult::Error { code, ref message }) => {
            assert_eq!(code, -32000);
            assert!(message.contains("forbidden"));
        }
        other => panic!("tool failure must stay an Executed outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_pendings_have_distinct_short_ids() {
    let s = stack().await;
    let mut waiters = Vec::new();
    for _ in 0..4 {
        let approvals = Arc::clone(&s.approvals);
        let request = sample_request(&s.target);
        waiters.push(tokio::spawn(async move { approvals.request(request).await }));
    }
    wait_until(|| s.approvals.pending().len() == 4).await;
    let mut ids: Vec<String> =
        s.approvals.pending().into_iter().map(|p| p.short_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    for id in ids {
        s.approvals.handle_reply(&format!("no {id}"), "u").await;
    }
    for waiter in waiters {
        assert!(matches!(waiter.await.unwrap(), ApprovalOutcome::Rejected { .. }));
    }
}
