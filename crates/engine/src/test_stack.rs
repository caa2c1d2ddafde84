// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine test fixture: the full pipeline over fakes.

use crate::approval::ApprovalManager;
use crate::dispatch::Dispatcher;
use crate::executor::PlaybookExecutor;
use indexmap::IndexMap;
use rx_adapters::{ChannelRouter, FakeChannelSender};
use rx_core::{ChannelTarget, FakeClock};
use rx_mcp::{FakeTransport, McpManager, ToolTransport, DEFAULT_CALL_TIMEOUT};
use rx_playbook::{PlaybookRegistry, RuleEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tools the built-in playbooks require, all served by one fake server.
pub const BUILTIN_TOOLS: &[&str] = &[
    "k8s_describe_pod",
    "k8s_get_pod_logs",
    "k8s_restart_pod",
    "k8s_get_pod_status",
    "k8s_get_resource_limits",
    "k8s_patch_memory_limit",
    "k8s_rollout_history",
    "k8s_rollback_deployment",
    "k8s_rollout_status",
    "k8s_describe_node",
    "k8s_cordon_node",
    "k8s_drain_node",
    "k8s_scale_deployment",
];

pub struct Stack {
    pub transport: FakeTransport,
    pub sender: FakeChannelSender,
    pub approvals: Arc<ApprovalManager<FakeClock>>,
    pub executor: Arc<PlaybookExecutor<FakeClock>>,
    pub dispatcher: Arc<Dispatcher<FakeClock>>,
    pub clock: FakeClock,
    pub cancel: CancellationToken,
    pub target: ChannelTarget,
}

pub struct StackOptions {
    pub approval_timeout: Duration,
    pub auto_remediation: bool,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self { approval_timeout: Duration::from_secs(900), auto_remediation: true }
    }
}

pub async fn stack() -> Stack {
    stack_with(StackOptions::default()).await
}

pub async fn stack_with(options: StackOptions) -> Stack {
    let transport = FakeTransport::new("kubernetes", BUILTIN_TOOLS);
    let mut catalog: indexmap::IndexMap<String, Arc<dyn ToolTransport>> = IndexMap::new();
    catalog.insert("kubernetes".to_string(), Arc::new(transport.clone()));
    let mcp =
        Arc::new(McpManager::with_transports(catalog, DEFAULT_CALL_TIMEOUT).await.unwrap());

    let registry = Arc::new(PlaybookRegistry::builtin());
    registry.validate_tools(|tool| mcp.has_tool(tool)).unwrap();

    let sender = FakeChannelSender::new("telegram");
    let mut channels = ChannelRouter::new();
    channels.register(Arc::new(sender.clone()));

    let clock = FakeClock::new();
    let cancel = CancellationToken::new();
    let approvals = Arc::new(ApprovalManager::new(
        Arc::clone(&mcp),
        channels.clone(),
        options.approval_timeout,
        clock.clone(),
    ));
    let executor = Arc::new(PlaybookExecutor::new(
        registry,
        Arc::clone(&mcp),
        Arc::clone(&approvals),
        channels.clone(),
        cancel.child_token(),
        clock.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(RuleEngine::builtin()),
        Arc::clone(&executor),
        channels,
        ChannelTarget::new("telegram", "sre"),
        options.auto_remediation,
    ));

    Stack {
        transport,
        sender,
        approvals,
        executor,
        dispatcher,
        clock,
        cancel,
        target: ChannelTarget::new("telegram", "sre"),
    }
}

/// Poll until `cond` holds (real-time runtimes only).
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}
