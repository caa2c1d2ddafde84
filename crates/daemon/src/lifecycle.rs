// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine lifecycle: startup ordering, one cancellation scope, shutdown.
//!
//! Startup: tool servers first (the playbook registry validates against
//! the discovered tools and refuses to start on any miss), then the
//! executor pipeline, then the watch loop. Shutdown runs in reverse:
//! quiesce the watch loop so no new events arrive, drain in-flight runs
//! within the grace window, then tear down the transports.

use crate::config::Config;
use rx_adapters::{ChannelRouter, ClusterObserver, KubeObserver, ObserveError};
use rx_core::{ClusterEvent, SystemClock};
use rx_engine::{ApprovalManager, Dispatcher, PlaybookExecutor, WatchConfig, WatchLoop};
use rx_mcp::{McpError, McpManager};
use rx_playbook::{PlaybookRegistry, RegistryError, RuleEngine};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors that abort engine startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("mcp startup failed: {0}")]
    Mcp(#[from] McpError),
    #[error("playbook validation failed: {0}")]
    Playbooks(#[from] RegistryError),
    #[error("cluster observer unavailable: {0}")]
    Observer(#[from] ObserveError),
}

/// The running engine: every long-lived task hangs off one root
/// cancellation scope.
pub struct Engine<O: ClusterObserver> {
    mcp: Arc<McpManager>,
    approvals: Arc<ApprovalManager<SystemClock>>,
    executor: Arc<PlaybookExecutor<SystemClock>>,
    dispatcher: Arc<Dispatcher<SystemClock>>,
    watch: Option<Arc<WatchLoop<O, SystemClock>>>,
    watch_task: Option<JoinHandle<()>>,
    dispatch_worker: JoinHandle<()>,
    events_tx: mpsc::Sender<ClusterEvent>,
    root: CancellationToken,
    watch_cancel: CancellationToken,
    worker_cancel: CancellationToken,
    grace: Duration,
}

impl Engine<KubeObserver> {
    /// Bring the engine up against the real cluster and the configured
    /// tool servers.
    pub async fn start(
        config: Config,
        channels: ChannelRouter,
    ) -> Result<Engine<KubeObserver>, StartupError> {
        let mcp =
            Arc::new(McpManager::start(&config.mcp.servers, config.tool_call_timeout()).await?);
        let observer = if config.watchloop.enabled {
            Some(Arc::new(KubeObserver::new().await?))
        } else {
            None
        };
        Self::assemble(config, channels, mcp, observer)
    }
}

impl<O: ClusterObserver> Engine<O> {
    /// Wire the engine over an already-started MCP manager and an
    /// optional observer. Startup validation lives here.
    pub fn assemble(
        config: Config,
        channels: ChannelRouter,
        mcp: Arc<McpManager>,
        observer: Option<Arc<O>>,
    ) -> Result<Engine<O>, StartupError> {
        let clock = SystemClock;
        let root = CancellationToken::new();

        let registry = Arc::new(PlaybookRegistry::builtin());
        registry.validate_tools(|tool| mcp.has_tool(tool))?;

        let approvals = Arc::new(ApprovalManager::new(
            Arc::clone(&mcp),
            channels.clone(),
            config.approval_timeout(),
            clock,
        ));
        let executor = Arc::new(PlaybookExecutor::new(
            registry,
            Arc::clone(&mcp),
            Arc::clone(&approvals),
            channels.clone(),
            root.child_token(),
            clock,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(RuleEngine::builtin()),
            Arc::clone(&executor),
            channels,
            config.aiops.notification_channel.clone(),
            config.aiops.auto_remediation,
        ));

        // Ingress events flow through a bounded queue into this worker.
        let (events_tx, mut events_rx) =
            mpsc::channel::<ClusterEvent>(crate::ingress::INGRESS_QUEUE_DEPTH);
        let worker_dispatcher = Arc::clone(&dispatcher);
        let worker_cancel = root.child_token();
        let worker_token = worker_cancel.clone();
        let dispatch_worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events_rx.recv() => match event {
                        Some(event) => {
                            worker_dispatcher.dispatch(event).await;
                        }
                        None => break,
                    },
                    _ = worker_token.cancelled() => break,
                }
            }
        });

        let watch_cancel = root.child_token();
        let (watch, watch_task) = match observer {
            Some(observer) if config.watchloop.enabled => {
                let watch = Arc::new(WatchLoop::new(
                    observer,
                    Arc::clone(&dispatcher),
                    WatchConfig { interval: config.watch_interval() },
                    clock,
                    watch_cancel.clone(),
                ));
                let task = tokio::spawn(Arc::clone(&watch).run());
                (Some(watch), Some(task))
            }
            _ => {
                tracing::info!("watch loop disabled");
                (None, None)
            }
        };

        tracing::info!(
            tools = mcp.tools().len(),
            watch = watch.is_some(),
            "engine started"
        );
        Ok(Engine {
            mcp,
            approvals,
            executor,
            dispatcher,
            watch,
            watch_task,
            dispatch_worker,
            events_tx,
            root,
            watch_cancel,
            worker_cancel,
            grace: config.shutdown_grace(),
        })
    }

    /// Queue handle for the HTTP ingress.
    pub fn events(&self) -> mpsc::Sender<ClusterEvent> {
        self.events_tx.clone()
    }

    /// The approval reply hook for chat routers.
    pub fn approvals(&self) -> Arc<ApprovalManager<SystemClock>> {
        Arc::clone(&self.approvals)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher<SystemClock>> {
        Arc::clone(&self.dispatcher)
    }

    pub fn executor(&self) -> Arc<PlaybookExecutor<SystemClock>> {
        Arc::clone(&self.executor)
    }

    /// Diagnostics: the watch loop's known-issues snapshot.
    pub fn known_issues(&self) -> Vec<rx_core::KnownIssueKey> {
        match &self.watch {
            Some(watch) => watch.known_issues().into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Graceful shutdown: watch loop first, then run drain, then transports.
    pub async fn shutdown(self) {
        tracing::info!("engine shutting down");

        // 1. Quiesce event intake.
        self.watch_cancel.cancel();
        if let Some(task) = self.watch_task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "watch task join failed");
            }
        }
        drop(self.events_tx);
        self.worker_cancel.cancel();
        if let Err(e) = self.dispatch_worker.await {
            tracing::warn!(error = %e, "dispatch worker join failed");
        }

        // 2. Drain in-flight runs within the grace window.
        let report = self.executor.drain(self.grace).await;
        tracing::info!(
            completed = report.completed,
            cancelled = report.cancelled,
            "run drain finished"
        );

        // 3. Tear down transports and the rest of the scope.
        self.root.cancel();
        self.mcp.shutdown().await;
        tracing::info!("engine stopped");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
