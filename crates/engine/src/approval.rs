// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval manager: the bounded, expiring human handshake.
//!
//! One [`rx_core::PendingApproval`] per gated step lives in the shared TTL
//! store under `approval:<short_id>`. The executor's run task suspends on a
//! oneshot handle; the handle resolves exactly once — from the chat reply
//! hook, or from the expiry timer. The store is the arbiter: status moves
//! out of `Pending` atomically under the store lock, so a second reply or
//! a late timer is a no-op.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rx_adapters::ChannelRouter;
use rx_core::{
    parse_reply, ApprovalId, ApprovalStatus, ChannelTarget, Clock, PendingApproval, ReplyVerb,
    Risk, RunId, TtlCache,
};
use rx_mcp::{McpManager, ToolResult};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Store key prefix for pending approvals.
const STORE_PREFIX: &str = "approval:";

/// Default pending-approval TTL.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(900);

/// Bound on concurrently live pendings in the store.
const STORE_CAPACITY: usize = 1024;

/// Terminal outcome of one approval handshake.
#[derive(Debug)]
pub enum ApprovalOutcome {
    /// A human approved and the tool was invoked; carries the tool's
    /// result (which may itself be a tool-level error — an operational
    /// failure, never disguised as a rejection).
    Executed(ToolResult),
    /// A human rejected; carries the responder's user id.
    Rejected { user_id: String },
    /// The TTL elapsed with no reply.
    Expired,
}

/// What a handled reply did. `None` from the hook means the message was
/// not an approval reply (or addressed no live pending) and was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAction {
    Approved,
    Rejected,
}

/// One gated step asking for confirmation.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub arguments: IndexMap<String, String>,
    pub risk: Risk,
    pub description: String,
    pub run_id: RunId,
    pub channel_target: ChannelTarget,
}

/// Broker between suspended executor tasks and humans in chat.
pub struct ApprovalManager<C: Clock> {
    store: TtlCache<PendingApproval, C>,
    waiters: Mutex<HashMap<String, oneshot::Sender<ApprovalOutcome>>>,
    mcp: Arc<McpManager>,
    channels: ChannelRouter,
    timeout: Duration,
    clock: C,
}

impl<C: Clock> ApprovalManager<C> {
    pub fn new(
        mcp: Arc<McpManager>,
        channels: ChannelRouter,
        timeout: Duration,
        clock: C,
    ) -> Self {
        Self {
            store: TtlCache::new(STORE_CAPACITY, clock.clone()),
            waiters: Mutex::new(HashMap::new()),
            mcp,
            channels,
            timeout,
            clock,
        }
    }

    /// Ask a human and suspend until the handshake concludes.
    ///
    /// Publishes the prompt, parks the caller on a completion handle, and
    /// arms the expiry timer. Resolution happens at most once.
    pub async fn request(self: &Arc<Self>, request: ApprovalRequest) -> ApprovalOutcome {
        let pending = self.create_pending(request);
        let short_id = pending.short_id.clone();

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(short_id.clone(), tx);

        let prompt = format_prompt(&pending, self.clock.epoch_ms());
        if let Err(e) = self.channels.send(&pending.channel_target, &prompt).await {
            tracing::warn!(%short_id, error = %e, "approval prompt delivery failed");
        }
        tracing::info!(
            %short_id,
            tool = %pending.tool_name,
            risk = %pending.risk,
            run_id = %pending.run_id,
            "approval requested"
        );

        // Expiry timer: loses the race against a reply via the store CAS.
        let manager = Arc::clone(self);
        let timer_id = short_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(manager.timeout).await;
            manager.expire(&timer_id);
        });

        match rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without resolving; treat as expiry.
            Err(_) => ApprovalOutcome::Expired,
        }
    }

    /// Chat-router hook: feed every inbound message here. Non-reply
    /// messages and replies addressing unknown or already-terminal short
    /// ids are ignored silently.
    pub async fn handle_reply(&self, text: &str, user_id: &str) -> Option<ReplyAction> {
        let (verb, short_id) = parse_reply(text)?;
        let key = store_key(&short_id);

        // Claim the pending: first resolver moves status out of Pending.
        let next = match verb {
            ReplyVerb::Approve => ApprovalStatus::Executed,
            ReplyVerb::Reject => ApprovalStatus::Rejected,
        };
        let claimed = self
            .store
            .update(&key, |p| {
                if p.status == ApprovalStatus::Pending {
                    p.status = next;
                    Some(p.clone())
                } else {
                    None
                }
            })
            .flatten()?;

        match verb {
            ReplyVerb::Approve => {
                tracing::info!(%short_id, user_id, tool = %claimed.tool_name, "approval granted");
                let result = self.invoke(&claimed).await;
                self.resolve(&short_id, ApprovalOutcome::Executed(result));
                Some(ReplyAction::Approved)
            }
            ReplyVerb::Reject => {
                tracing::info!(%short_id, user_id, tool = %claimed.tool_name, "approval rejected");
                self.resolve(&short_id, ApprovalOutcome::Rejected { user_id: user_id.to_string() });
                Some(ReplyAction::Rejected)
            }
        }
    }

    /// Diagnostics: unresolved pendings in the store. Resolved records
    /// stay in the store until their TTL but are no longer pending.
    pub fn pending(&self) -> Vec<PendingApproval> {
        self.store
            .scan_prefix(STORE_PREFIX)
            .into_iter()
            .map(|(_, p)| p)
            .filter(|p| p.status == ApprovalStatus::Pending)
            .collect()
    }

    /// Look up one live pending by short id.
    pub fn get(&self, short_id: &str) -> Option<PendingApproval> {
        self.store.get(&store_key(short_id))
    }

    fn create_pending(&self, request: ApprovalRequest) -> PendingApproval {
        // Short ids address the full live pending set; on collision the
        // approval id is regenerated (an ordinary retry, not an error).
        let approval_id = loop {
            let candidate = ApprovalId::new();
            if !self.store.contains(&store_key(candidate.short_id())) {
                break candidate;
            }
        };
        let now_ms = self.clock.epoch_ms();
        let pending = PendingApproval {
            short_id: approval_id.short_id().to_string(),
            approval_id,
            tool_name: request.tool_name,
            arguments: request.arguments,
            risk: request.risk,
            description: request.description,
            run_id: request.run_id,
            channel_target: request.channel_target,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + self.timeout.as_millis() as u64,
            status: ApprovalStatus::Pending,
        };
        self.store.insert(store_key(&pending.short_id), pending.clone(), self.timeout);
        pending
    }

    /// Invoke the approved tool. Transport failures become tool-level
    /// errors so the run log shows the operational failure.
    async fn invoke(&self, pending: &PendingApproval) -> ToolResult {
        let args = json!(pending.arguments);
        match self.mcp.call_tool(&pending.tool_name, args).await {
            Ok(result) => result,
            Err(e) => ToolResult::Error { code: -1, message: e.to_string() },
        }
    }

    /// TTL elapsed: claim the pending if still unresolved.
    fn expire(&self, short_id: &str) {
        let key = store_key(short_id);
        let claimed = self
            .store
            .update(&key, |p| {
                if p.status == ApprovalStatus::Pending {
                    p.status = ApprovalStatus::Expired;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if claimed {
            tracing::info!(%short_id, "approval expired unanswered");
            self.resolve(short_id, ApprovalOutcome::Expired);
        }
    }

    fn resolve(&self, short_id: &str, outcome: ApprovalOutcome) {
        match self.waiters.lock().remove(short_id) {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    tracing::debug!(%short_id, "approval waiter already gone");
                }
            }
            None => {
                // Waiter stranded by restart or shutdown; record-only.
                tracing::debug!(%short_id, "approval resolved with no waiter");
            }
        }
    }
}

fn store_key(short_id: &str) -> String {
    format!("{STORE_PREFIX}{short_id}")
}

/// User-facing approval prompt. One message: risk icon and label, step
/// description, tool, parameters, the reply instructions naming the short
/// id, and time-to-expiry in minutes.
pub fn format_prompt(pending: &PendingApproval, now_ms: u64) -> String {
    let mut out = format!(
        "{} {} risk step requires approval\n\n{}\nTool: {}\n",
        pending.risk.icon(),
        pending.risk,
        pending.description,
        pending.tool_name,
    );
    if !pending.arguments.is_empty() {
        out.push_str("Parameters:\n");
        for (key, value) in &pending.arguments {
            out.push_str(&format!("  • {key}: {value}\n"));
        }
    }
    let minutes = pending.ttl_remaining_secs(now_ms).div_ceil(60);
    out.push_str(&format!(
        "\nReply with `approve {id}` to proceed or `reject {id}` to cancel.\nExpires in {minutes} minute{s}.",
        id = pending.short_id,
        s = if minutes == 1 { "" } else { "s" },
    ));
    out
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
