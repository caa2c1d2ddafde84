// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending approvals and the chat reply grammar.
//!
//! A [`PendingApproval`] is the engine side of the human handshake: one
//! record per gated step, addressed in chat by the first 8 hex characters
//! of its UUID. The record lives in the expiring store; resolution happens
//! at most once (see the approval manager).

use crate::channel::ChannelTarget;
use crate::risk::Risk;
use crate::run::RunId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Length of the chat-facing short form of an approval id.
pub const SHORT_ID_LEN: usize = 8;

/// Full approval identifier: a v4 UUID rendered in hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(String);

impl ApprovalId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First [`SHORT_ID_LEN`] hex characters; what users type in replies.
    pub fn short_id(&self) -> &str {
        crate::id::short(&self.0, SHORT_ID_LEN)
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a pending approval. At most one terminal status is ever
/// recorded per approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Executed,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

crate::simple_display! {
    ApprovalStatus {
        Pending => "pending",
        Executed => "executed",
        Rejected => "rejected",
        Expired => "expired",
    }
}

/// One MEDIUM/HIGH step waiting for a human verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: ApprovalId,
    /// First 8 hex chars of `approval_id`; unique across live pendings
    pub short_id: String,
    pub tool_name: String,
    /// Rendered parameters the tool will be called with on approval
    pub arguments: IndexMap<String, String>,
    pub risk: Risk,
    /// Step description shown in the prompt
    pub description: String,
    pub run_id: RunId,
    pub channel_target: ChannelTarget,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub status: ApprovalStatus,
}

impl PendingApproval {
    /// Seconds until expiry at `now_ms` (zero once past due).
    pub fn ttl_remaining_secs(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms) / 1000
    }
}

/// Verb class of an approval reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyVerb {
    Approve,
    Reject,
}

/// Parse an inbound chat message as an approval reply.
///
/// Grammar: `(approve|yes|confirm|reject|no|cancel) <8-hex>`, case-insensitive,
/// surrounding whitespace ignored. Anything else is not an approval reply
/// and returns `None`. The returned short id is lowercased.
pub fn parse_reply(text: &str) -> Option<(ReplyVerb, String)> {
    let mut words = text.split_whitespace();
    let verb = match words.next()?.to_ascii_lowercase().as_str() {
        "approve" | "yes" | "confirm" => ReplyVerb::Approve,
        "reject" | "no" | "cancel" => ReplyVerb::Reject,
        _ => return None,
    };
    let id = words.next()?;
    if words.next().is_some() {
        return None;
    }
    if id.len() != SHORT_ID_LEN || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some((verb, id.to_ascii_lowercase()))
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
