// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat channel senders.
//!
//! The engine posts alerts, run progress, and approval prompts through a
//! [`ChannelRouter`] keyed by channel type. Concrete senders (telegram,
//! discord, slack, ...) are registered by the host process; their API
//! plumbing and rate limiting are the sender's problem, not the engine's.
//! Senders must be safe to call from many tasks.

use async_trait::async_trait;
use rx_core::ChannelTarget;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from channel sends
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no sender registered for channel type {0:?}")]
    UnknownChannelType(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// One chat transport capable of delivering messages to its channels.
#[async_trait]
pub trait ChannelSender: Send + Sync + 'static {
    /// The channel-target type this sender serves (e.g. `telegram`).
    fn channel_type(&self) -> &str;

    /// Deliver one message to a channel.
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError>;
}

/// Routes messages to the sender registered for the target's type.
#[derive(Clone, Default)]
pub struct ChannelRouter {
    senders: HashMap<String, Arc<dyn ChannelSender>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel_type().to_string(), sender);
    }

    /// Deliver `text` to `target`. An unroutable target is logged and
    /// returned as an error; callers treat sends as best-effort.
    pub async fn send(&self, target: &ChannelTarget, text: &str) -> Result<(), ChannelError> {
        match self.senders.get(&target.channel_type) {
            Some(sender) => sender.send(&target.channel_id, text).await,
            None => {
                tracing::warn!(%target, "message dropped: no sender for channel type");
                Err(ChannelError::UnknownChannelType(target.channel_type.clone()))
            }
        }
    }

    pub fn has_type(&self, channel_type: &str) -> bool {
        self.senders.contains_key(channel_type)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::{ChannelError, ChannelSender};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded outbound message
    #[derive(Debug, Clone)]
    pub struct SentMessage {
        pub channel_id: String,
        pub text: String,
    }

    /// Fake channel sender for tests: records every message.
    #[derive(Clone)]
    pub struct FakeChannelSender {
        channel_type: String,
        messages: Arc<Mutex<Vec<SentMessage>>>,
    }

    impl FakeChannelSender {
        pub fn new(channel_type: impl Into<String>) -> Self {
            Self { channel_type: channel_type.into(), messages: Arc::new(Mutex::new(Vec::new())) }
        }

        /// All recorded messages, oldest first.
        pub fn messages(&self) -> Vec<SentMessage> {
            self.messages.lock().clone()
        }

        /// Texts sent to one channel id.
        pub fn sent_to(&self, channel_id: &str) -> Vec<String> {
            self.messages
                .lock()
                .iter()
                .filter(|m| m.channel_id == channel_id)
                .map(|m| m.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChannelSender for FakeChannelSender {
        fn channel_type(&self) -> &str {
            &self.channel_type
        }

        async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
            self.messages
                .lock()
                .push(SentMessage { channel_id: channel_id.to_string(), text: text.to_string() });
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
