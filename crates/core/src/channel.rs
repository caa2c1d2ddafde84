// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel targets: `<channel_type>:<channel_id>` addresses for notifications.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors parsing a channel target string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelTargetError {
    #[error("channel target missing ':' separator: {0:?}")]
    MissingSeparator(String),
    #[error("channel target has empty type or id: {0:?}")]
    EmptyPart(String),
}

/// Where notifications and approval prompts go: a registered sender type
/// (`telegram`, `discord`, `slack`, ...) plus a sender-specific identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelTarget {
    pub channel_type: String,
    pub channel_id: String,
}

impl ChannelTarget {
    pub fn new(channel_type: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self { channel_type: channel_type.into(), channel_id: channel_id.into() }
    }

    pub fn parse(s: &str) -> Result<Self, ChannelTargetError> {
        let (channel_type, channel_id) =
            s.split_once(':').ok_or_else(|| ChannelTargetError::MissingSeparator(s.to_string()))?;
        if channel_type.is_empty() || channel_id.is_empty() {
            return Err(ChannelTargetError::EmptyPart(s.to_string()));
        }
        Ok(Self::new(channel_type, channel_id))
    }
}

impl std::fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel_type, self.channel_id)
    }
}

impl std::str::FromStr for ChannelTarget {
    type Err = ChannelTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChannelTarget {
    type Error = ChannelTargetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ChannelTarget> for String {
    fn from(t: ChannelTarget) -> String {
        t.to_string()
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
