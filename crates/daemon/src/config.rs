// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration, loaded once at startup from a TOML document.

use indexmap::IndexMap;
use rx_core::ChannelTarget;
use rx_mcp::ServerConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors are startup-fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub watchloop: WatchloopSection,
    pub aiops: AiopsSection,
    #[serde(default)]
    pub approval: ApprovalSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub mcp: McpSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchloopSection {
    /// Master enable for the watch loop
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for WatchloopSection {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: default_interval_seconds() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiopsSection {
    /// Where alerts, run progress, and approval prompts go
    pub notification_channel: ChannelTarget,
    /// When false, the watch loop alerts but never launches runs
    #[serde(default = "default_true")]
    pub auto_remediation: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalSection {
    /// Pending-approval TTL
    #[serde(default = "default_approval_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self { timeout_seconds: default_approval_timeout_seconds() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Per-tool-call timeout
    #[serde(default = "default_tool_timeout_seconds")]
    pub tool_call_timeout_seconds: u64,
    /// Shutdown grace for in-flight runs
    #[serde(default = "default_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// HTTP ingress bind address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tool_call_timeout_seconds: default_tool_timeout_seconds(),
            shutdown_grace_seconds: default_grace_seconds(),
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpSection {
    /// name → transport declaration, in declaration order
    #[serde(default)]
    pub servers: IndexMap<String, ServerConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watchloop.interval_seconds)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval.timeout_seconds)
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.tool_call_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.engine.shutdown_grace_seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    30
}

fn default_approval_timeout_seconds() -> u64 {
    900
}

fn default_tool_timeout_seconds() -> u64 {
    30
}

fn default_grace_seconds() -> u64 {
    30
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
