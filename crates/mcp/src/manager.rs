// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MCP manager: server lifecycle, tool discovery, and call routing.
//!
//! At startup every configured server is brought up, initialized, and its
//! tool list folded into one flat registry. A tool name appearing in two
//! servers is fatal. The registry is read-only after startup; `call_tool`
//! routes by name to the owning server's transport.

use crate::config::ServerConfig;
use crate::transport::{SseTransport, StdioTransport, ToolTransport, TransportError};
use crate::types::{CallToolRaw, ToolDef, ToolResult, ToolsListResult};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fixed protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the MCP layer.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} is provided by both {first} and {second}")]
    DuplicateTool { tool: String, first: String, second: String },

    #[error("server {server}: initialize failed: {reason}")]
    Initialize { server: String, reason: String },

    #[error("server {server}: transport error: {source}")]
    Transport {
        server: String,
        #[source]
        source: TransportError,
    },

    #[error("server {server}: {tool} timed out after {timeout_secs}s")]
    Timeout { server: String, tool: String, timeout_secs: u64 },

    #[error("server {server}: malformed response: {reason}")]
    Protocol { server: String, reason: String },
}

struct ToolEntry {
    server: String,
    def: ToolDef,
}

/// Owner of the tool servers and the flat tool registry.
pub struct McpManager {
    servers: IndexMap<String, Arc<dyn ToolTransport>>,
    registry: HashMap<String, ToolEntry>,
    call_timeout: Duration,
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("servers", &self.servers.keys().collect::<Vec<_>>())
            .field("registry", &self.registry.keys().collect::<Vec<_>>())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl McpManager {
    /// Start every server in the catalog, run the initialize handshake and
    /// tool discovery, and build the registry. Any failure here is a
    /// startup failure.
    pub async fn start(
        catalog: &IndexMap<String, ServerConfig>,
        call_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut servers: IndexMap<String, Arc<dyn ToolTransport>> = IndexMap::new();
        for (name, config) in catalog {
            let transport: Arc<dyn ToolTransport> = match config {
                ServerConfig::Stdio { command, args, env } => Arc::new(StdioTransport::new(
                    name.clone(),
                    command.clone(),
                    args.clone(),
                    env.clone(),
                )),
                ServerConfig::Sse { url } => Arc::new(
                    SseTransport::new(name.clone(), url.clone()).map_err(|e| {
                        McpError::Transport { server: name.clone(), source: e }
                    })?,
                ),
            };
            servers.insert(name.clone(), transport);
        }
        Self::with_transports(servers, call_timeout).await
    }

    /// Build a manager over already-constructed transports. Used by
    /// [`McpManager::start`] and directly by tests with fakes.
    pub async fn with_transports(
        servers: IndexMap<String, Arc<dyn ToolTransport>>,
        call_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut registry: HashMap<String, ToolEntry> = HashMap::new();
        for (name, transport) in &servers {
            Self::initialize_server(name, transport.as_ref()).await?;
            let tools = Self::list_tools(name, transport.as_ref()).await?;
            tracing::info!(server = %name, tools = tools.len(), "tool server ready");
            for def in tools {
                if let Some(existing) = registry.get(&def.name) {
                    return Err(McpError::DuplicateTool {
                        tool: def.name,
                        first: existing.server.clone(),
                        second: name.clone(),
                    });
                }
                registry.insert(def.name.clone(), ToolEntry { server: name.clone(), def });
            }
        }
        Ok(Self { servers, registry, call_timeout })
    }

    /// `initialize` handshake. Safe to repeat on a server: the server
    /// treats a re-initialize as protocol bookkeeping only.
    async fn initialize_server(
        name: &str,
        transport: &dyn ToolTransport,
    ) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "remedy",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        transport
            .request("initialize", params)
            .await
            .map_err(|e| McpError::Initialize { server: name.to_string(), reason: e.to_string() })?;
        transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(|e| McpError::Initialize { server: name.to_string(), reason: e.to_string() })?;
        Ok(())
    }

    async fn list_tools(
        name: &str,
        transport: &dyn ToolTransport,
    ) -> Result<Vec<ToolDef>, McpError> {
        let result = transport.request("tools/list", Value::Null).await.map_err(|e| {
            McpError::Transport { server: name.to_string(), source: e }
        })?;
        let listed: ToolsListResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol { server: name.to_string(), reason: e.to_string() }
        })?;
        Ok(listed.tools)
    }

    /// Invoke a tool by name. Timeouts and transport failures are errors;
    /// a tool-level failure (`isError` or a JSON-RPC error object) is an
    /// `Ok(ToolResult::Error { .. })`.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<ToolResult, McpError> {
        let entry =
            self.registry.get(name).ok_or_else(|| McpError::UnknownTool(name.to_string()))?;
        let transport = self
            .servers
            .get(&entry.server)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        let params = json!({ "name": name, "arguments": args });
        let call = transport.request("tools/call", params);
        let outcome = tokio::time::timeout(self.call_timeout, call).await.map_err(|_| {
            McpError::Timeout {
                server: entry.server.clone(),
                tool: name.to_string(),
                timeout_secs: self.call_timeout.as_secs(),
            }
        })?;

        match outcome {
            Ok(result) => {
                let raw: CallToolRaw = serde_json::from_value(result).map_err(|e| {
                    McpError::Protocol { server: entry.server.clone(), reason: e.to_string() }
                })?;
                Ok(ToolResult::from(raw))
            }
            Err(TransportError::Rpc(err)) => {
                Ok(ToolResult::Error { code: err.code, message: err.message })
            }
            Err(e) => Err(McpError::Transport { server: entry.server.clone(), source: e }),
        }
    }

    /// Whether `name` resolves in the registry.
    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// All registered tool names, with their owning server.
    pub fn tools(&self) -> Vec<(String, String)> {
        self.registry.iter().map(|(tool, e)| (tool.clone(), e.server.clone())).collect()
    }

    /// Declared description of a tool, if the server provided one.
    pub fn tool_description(&self, name: &str) -> Option<&str> {
        self.registry.get(name).and_then(|e| e.def.description.as_deref())
    }

    /// Tear down every transport. Outstanding calls resolve as errors.
    pub async fn shutdown(&self) {
        for (name, transport) in &self.servers {
            tracing::info!(server = %name, "stopping tool server");
            transport.shutdown().await;
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
