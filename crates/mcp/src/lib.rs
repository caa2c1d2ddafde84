// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rx-mcp: MCP tool layer — JSON-RPC transports, server manager, tool registry.
//!
//! Every remediation step bottoms out in a `tools/call` against one MCP
//! server. Servers are declared in the engine configuration, started at
//! engine startup, and discovered into a flat tool registry; the registry
//! is read-only afterwards.

pub mod config;
pub mod jsonrpc;
pub mod manager;
pub mod transport;
pub mod types;

pub use config::ServerConfig;
pub use manager::{McpError, McpManager, DEFAULT_CALL_TIMEOUT};
pub use transport::{ToolTransport, TransportError};
pub use types::{ToolContent, ToolDef, ToolResult};

#[cfg(any(test, feature = "test-support"))]
pub use transport::fake::FakeTransport;
