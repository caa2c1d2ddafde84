// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool server catalog configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tool server declaration: how to reach it.
///
/// In the engine configuration this appears as
/// `[mcp.servers.<name>]` with `type = "stdio"` or `type = "sse"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerConfig {
    /// Child process speaking line-delimited JSON-RPC on stdin/stdout.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// HTTP endpoint returning JSON-RPC framed as SSE records.
    Sse { url: String },
}
