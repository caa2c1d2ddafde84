// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool transports: JSON-RPC 2.0 to one server, over a child process's
//! standard streams or an SSE-framed HTTP stream.

pub mod sse;
pub mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::jsonrpc::ErrorObject;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from one transport call. The transport stays usable after an
/// error unless the underlying stream is gone, in which case the next
/// call may re-establish it once.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io: {0}")]
    Io(String),
    #[error("http: {0}")]
    Http(String),
    #[error("invalid payload: {0}")]
    Parse(String),
    #[error("stream closed before response for id {0}")]
    ClosedStream(u64),
    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },
    #[error("server error {}: {}", .0.code, .0.message)]
    Rpc(ErrorObject),
}

/// One JSON-RPC peer. Implementations own their framing and id sequence.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Issue a request and wait for the matching response's `result`.
    /// A JSON-RPC error object resolves to [`TransportError::Rpc`].
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Fire a notification (no response expected).
    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError>;

    /// Tear the transport down. Outstanding calls resolve as errors.
    async fn shutdown(&self);

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod fake {
    use super::{ToolTransport, TransportError};
    use crate::jsonrpc::ErrorObject;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Recorded call made through a [`FakeTransport`].
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub method: String,
        pub params: Value,
    }

    #[derive(Debug)]
    struct FakeState {
        calls: Vec<RecordedCall>,
        tool_results: HashMap<String, Value>,
        tool_errors: HashMap<String, ErrorObject>,
        tools: Vec<Value>,
        shutdowns: usize,
    }

    /// In-memory transport for tests: declares a tool list, maps tool
    /// names to canned results, and records every call.
    #[derive(Clone, Debug)]
    pub struct FakeTransport {
        name: String,
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeTransport {
        pub fn new(name: impl Into<String>, tools: &[&str]) -> Self {
            let tools = tools
                .iter()
                .map(|t| json!({"name": t, "description": format!("fake {t}")}))
                .collect();
            Self {
                name: name.into(),
                state: Arc::new(Mutex::new(FakeState {
                    calls: Vec::new(),
                    tool_results: HashMap::new(),
                    tool_errors: HashMap::new(),
                    tools,
                    shutdowns: 0,
                })),
            }
        }

        /// Set the `tools/call` result content text for a tool.
        pub fn set_result(&self, tool: &str, text: &str) {
            self.state.lock().tool_results.insert(
                tool.to_string(),
                json!({"content": [{"type": "text", "text": text}]}),
            );
        }

        /// Make `tools/call` for a tool resolve to a JSON-RPC error.
        pub fn set_error(&self, tool: &str, code: i64, message: &str) {
            self.state
                .lock()
                .tool_errors
                .insert(tool.to_string(), ErrorObject { code, message: message.into(), data: None });
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.state.lock().calls.clone()
        }

        /// Arguments of the recorded `tools/call` invocations for a tool.
        pub fn tool_calls(&self, tool: &str) -> Vec<Value> {
            self.state
                .lock()
                .calls
                .iter()
                .filter(|c| c.method == "tools/call" && c.params["name"] == tool)
                .map(|c| c.params["arguments"].clone())
                .collect()
        }

        pub fn shutdown_count(&self) -> usize {
            self.state.lock().shutdowns
        }
    }

    #[async_trait]
    impl ToolTransport for FakeTransport {
        async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall { method: method.to_string(), params: params.clone() });
            match method {
                "initialize" => Ok(json!({
                    "protocolVersion": "2025-03-26",
                    "serverInfo": {"name": self.name, "version": "0.0.0"}
                })),
                "tools/list" => Ok(json!({"tools": state.tools})),
                "tools/call" => {
                    let tool = params["name"].as_str().unwrap_or_default().to_string();
                    if let Some(err) = state.tool_errors.get(&tool) {
                        return Err(TransportError::Rpc(err.clone()));
                    }
                    Ok(state.tool_results.get(&tool).cloned().unwrap_or_else(
                        || json!({"content": [{"type": "text", "text": "ok"}]}),
                    ))
                }
                other => Err(TransportError::Parse(format!("unexpected method {other}"))),
            }
        }

        async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
            self.state
                .lock()
                .calls
                .push(RecordedCall { method: method.to_string(), params });
            Ok(())
        }

        async fn shutdown(&self) {
            self.state.lock().shutdowns += 1;
        }

        fn endpoint(&self) -> String {
            format!("fake:{}", self.name)
        }
    }
}
