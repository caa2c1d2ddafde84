// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 message shapes.
//!
//! Requests carry a per-transport monotonically increasing integer id.
//! Inbound records are decoded into [`Incoming`], which covers responses
//! and server-initiated notifications in one shape so transports can scan
//! a stream for the record matching their request id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request with an integer id.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, method: method.into(), params }
    }
}

/// Outbound notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, method: method.into(), params }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any inbound JSON-RPC record: a response (has `id`, `result` or `error`)
/// or a notification (has `method`, no `id`).
#[derive(Debug, Clone, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

impl Incoming {
    /// Server-initiated notification or request: carries a `method`.
    /// Responses to our calls never do.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() || self.id.is_none()
    }

    /// The record's id as an integer, if it has one.
    ///
    /// Ids are emitted as integers; a server echoing the id back as a
    /// numeric string is tolerated.
    pub fn id_u64(&self) -> Option<u64> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "jsonrpc_tests.rs"]
mod tests;
