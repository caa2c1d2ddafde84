// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSE transport: JSON-RPC framed inside a Server-Sent-Events response.
//!
//! Each call POSTs one JSON-RPC request and streams the response body.
//! The body is a sequence of `event: message` / `data: <json>` records;
//! the call resolves on the record whose `id` matches the request, and
//! intervening `notifications/*` records are surfaced as log events only.

use crate::jsonrpc::{Incoming, Notification, Request};
use crate::transport::{ToolTransport, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const ACCEPT: &str = "application/json, text/event-stream";

/// Incremental scanner extracting `data:` payloads from an SSE byte stream.
///
/// Bytes may arrive in arbitrary chunk boundaries; payloads are yielded
/// only for complete lines. `event:` lines, comments, and blank record
/// separators carry no payload and are dropped.
#[derive(Default)]
pub struct SseScanner {
    buf: Vec<u8>,
}

impl SseScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the data payloads completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        payloads
    }
}

/// Transport speaking to one tool server over Streamable HTTP / SSE.
pub struct SseTransport {
    server: String,
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl SseTransport {
    pub fn new(server: impl Into<String>, url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { server: server.into(), url: url.into(), client, next_id: AtomicU64::new(1) })
    }

    async fn post(&self, body: Vec<u8>) -> Result<reqwest::Response, TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, ACCEPT)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::Http(format!("{} from {}", resp.status(), self.url)));
        }
        Ok(resp)
    }

    fn resolve(&self, record: Incoming, id: u64) -> Option<Result<Value, TransportError>> {
        if record.is_notification() {
            tracing::debug!(
                server = %self.server,
                method = record.method.as_deref().unwrap_or(""),
                "skipping server notification"
            );
            return None;
        }
        match record.id_u64() {
            Some(got) if got == id => Some(match record.error {
                Some(err) => Err(TransportError::Rpc(err)),
                None => Ok(record.result.unwrap_or(Value::Null)),
            }),
            got => {
                tracing::warn!(server = %self.server, ?got, expected = id, "response for another id");
                None
            }
        }
    }
}

#[async_trait]
impl ToolTransport for SseTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&Request::new(id, method, params))
            .map_err(|e| TransportError::Parse(e.to_string()))?;
        let resp = self.post(body).await?;

        let is_sse = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.contains("text/event-stream"))
            .unwrap_or(false);

        if !is_sse {
            // Plain JSON response: a single JSON-RPC object in the body.
            let text = resp.text().await.map_err(|e| TransportError::Http(e.to_string()))?;
            let record: Incoming = serde_json::from_str(&text)
                .map_err(|e| TransportError::Parse(format!("{e}: {text}")))?;
            return self.resolve(record, id).unwrap_or(Err(TransportError::ClosedStream(id)));
        }

        let mut scanner = SseScanner::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::Http(e.to_string()))?;
            for payload in scanner.push(&chunk) {
                // A malformed frame is dropped; if it was the matching
                // response the call still fails when the stream ends.
                let record: Incoming = match serde_json::from_str(&payload) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(server = %self.server, error = %e, "undecodable SSE frame");
                        continue;
                    }
                };
                if let Some(outcome) = self.resolve(record, id) {
                    return outcome;
                }
            }
        }
        Err(TransportError::ClosedStream(id))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&Notification::new(method, params))
            .map_err(|e| TransportError::Parse(e.to_string()))?;
        self.post(body).await.map(|_| ())
    }

    async fn shutdown(&self) {
        // Nothing persistent to tear down; the HTTP client drops with self.
    }

    fn endpoint(&self) -> String {
        format!("sse:{}", self.url)
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
