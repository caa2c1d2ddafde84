// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess transport: single-line JSON-RPC over a child's stdin/stdout.
//!
//! Writes are newline-terminated UTF-8 JSON; reads are newline-delimited.
//! The stream is line-oriented and pairs requests 1:1 with responses, so a
//! response with a non-matching id is a protocol error and poisons the
//! stream — the next call respawns the child. Stderr is drained
//! continuously into structured logs and never read as protocol output.

use crate::jsonrpc::{Incoming, Notification, Request};
use crate::transport::{ToolTransport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Grace period between closing the child's stdin and force-killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct ChildIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Transport speaking to one tool server launched as a child process.
pub struct StdioTransport {
    server: String,
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    // One in-flight call at a time: the stream pairs 1:1.
    io: Mutex<Option<ChildIo>>,
    next_id: AtomicU64,
}

impl StdioTransport {
    pub fn new(
        server: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            server: server.into(),
            command: command.into(),
            args,
            env,
            io: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn spawn_child(&self) -> Result<ChildIo, TransportError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Io(format!("spawn {}: {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io("child stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let server = self.server.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(%server, %line, "tool server stderr");
                }
            });
        }

        tracing::info!(server = %self.server, command = %self.command, "tool server started");
        Ok(ChildIo { child, stdin, stdout: BufReader::new(stdout).lines() })
    }

    async fn write_line(io: &mut ChildIo, payload: &str) -> Result<(), TransportError> {
        io.stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        io.stdin.write_all(b"\n").await.map_err(|e| TransportError::Io(e.to_string()))?;
        io.stdin.flush().await.map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Read lines until the response for `id` arrives. Notifications are
    /// surfaced as log events and skipped.
    async fn read_response(&self, io: &mut ChildIo, id: u64) -> Result<Value, TransportError> {
        loop {
            let line = io
                .stdout
                .next_line()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?
                .ok_or(TransportError::ClosedStream(id))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Incoming = serde_json::from_str(&line)
                .map_err(|e| TransportError::Parse(format!("{e}: {line}")))?;
            if record.is_notification() {
                tracing::debug!(
                    server = %self.server,
                    method = record.method.as_deref().unwrap_or(""),
                    "skipping server notification"
                );
                continue;
            }
            match record.id_u64() {
                Some(got) if got == id => {
                    return match record.error {
                        Some(err) => Err(TransportError::Rpc(err)),
                        None => Ok(record.result.unwrap_or(Value::Null)),
                    };
                }
                got => {
                    return Err(TransportError::IdMismatch {
                        expected: id,
                        got: got.unwrap_or(0),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_string(&Request::new(id, method, params))
            .map_err(|e| TransportError::Parse(e.to_string()))?;

        let mut guard = self.io.lock().await;
        if guard.is_none() {
            // On-demand (re)start: one attempt per call.
            *guard = Some(self.spawn_child().await?);
        }
        let Some(io) = guard.as_mut() else {
            return Err(TransportError::Io("child unavailable".into()));
        };

        let result = async {
            Self::write_line(io, &payload).await?;
            self.read_response(io, id).await
        }
        .await;

        // Io, parse, and id-mismatch failures leave the stream in an
        // unknown framing state; drop the child so the next call respawns.
        if matches!(
            result,
            Err(TransportError::Io(_))
                | Err(TransportError::Parse(_))
                | Err(TransportError::ClosedStream(_))
                | Err(TransportError::IdMismatch { .. })
        ) {
            tracing::warn!(server = %self.server, "stdio stream poisoned, dropping child");
            *guard = None;
        }
        result
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        let payload = serde_json::to_string(&Notification::new(method, params))
            .map_err(|e| TransportError::Parse(e.to_string()))?;
        let mut guard = self.io.lock().await;
        let Some(io) = guard.as_mut() else {
            return Err(TransportError::Io("child not running".into()));
        };
        Self::write_line(io, &payload).await
    }

    async fn shutdown(&self) {
        let Some(mut io) = self.io.lock().await.take() else { return };
        // Closing stdin asks the server to exit; force-kill after the grace.
        drop(io.stdin);
        match tokio::time::timeout(SHUTDOWN_GRACE, io.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(server = %self.server, %status, "tool server exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.server, error = %e, "tool server wait failed");
            }
            Err(_) => {
                tracing::warn!(server = %self.server, "tool server did not exit, killing");
                if let Err(e) = io.child.kill().await {
                    tracing::warn!(server = %self.server, error = %e, "kill failed");
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("stdio:{}", self.command)
    }
}

#[cfg(test)]
#[path = "stdio_tests.rs"]
mod tests;
