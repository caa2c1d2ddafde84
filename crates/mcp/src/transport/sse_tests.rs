// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[test]
fn scanner_extracts_data_payloads() {
    let mut scanner = SseScanner::new();
    let payloads = scanner.push(b"event: message\ndata: {\"a\":1}\n\n");
    assert_eq!(payloads, vec![r#"{"a":1}"#.to_string()]);
}

#[test]
fn scanner_handles_chunk_split_mid_line() {
    let mut scanner = SseScanner::new();
    assert!(scanner.push(b"data: {\"a\"").is_empty());
    let payloads = scanner.push(b":2}\ndata:");
    assert_eq!(payloads, vec![r#"{"a":2}"#.to_string()]);
    let payloads = scanner.push(b" {\"b\":3}\n");
    assert_eq!(payloads, vec![r#"{"b":3}"#.to_string()]);
}

#[test]
fn scanner_strips_crlf_and_optional_space() {
    let mut scanner = SseScanner::new();
    let payloads = scanner.push(b"data:{\"x\":1}\r\n");
    assert_eq!(payloads, vec![r#"{"x":1}"#.to_string()]);
}

#[test]
fn scanner_ignores_comments_and_event_lines() {
    let mut scanner = SseScanner::new();
    let payloads = scanner.push(b": keep-alive\nevent: message\n\ndata: {}\n");
    assert_eq!(payloads, vec!["{}".to_string()]);
}

/// Minimal one-shot HTTP server: reads one POST, extracts the JSON-RPC id
/// from the body, responds with the given SSE body template (`{id}` is
/// replaced with the request id).
async fn spawn_sse_server(body_template: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let (headers_end, request) = loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if let Some(pos) = text.find("\r\n\r\n") {
                        break (pos + 4, text);
                    }
                };
                let content_length: usize = request
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                while buf.len() < headers_end + content_length {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body: serde_json::Value =
                    serde_json::from_slice(&buf[headers_end..]).unwrap_or_default();
                let id = body["id"].as_u64().unwrap_or(0);
                let sse_body = body_template.replace("{id}", &id.to_string());
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    sse_body.len(),
                    sse_body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}/mcp")
}

#[tokio::test]
async fn call_skips_progress_notifications_and_resolves_on_matching_id() {
    let url = spawn_sse_server(
        "event: message\ndata: {\"method\":\"notifications/message\",\"params\":{\"level\":\"info\"}}\n\n\
         event: message\ndata: {\"method\":\"notifications/message\",\"params\":{\"level\":\"info\"}}\n\n\
         event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"scan complete\"}]}}\n\n",
    )
    .await;
    let transport = SseTransport::new("scanner", url).unwrap();
    let result = transport.request("tools/call", json!({"name": "k8s_scan"})).await.unwrap();
    assert_eq!(result["content"][0]["text"], "scan complete");
}

#[tokio::test]
async fn stream_without_matching_id_is_a_call_failure() {
    let url = spawn_sse_server(
        "event: message\ndata: {\"method\":\"notifications/message\",\"params\":{}}\n\n",
    )
    .await;
    let transport = SseTransport::new("scanner", url).unwrap();
    let err = transport.request("tools/list", serde_json::Value::Null).await.unwrap_err();
    assert!(matches!(err, TransportError::ClosedStream(_)));
}

#[tokio::test]
async fn rpc_error_frame_resolves_as_rpc_error() {
    let url = spawn_sse_server(
        "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":{id},\"error\":{\"code\":-32000,\"message\":\"denied\"}}\n\n",
    )
    .await;
    let transport = SseTransport::new("scanner", url).unwrap();
    let err = transport.request("tools/call", json!({"name": "x"})).await.unwrap_err();
    assert!(matches!(err, TransportError::Rpc(ref obj) if obj.code == -32000));
}

#[tokio::test]
async fn undecodable_frames_are_dropped_not_fatal() {
    let url = spawn_sse_server(
        "data: this is not json\n\ndata: {\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{\"ok\":true}}\n\n",
    )
    .await;
    let transport = SseTransport::new("scanner", url).unwrap();
    let result = transport.request("tools/list", serde_json::Value::Null).await.unwrap();
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn ids_increase_per_call() {
    let url = spawn_sse_server(
        "data: {\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{\"n\":{id}}}\n\n",
    )
    .await;
    let transport = SseTransport::new("scanner", url).unwrap();
    let first = transport.request("tools/list", serde_json::Value::Null).await.unwrap();
    let second = transport.request("tools/list", serde_json::Value::Null).await.unwrap();
    assert_eq!(first["n"], 1);
    assert_eq!(second["n"], 2);
}
