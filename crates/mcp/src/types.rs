// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool declarations and call results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool as declared by a server's `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// Result payload of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDef>,
}

/// One typed fragment of tool output. The standard shape is
/// `{"type":"text","text":...}`; other kinds carry their type tag and
/// an empty text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { kind: "text".to_string(), text: text.into() }
    }
}

/// Raw `tools/call` result shape on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolRaw {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// Outcome of one tool invocation.
///
/// `Error` covers both a JSON-RPC error object and a tool-level
/// `isError: true` result; transport failures are not a `ToolResult`,
/// they surface as [`crate::manager::McpError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Ok { content: Vec<ToolContent> },
    Error { code: i64, message: String },
}

impl ToolResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok { .. })
    }

    /// Concatenated text fragments (or the error message).
    pub fn text(&self) -> String {
        match self {
            ToolResult::Ok { content } => {
                let mut out = String::new();
                for fragment in content {
                    if fragment.kind == "text" {
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(&fragment.text);
                    }
                }
                out
            }
            ToolResult::Error { code, message } => format!("error {code}: {message}"),
        }
    }
}

impl From<CallToolRaw> for ToolResult {
    fn from(raw: CallToolRaw) -> Self {
        if raw.is_error {
            let message = raw
                .content
                .iter()
                .filter(|c| c.kind == "text")
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            ToolResult::Error { code: 0, message }
        } else {
            ToolResult::Ok { content: raw.content }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_fragments() {
        let result = ToolResult::Ok {
            content: vec![ToolContent::text("line one"), ToolContent::text("line two")],
        };
        assert_eq!(result.text(), "line one\nline two");
    }

    #[test]
    fn is_error_result_becomes_error() {
        let raw: CallToolRaw = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"pod not found"}],"isError":true}"#,
        )
        .unwrap();
        let result = ToolResult::from(raw);
        assert!(!result.is_ok());
        assert_eq!(result, ToolResult::Error { code: 0, message: "pod not found".into() });
    }

    #[test]
    fn unknown_fragment_kinds_are_kept_but_not_texted() {
        let raw: CallToolRaw = serde_json::from_str(
            r#"{"content":[{"type":"image","data":"..."},{"type":"text","text":"done"}]}"#,
        )
        .unwrap();
        let result = ToolResult::from(raw);
        assert_eq!(result.text(), "done");
    }
}
