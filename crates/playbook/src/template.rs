// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parameter template interpolation.
//!
//! Step parameters are template strings referencing the triggering event's
//! context by `{dotted.path}` (e.g. `{resource_name}`, `{namespace}`,
//! `{annotations.container}`). Substitution is eager and string-only.
//! Absent fields render as empty — never as a stringified null — and are
//! reported so the executor can fail the step with a clear reason.

use regex::Regex;
use rx_core::ClusterEvent;
use std::sync::LazyLock;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_-]+)*)\}")
        .expect("constant regex pattern is valid")
});

/// Result of rendering one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub value: String,
    /// Context paths referenced by the template that did not resolve
    pub missing: Vec<String>,
}

impl Rendered {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Interpolate `{path}` placeholders with fields of the event context.
pub fn render(template: &str, event: &ClusterEvent) -> Rendered {
    let mut missing = Vec::new();
    let value = FIELD_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            match event.context_field(path) {
                Some(v) => v,
                None => {
                    missing.push(path.to_string());
                    String::new()
                }
            }
        })
        .into_owned();
    Rendered { value, missing }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
