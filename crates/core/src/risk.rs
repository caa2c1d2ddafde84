// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step risk levels and the auto-execute threshold.

use serde::{Deserialize, Serialize};

/// Declared blast radius of a playbook step.
///
/// `Low` steps are read-only or self-healing and run unattended. `Medium`
/// (state-mutating but reversible) and `High` (destructive or widely scoped)
/// steps are gated behind a human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Risk {
    /// Whether a step at this risk level may execute without approval.
    pub fn auto_executes(&self) -> bool {
        matches!(self, Risk::Low)
    }

    /// Icon used in approval prompts and progress messages.
    pub fn icon(&self) -> &'static str {
        match self {
            Risk::Low => "✅",
            Risk::Medium => "⚠️",
            Risk::High => "🚨",
        }
    }
}

crate::simple_display! {
    Risk {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_low_auto_executes() {
        assert!(Risk::Low.auto_executes());
        assert!(!Risk::Medium.auto_executes());
        assert!(!Risk::High.auto_executes());
    }

    #[test]
    fn risk_orders_by_blast_radius() {
        assert!(Risk::High > Risk::Medium);
        assert!(Risk::Medium > Risk::Low);
    }
}
