// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn crash_event(namespace: &str, severity: Severity) -> ClusterEvent {
    ClusterEvent::new(EventKind::CrashLoop, severity, "pod", namespace, "nginx-abc", 0)
}

#[test]
fn builtin_maps_crash_loop_to_remediation() {
    let engine = RuleEngine::builtin();
    let matches = engine.match_event(&crash_event("prod", Severity::Critical));
    assert_eq!(
        matches,
        vec![RuleMatch {
            rule_id: "rule-001".into(),
            playbook_id: "crash_loop_remediation".into()
        }]
    );
}

#[test]
fn builtin_covers_all_five_kinds() {
    let engine = RuleEngine::builtin();
    let cases = [
        (EventKind::CrashLoop, "crash_loop_remediation"),
        (EventKind::OomKilled, "oom_kill_remediation"),
        (EventKind::NotReadyNode, "node_not_ready_remediation"),
        (EventKind::ReplicationFailure, "deployment_rollback"),
        (EventKind::AlertmanagerFiring, "scale_up_on_load"),
    ];
    for (kind, playbook) in cases {
        let event = ClusterEvent::new(kind, Severity::Critical, "pod", "prod", "r", 0);
        let matches = engine.match_event(&event);
        assert_eq!(matches.len(), 1, "{kind} should match exactly one rule");
        assert_eq!(matches[0].playbook_id, playbook);
    }
}

#[test]
fn events_fan_out_to_multiple_rules_in_registration_order() {
    let mut engine = RuleEngine::new();
    engine.register(Rule::new("r-b", "first", EventKind::CrashLoop, "pb-one"));
    engine.register(Rule::new("r-a", "second", EventKind::CrashLoop, "pb-two"));
    let matches = engine.match_event(&crash_event("prod", Severity::Critical));
    let ids: Vec<&str> = matches.iter().map(|m| m.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["r-b", "r-a"]);
}

#[test]
fn severity_floor_filters_low_severity() {
    let mut engine = RuleEngine::new();
    engine.register(
        Rule::new("r", "critical only", EventKind::CrashLoop, "pb")
            .severity_floor(Severity::Critical),
    );
    assert!(engine.match_event(&crash_event("prod", Severity::Warning)).is_empty());
    assert_eq!(engine.match_event(&crash_event("prod", Severity::Critical)).len(), 1);
}

#[test]
fn namespace_filter_restricts_matches() {
    let mut engine = RuleEngine::new();
    engine.register(
        Rule::new("r", "prod only", EventKind::CrashLoop, "pb")
            .namespace_filter(Regex::new("^prod$").unwrap()),
    );
    assert_eq!(engine.match_event(&crash_event("prod", Severity::Critical)).len(), 1);
    assert!(engine.match_event(&crash_event("staging", Severity::Critical)).is_empty());
}

#[test]
fn empty_namespace_matches_iff_regex_matches_empty() {
    let node = ClusterEvent::new(EventKind::NotReadyNode, Severity::Critical, "node", "", "n1", 0);

    let mut permissive = RuleEngine::new();
    permissive.register(
        Rule::new("r", "any", EventKind::NotReadyNode, "pb")
            .namespace_filter(Regex::new(".*").unwrap()),
    );
    assert_eq!(permissive.match_event(&node).len(), 1);

    let mut strict = RuleEngine::new();
    strict.register(
        Rule::new("r", "named only", EventKind::NotReadyNode, "pb")
            .namespace_filter(Regex::new("^.+$").unwrap()),
    );
    assert!(strict.match_event(&node).is_empty());
}

#[test]
fn kind_mismatch_never_matches() {
    let engine = RuleEngine::builtin();
    let oom = ClusterEvent::new(EventKind::OomKilled, Severity::Critical, "pod", "prod", "p", 0);
    let matches = engine.match_event(&oom);
    assert!(matches.iter().all(|m| m.playbook_id == "oom_kill_remediation"));
}

#[test]
fn rule_lookup_exposes_params() {
    let engine = RuleEngine::builtin();
    let rule = engine.rule("rule-005").unwrap();
    assert_eq!(rule.params.get("target_replicas").map(String::as_str), Some("3"));
    assert!(engine.rule("rule-999").is_none());
}
