// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn approval_id_short_form_is_8_hex() {
    let id = ApprovalId::new();
    let short = id.short_id();
    assert_eq!(short.len(), SHORT_ID_LEN);
    assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn approval_ids_differ() {
    assert_ne!(ApprovalId::new().as_str(), ApprovalId::new().as_str());
}

#[parameterized(
    approve = { "approve deadbeef", Some(ReplyVerb::Approve) },
    yes = { "yes deadbeef", Some(ReplyVerb::Approve) },
    confirm = { "confirm deadbeef", Some(ReplyVerb::Approve) },
    reject = { "reject deadbeef", Some(ReplyVerb::Reject) },
    no = { "no deadbeef", Some(ReplyVerb::Reject) },
    cancel = { "cancel deadbeef", Some(ReplyVerb::Reject) },
    mixed_case = { "APPROVE DeadBeef", Some(ReplyVerb::Approve) },
    padded = { "  approve deadbeef  ", Some(ReplyVerb::Approve) },
    unknown_verb = { "maybe deadbeef", None },
    missing_id = { "approve", None },
    short_id_len = { "approve dead", None },
    non_hex = { "approve deadbeeg", None },
    trailing_words = { "approve deadbeef please", None },
    free_text = { "what is the cluster status?", None },
)]
fn reply_grammar(text: &str, expected: Option<ReplyVerb>) {
    let parsed = parse_reply(text);
    assert_eq!(parsed.as_ref().map(|(v, _)| *v), expected);
    if let Some((_, id)) = parsed {
        assert_eq!(id, "deadbeef");
    }
}

#[test]
fn ttl_remaining_saturates_at_zero() {
    let approval = PendingApproval {
        approval_id: ApprovalId::new(),
        short_id: "deadbeef".into(),
        tool_name: "k8s_restart_pod".into(),
        arguments: IndexMap::new(),
        risk: Risk::Medium,
        description: "restart the pod".into(),
        run_id: RunId::new(),
        channel_target: ChannelTarget::new("telegram", "1"),
        created_at_ms: 0,
        expires_at_ms: 900_000,
        status: ApprovalStatus::Pending,
    };
    assert_eq!(approval.ttl_remaining_secs(0), 900);
    assert_eq!(approval.ttl_remaining_secs(600_000), 300);
    assert_eq!(approval.ttl_remaining_secs(2_000_000), 0);
}

#[test]
fn terminal_statuses() {
    assert!(!ApprovalStatus::Pending.is_terminal());
    assert!(ApprovalStatus::Executed.is_terminal());
    assert!(ApprovalStatus::Rejected.is_terminal());
    assert!(ApprovalStatus::Expired.is_terminal());
}

mod reply_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn arbitrary_text_never_panics(text in ".*") {
            let _ = parse_reply(&text);
        }

        #[test]
        fn every_verb_with_hex_id_parses(
            verb in "(approve|yes|confirm|reject|no|cancel)",
            id in "[0-9a-fA-F]{8}",
        ) {
            let parsed = parse_reply(&format!("{verb} {id}"));
            prop_assert!(parsed.is_some());
            prop_assert_eq!(parsed.map(|(_, i)| i), Some(id.to_ascii_lowercase()));
        }

        #[test]
        fn wrong_length_ids_never_parse(
            verb in "(approve|reject)",
            id in "[0-9a-f]{1,7}|[0-9a-f]{9,16}",
        ) {
            let input = format!("{verb} {id}");
            prop_assert!(parse_reply(&input).is_none());
        }
    }
}
