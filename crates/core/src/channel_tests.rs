// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn parses_type_and_id() {
    let target = ChannelTarget::parse("telegram:123456").unwrap();
    assert_eq!(target.channel_type, "telegram");
    assert_eq!(target.channel_id, "123456");
}

#[test]
fn id_may_contain_separator() {
    let target = ChannelTarget::parse("slack:C01:thread").unwrap();
    assert_eq!(target.channel_id, "C01:thread");
}

#[parameterized(
    no_separator = { "telegram" },
    empty_type = { ":123" },
    empty_id = { "slack:" },
)]
fn rejects_malformed(input: &str) {
    assert!(ChannelTarget::parse(input).is_err());
}

#[test]
fn display_round_trips() {
    let target = ChannelTarget::new("discord", "999");
    assert_eq!(ChannelTarget::parse(&target.to_string()).unwrap(), target);
}

#[test]
fn serde_uses_string_form() {
    let target = ChannelTarget::new("telegram", "42");
    let json = serde_json::to_string(&target).unwrap();
    assert_eq!(json, "\"telegram:42\"");
    let back: ChannelTarget = serde_json::from_str(&json).unwrap();
    assert_eq!(back, target);
}
