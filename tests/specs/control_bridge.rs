// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command bridge introspection and monitor-settings mutation: `ping`
//! round-trips, `get_monitor_settings` reflects the configured defaults, a
//! valid `update_monitor_settings` sticks and is visible to a later read,
//! and a disallowed settings key is rejected as a policy violation without
//! touching the stored settings.

use mimolo_core::MonitorSettings;
use serde_json::json;

use crate::prelude::*;

#[test]
fn ping_round_trips() {
    let mut harness = Harness::start(vec![], MonitorSettings::default());
    let resp = harness.request(json!({"cmd": "ping"}));
    assert_eq!(resp["ok"], json!(true), "{resp}");
    assert_eq!(resp["data"]["pong"], json!(true), "{resp}");
}

#[test]
fn get_monitor_settings_reflects_configured_defaults() {
    let monitor = MonitorSettings { cooldown_seconds: 42, ..MonitorSettings::default() };
    let mut harness = Harness::start(vec![], monitor);

    let resp = harness.request(json!({"cmd": "get_monitor_settings"}));
    assert_eq!(resp["ok"], json!(true), "{resp}");
    assert_eq!(resp["data"]["monitor"]["cooldown_seconds"], json!(42), "{resp}");
}

#[test]
fn update_monitor_settings_sticks_and_is_visible_to_a_later_read() {
    let mut harness = Harness::start(vec![], MonitorSettings::default());

    let update = harness.request(json!({
        "cmd": "update_monitor_settings",
        "settings": {"cooldown_seconds": 99},
    }));
    assert_eq!(update["ok"], json!(true), "{update}");

    let resp = harness.request(json!({"cmd": "get_monitor_settings"}));
    assert_eq!(resp["data"]["monitor"]["cooldown_seconds"], json!(99), "{resp}");
}

#[test]
fn update_monitor_settings_with_a_disallowed_key_is_rejected() {
    let mut harness = Harness::start(vec![], MonitorSettings::default());

    let update = harness.request(json!({
        "cmd": "update_monitor_settings",
        "settings": {"not_a_real_setting": true},
    }));
    assert_eq!(update["ok"], json!(false), "{update}");
    assert_eq!(update["error"], json!("policy_violation"), "{update}");

    // Rejected update must not have perturbed the stored settings.
    let resp = harness.request(json!({"cmd": "get_monitor_settings"}));
    assert_eq!(
        resp["data"]["monitor"]["cooldown_seconds"],
        json!(MonitorSettings::default().cooldown_seconds),
        "{resp}"
    );
}
