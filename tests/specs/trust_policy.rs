// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trusted-root spawn policy: starting an agent whose executable resolves
//! outside every trusted root fails with `policy_violation` and never
//! leaves `inactive`.

use mimolo_core::MonitorSettings;
use serde_json::json;

use crate::prelude::*;

#[test]
fn untrusted_executable_is_rejected_and_stays_inactive() {
    let agent = fake_agent_config("untrusted-worker", false, &["idle"]);
    let mut harness = Harness::start_with_trust_roots(vec![agent], MonitorSettings::default(), vec![]);

    assert_eq!(harness.lifecycle_state("untrusted-worker").as_deref(), Some("inactive"));

    let resp = harness.request(json!({"cmd": "start_agent", "label": "untrusted-worker"}));
    assert_eq!(resp["ok"], json!(false), "{resp}");
    assert_eq!(resp["error"], json!("policy_violation"), "{resp}");

    assert_eq!(harness.lifecycle_state("untrusted-worker").as_deref(), Some("inactive"));
    assert!(harness.journal_kinds().is_empty(), "{:?}", harness.journal_kinds());
}

#[test]
fn unknown_agent_label_is_rejected() {
    let mut harness = Harness::start(vec![], MonitorSettings::default());
    let resp = harness.request(json!({"cmd": "start_agent", "label": "does-not-exist"}));
    assert_eq!(resp["ok"], json!(false), "{resp}");
    assert_eq!(resp["error"], json!("unknown_instance:does-not-exist"), "{resp}");
}
