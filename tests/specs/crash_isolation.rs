// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A malformed stdout line from one agent must not kill its handle, and
//! must not disturb any other agent's evidence stream.

use mimolo_core::MonitorSettings;

use crate::prelude::*;

#[test]
fn malformed_line_is_journaled_as_error_and_does_not_kill_the_agent() {
    let noisy = fake_agent_config("noisy", true, &["bad_then_good"]);
    let healthy = fake_agent_config("healthy", true, &["active_repeat", "2", "100"]);
    let mut harness = Harness::start(vec![noisy, healthy], MonitorSettings::default());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("noisy").as_deref() == Some("running")
            && harness.lifecycle_state("healthy").as_deref() == Some("running")),
        "agents never reached running: {:?} {:?}",
        harness.lifecycle_state("noisy"),
        harness.lifecycle_state("healthy")
    );

    assert!(
        wait_for(3_000, || harness.journal_kinds().iter().any(|k| k == "error")),
        "malformed line never surfaced as a journaled error: {:?}",
        harness.journal_kinds()
    );

    // The malformed line must not have torn down the handle: its later,
    // well-formed summary still arrives and gets journaled.
    assert!(
        wait_for(3_000, || {
            harness
                .journal_records()
                .iter()
                .filter(|r| r["kind"] == "summary" && r["label"] == "noisy")
                .count()
                >= 1
        }),
        "noisy agent's valid summary never arrived after the bad line"
    );

    // The healthy agent's own segment evidence is unaffected.
    assert!(
        wait_for(3_000, || {
            harness
                .journal_records()
                .iter()
                .any(|r| r["kind"] == "segment_start" && r["label"] == "healthy")
        }),
        "healthy agent's segment never opened: {:?}",
        harness.journal_kinds()
    );

    assert_eq!(harness.lifecycle_state("noisy").as_deref(), Some("running"));
    assert_eq!(harness.lifecycle_state("healthy").as_deref(), Some("running"));
}
