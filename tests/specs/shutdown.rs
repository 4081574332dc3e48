// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shutdown orchestrator: a SIGTERM runs the stop/flush/shutdown sequence
//! to completion for a cooperative agent, force-kills one that never acks,
//! and always closes any still-open segment and leaves the lifecycle
//! breadcrumbs in the journal.

use mimolo_core::MonitorSettings;

use crate::prelude::*;

#[test]
fn cooperative_agent_is_stopped_gracefully_and_segment_is_closed() {
    let agent = fake_agent_config("cooperative", true, &["active_repeat", "1", "50"]);
    let mut harness = Harness::start(vec![agent], MonitorSettings::default());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("cooperative").as_deref() == Some("running")),
        "agent never reached running"
    );
    assert!(
        wait_for(3_000, || harness.journal_kinds().iter().any(|k| k == "segment_start")),
        "segment never opened: {:?}",
        harness.journal_kinds()
    );

    harness.terminate();
    let status = harness.wait_exit(5_000);
    assert!(status.is_some(), "ops never exited after SIGTERM");
    assert!(status.expect("checked above").success(), "ops exited non-zero on graceful shutdown");

    let kinds = harness.journal_kinds();
    assert!(kinds.iter().any(|k| k == "lifecycle"), "{kinds:?}");
    // The run's still-open segment must be force-closed as part of shutdown,
    // even though the cooldown window never naturally elapsed.
    assert!(kinds.iter().any(|k| k == "segment_close"), "{kinds:?}");
}

#[test]
#[serial_test::serial]
fn unresponsive_agent_is_force_killed_at_grace_expiry() {
    let agent = fake_agent_config("stubborn", true, &["never_ack"]);
    let mut harness = Harness::start(vec![agent], MonitorSettings::default());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("stubborn").as_deref() == Some("running")),
        "agent never reached running"
    );

    harness.terminate();
    // The process manager's stop grace defaults to 10s; allow comfortable
    // headroom past that before declaring the force-kill path broken.
    let status = harness.wait_exit(20_000);
    assert!(status.is_some(), "ops never exited even after the force-kill grace period");
    assert!(status.expect("checked above").success(), "ops exited non-zero on a forced shutdown");
}
