// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-agent segment lifecycle: a run of active summaries keeps one
//! segment open, and the segment closes only once the cooldown window
//! elapses with no further resetting event.

use mimolo_core::MonitorSettings;

use crate::prelude::*;

fn fast_monitor() -> MonitorSettings {
    MonitorSettings {
        poll_tick_s: 0.05,
        cooldown_seconds: 1,
        ..MonitorSettings::default()
    }
}

#[test]
fn active_summaries_keep_one_segment_open_then_it_closes_after_cooldown() {
    let agent = fake_agent_config("worker", true, &["active_repeat", "4", "120"]);
    let mut harness = Harness::start(vec![agent], fast_monitor());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("worker").as_deref() == Some("running")),
        "agent never reached running: {:?}",
        harness.lifecycle_state("worker")
    );

    assert!(
        wait_for(3_000, || harness.journal_kinds().iter().any(|k| k == "segment_start")),
        "no segment_start in journal: {:?}",
        harness.journal_kinds()
    );

    // The four summaries land ~480ms apart total, all under the 1s cooldown,
    // so the segment should still be open with no close yet.
    std::thread::sleep(std::time::Duration::from_millis(600));
    let mid_kinds = harness.journal_kinds();
    assert!(!mid_kinds.iter().any(|k| k == "segment_close"), "segment closed too early: {mid_kinds:?}");

    assert!(
        wait_for(5_000, || harness.journal_kinds().iter().any(|k| k == "segment_close")),
        "segment never closed: {:?}",
        harness.journal_kinds()
    );

    let kinds = harness.journal_kinds();
    assert_eq!(kinds.iter().filter(|k| *k == "segment_start").count(), 1, "{kinds:?}");
    assert!(kinds.iter().filter(|k| *k == "summary").count() >= 4, "{kinds:?}");
    assert_eq!(kinds.iter().filter(|k| *k == "segment_close").count(), 1, "{kinds:?}");
    assert_eq!(kinds.iter().filter(|k| *k == "idle_start").count(), 1, "{kinds:?}");

    let start_idx = kinds.iter().position(|k| k == "segment_start").expect("segment_start present");
    let close_idx = kinds.iter().position(|k| k == "segment_close").expect("segment_close present");
    let idle_idx = kinds.iter().position(|k| k == "idle_start").expect("idle_start present");
    assert!(start_idx < close_idx, "{kinds:?}");
    assert!(close_idx < idle_idx, "{kinds:?}");
}

#[test]
fn idle_agent_never_opens_a_segment() {
    let agent = fake_agent_config("idle-worker", true, &["idle"]);
    let mut harness = Harness::start(vec![agent], fast_monitor());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("idle-worker").as_deref() == Some("running")),
        "agent never reached running"
    );

    std::thread::sleep(std::time::Duration::from_millis(800));
    let kinds = harness.journal_kinds();
    assert!(!kinds.iter().any(|k| k == "segment_start"), "{kinds:?}");
}
