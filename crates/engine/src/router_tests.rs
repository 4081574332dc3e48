// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::process_manager::AgentProcessManager;
use crate::segment_tracker::{OutOfOrderPolicy, SegmentTracker};
use crate::widget_bridge::WidgetBridge;
use mimolo_core::{AgentConfig, AgentLabel, SequentialIdGen, SystemClock, TrustRoots, Verbosity};
use mimolo_storage::{Journal, OrchestratorLog};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::tempdir;

fn config_with_script(dir: &std::path::Path, script: &str) -> AgentConfig {
    let script_path = dir.join("agent.sh");
    std::fs::write(&script_path, script).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path).expect("stat script").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).expect("chmod script");
    }
    AgentConfig {
        label: AgentLabel::new("a1"),
        plugin_id: mimolo_core::PluginId::new("p"),
        instance_id: mimolo_core::InstanceId::new("i"),
        executable: std::path::PathBuf::from("/bin/sh"),
        args: vec![script_path.to_string_lossy().to_string()],
        heartbeat_interval_s: 15,
        flush_interval_s: 30,
        cpu_budget_pct: 5.0,
        start_enabled: true,
        extra: serde_json::Map::new(),
    }
}

async fn poll_until<F: Fn() -> bool>(pred: F, timeout: StdDuration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !pred() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
}

fn new_router(dir: &std::path::Path) -> EvidenceRouter<SequentialIdGen> {
    let tracker = SegmentTracker::new(300, OutOfOrderPolicy::AcceptWithoutRewind, SequentialIdGen::new("seg"));
    let journal = Journal::new(dir.join("journal"));
    let log = OrchestratorLog::open(dir.join("orchestrator.log")).expect("open orchestrator log");
    EvidenceRouter::new(tracker, journal, log, dir.join("current_segment.json"), Verbosity::Debug)
}

#[tokio::test]
async fn tick_routes_every_message_kind_to_its_destination() {
    let dir = tempdir().expect("tempdir");
    let label = AgentLabel::new("a1");
    let script = r#"#!/bin/sh
echo '{"type":"handshake","timestamp":"2026-01-01T00:00:00Z","agent_label":"a1","protocol_version":"0.3"}'
echo '{"type":"heartbeat","timestamp":"2026-01-01T00:00:01Z","agent_label":"a1","protocol_version":"0.3"}'
echo '{"type":"summary","timestamp":"2026-01-01T00:00:02Z","agent_label":"a1","protocol_version":"0.3","data":{"activity_signal":{"mode":"active"}}}'
echo '{"type":"status","timestamp":"2026-01-01T00:00:03Z","agent_label":"a1","protocol_version":"0.3","message":"ready"}'
echo '{"type":"log","timestamp":"2026-01-01T00:00:04Z","agent_label":"a1","protocol_version":"0.3","level":"info","message":"hello"}'
echo '{"type":"error","timestamp":"2026-01-01T00:00:05Z","agent_label":"a1","protocol_version":"0.3","data":{"error_kind":"boom"}}'
echo '{"type":"widget_frame","timestamp":"2026-01-01T00:00:06Z","agent_label":"a1","protocol_version":"0.3","request_id":"r1","data":{"mode":"ascii"}}'
sleep 5
"#;
    let config = config_with_script(dir.path(), script);
    let roots = TrustRoots::new(vec![dir.path().canonicalize().expect("canonicalize")]);
    let mut manager = AgentProcessManager::new(roots, dir.path().join("stderr"), Arc::new(SystemClock));
    manager.register(config);
    manager.start(&label).await.expect("start");

    poll_until(
        || manager.handle(&label).map(|h| h.metrics(0.0, 0).last_rx_at.is_some()).unwrap_or(false),
        StdDuration::from_secs(3),
    )
    .await;
    // Give the script a moment to finish emitting its whole burst before we drain.
    tokio::time::sleep(StdDuration::from_millis(200)).await;

    let mut router = new_router(dir.path());
    let widget_bridge = WidgetBridge::new();
    let now = chrono::Utc::now();
    let outcome = router.tick(&mut manager, &widget_bridge, now);

    assert_eq!(outcome.messages_processed, 7);
    // summary + status(changed) + error = 3, plus a segment_start from the
    // resetting summary.
    assert_eq!(outcome.journaled, 4);
    assert_eq!(outcome.logs_emitted, 1);
    assert_eq!(outcome.widget_frames_routed, 1);
    assert_eq!(manager.snapshot(&label).unwrap().lifecycle_state, LifecycleState::Running);
    assert_eq!(manager.snapshot(&label).unwrap().detail.as_deref(), Some("ready"));
    assert!(router.segment_tracker().is_open());
}

#[tokio::test]
async fn heartbeat_and_handshake_are_never_journaled() {
    let dir = tempdir().expect("tempdir");
    let label = AgentLabel::new("a1");
    let script = r#"#!/bin/sh
echo '{"type":"handshake","timestamp":"2026-01-01T00:00:00Z","agent_label":"a1","protocol_version":"0.3"}'
echo '{"type":"heartbeat","timestamp":"2026-01-01T00:00:01Z","agent_label":"a1","protocol_version":"0.3"}'
sleep 5
"#;
    let config = config_with_script(dir.path(), script);
    let roots = TrustRoots::new(vec![dir.path().canonicalize().expect("canonicalize")]);
    let mut manager = AgentProcessManager::new(roots, dir.path().join("stderr"), Arc::new(SystemClock));
    manager.register(config);
    manager.start(&label).await.expect("start");

    poll_until(
        || manager.handle(&label).map(|h| h.metrics(0.0, 0).last_rx_at.is_some()).unwrap_or(false),
        StdDuration::from_secs(3),
    )
    .await;
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    let mut router = new_router(dir.path());
    let widget_bridge = WidgetBridge::new();
    let outcome = router.tick(&mut manager, &widget_bridge, chrono::Utc::now());

    assert_eq!(outcome.messages_processed, 2);
    assert_eq!(outcome.journaled, 0);
}
