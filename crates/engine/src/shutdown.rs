// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shutdown Orchestrator (C10): drives the runtime-wide stop sequence.
//!
//! [`AgentProcessManager::begin_stop`] already knows how to take one agent
//! through its `stop`/`flush`/`shutdown` steps, advancing from one phase to
//! the next as each phase's own ack arrives or its individual ack timeout
//! (default 3s, logged on expiry) elapses, and force-killing it at that
//! agent's overall grace deadline; this module is the layer above that
//! snapshots every live label, issues the sequence to each, and polls the
//! manager's own tick until the whole runtime has quiesced or the overall
//! grace period elapses, after which it force-kills any stragglers. Journal
//! breadcrumbs are left to the caller (`mimolo-ops::runtime`), since this
//! function has no journal access by design — it orchestrates process
//! lifecycle only.

use std::time::Duration;

use chrono::{DateTime, Utc};
use mimolo_core::{AgentLabel, Clock};

use crate::process_manager::AgentProcessManager;

/// Overall budget for every agent to ack its stop sequence before stragglers
/// are force-killed. Matches [`crate::process_manager::DEFAULT_STOP_GRACE`]
/// so a single agent's own grace timer and the runtime-wide one line up.
pub const DEFAULT_SHUTDOWN_GRACE_TOTAL: Duration = Duration::from_secs(10);

/// How often the orchestrator polls [`AgentProcessManager::tick`] while
/// waiting for agents to quiesce.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct ShutdownOutcome {
    /// Labels that were live when shutdown began.
    pub initiated_labels: Vec<AgentLabel>,
    /// Labels still live after the overall grace period, force-killed.
    pub forced_labels: Vec<AgentLabel>,
    /// Whether an open segment existed and was force-closed.
    pub closed_open_segment: bool,
}

/// Runs the full runtime shutdown sequence against `manager`, driving its
/// own clock via `clock.now()` for deadline checks.
pub async fn shutdown_runtime(
    manager: &mut AgentProcessManager,
    clock: &dyn Clock,
    overall_grace: Duration,
    poll_interval: Duration,
) -> ShutdownOutcome {
    let mut outcome = ShutdownOutcome::default();
    let live = manager.live_labels();
    outcome.initiated_labels = live.clone();

    for label in &live {
        let _ = manager.begin_stop(label).await;
    }

    let deadline = tokio::time::Instant::now() + overall_grace;
    loop {
        let now = clock.now();
        manager.tick(now).await;

        if manager.live_labels().is_empty() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(poll_interval).await;
    }

    let stragglers = manager.live_labels();
    if !stragglers.is_empty() {
        outcome.forced_labels = manager.force_kill_all_live().await;
    }

    outcome
}

/// Forces any open segment closed, for the caller to invoke once
/// [`shutdown_runtime`] has returned and all agent I/O has stopped. Kept
/// separate since segment tracking and process management are independently
/// owned components; the caller wires them together.
pub fn force_close_segment<I: mimolo_core::IdGen>(
    tracker: &mut crate::segment_tracker::SegmentTracker<I>,
    now: DateTime<Utc>,
) -> Option<crate::segment_tracker::TrackerOutcome> {
    if !tracker.is_open() {
        return None;
    }
    Some(tracker.force_close(now))
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
