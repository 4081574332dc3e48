// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mimolo-engine: the runtime tick loop's components — the lifecycle state
//! machine (C3), the evidence router (C4), the segment tracker (C5), the
//! widget bridge (C7), the control action queue (C9), the shutdown
//! orchestrator (C10), and perf telemetry (C11).
//!
//! Every piece here is wired together by `mimolo-ops::runtime`, which owns
//! the actual tick loop and the crates this one cannot depend on (config
//! persistence, the command-bridge socket server).

pub mod control_queue;
pub mod perf;
pub mod process_manager;
pub mod router;
pub mod segment_tracker;
pub mod shutdown;
pub mod widget_bridge;

pub use control_queue::{ActionResult, ControlActionQueue};
pub use perf::{AgentPerfSample, AgentSampleInput, PerfRecorder, PerfSample, ProcessSampler, StageDurations, DEFAULT_RETENTION};
pub use process_manager::{
    AgentProcessManager, AgentSnapshot, ManagerError, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PHASE_ACK_TIMEOUT, DEFAULT_STOP_GRACE,
};
pub use router::{EvidenceRouter, RouterOutcome, DEFAULT_MAX_MESSAGES_PER_AGENT_PER_TICK};
pub use segment_tracker::{CacheWriteReason, OutOfOrderPolicy, SegmentTracker, TrackerOutcome};
pub use shutdown::{force_close_segment, shutdown_runtime, ShutdownOutcome, DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_GRACE_TOTAL};
pub use widget_bridge::{
    WidgetBridge, WidgetOutcome, ARTIFACT_TTL_MAX_MS, ARTIFACT_TTL_MIN_MS, DEFAULT_RENDER_DEADLINE, MAX_FRAGMENT_SIZE_BYTES,
};
