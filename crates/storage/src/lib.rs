// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mimolo-storage: the evidence sinks (C6) — daily journal, current-segment
//! cache, and orchestrator log. Every write here is the durability point for
//! its data; nothing downstream replays or rewrites these files.

pub mod journal;
pub mod orchestrator_log;
pub mod segment_cache;

pub use journal::{Journal, JournalError};
pub use orchestrator_log::{OrchestratorLog, OrchestratorLogError, OrchestratorRecord};
pub use segment_cache::{write_current_segment, SegmentCacheError};
