// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Behavioral specifications for the MiMoLo Operations runtime.
//!
//! Black-box: each spec spawns the real `ops` binary against a private
//! tempdir and a `fake_agent` fixture process, then drives it over the
//! command bridge exactly as Control would.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/segment_lifecycle.rs"]
mod segment_lifecycle;
#[path = "specs/trust_policy.rs"]
mod trust_policy;
#[path = "specs/crash_isolation.rs"]
mod crash_isolation;
#[path = "specs/shutdown.rs"]
mod shutdown;
#[path = "specs/widget_bridge.rs"]
mod widget_bridge;
#[path = "specs/control_bridge.rs"]
mod control_bridge;
