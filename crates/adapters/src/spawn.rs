// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the child process for one agent instance (C2 spawn path).

use mimolo_core::{AgentConfig, TrustRoots};
use mimolo_protocol::AGENT_PROTOCOL_VERSION;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};

use crate::trust::{resolve_trusted, TrustError};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("executable is not trusted: {0}")]
    ExecutableNotTrusted(#[from] TrustError),
    #[error("failed to spawn child process: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Validates `config.trust_check_path()` against `roots`, then spawns the
/// child with stdin/stdout/stderr piped. Does not wait for handshake —
/// that timeout is the process manager's concern, not the spawn path's.
pub fn spawn_agent(config: &AgentConfig, roots: &TrustRoots) -> Result<Child, SpawnError> {
    resolve_trusted(config.trust_check_path(), roots)?;

    let mut cmd = Command::new(&config.executable);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env("MIMOLO_AGENT_LABEL", config.label.as_str())
        .env("MIMOLO_PLUGIN_ID", config.plugin_id.as_str())
        .env("MIMOLO_INSTANCE_ID", config.instance_id.as_str())
        .env("MIMOLO_PROTOCOL_VERSION", AGENT_PROTOCOL_VERSION);

    Ok(cmd.spawn()?)
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
