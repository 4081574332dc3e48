// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator log sink (C6.3).
//!
//! Receives C4-filtered agent `log` envelopes and C10 lifecycle/shutdown
//! breadcrumbs, and renders them as line-flushed text at the configured
//! path. Distinct from the workspace's own `tracing` diagnostics (see
//! `mimolo-ops::logging`): this sink carries evidence-adjacent records the
//! operator or Control may want to read as plain text, not the runtime's
//! internal engineering logs.

use chrono::{DateTime, Utc};
use mimolo_core::{AgentLabel, Verbosity};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorLogError {
    #[error("io error opening orchestrator log: {0}")]
    Open(#[source] std::io::Error),
    #[error("io error writing orchestrator log: {0}")]
    Write(#[source] std::io::Error),
}

/// One rendered line: either an agent-sourced `log` envelope (after
/// verbosity filtering) or a runtime-sourced lifecycle breadcrumb.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Verbosity,
    pub label: Option<AgentLabel>,
    pub message: String,
}

impl OrchestratorRecord {
    pub fn agent_log(timestamp: DateTime<Utc>, level: Verbosity, label: AgentLabel, message: impl Into<String>) -> Self {
        Self { timestamp, level, label: Some(label), message: message.into() }
    }

    pub fn lifecycle(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self { timestamp, level: Verbosity::Info, label: None, message: message.into() }
    }

    fn render(&self) -> String {
        match &self.label {
            Some(label) => format!(
                "{} [{}] {}: {}\n",
                self.timestamp.to_rfc3339(),
                level_str(self.level),
                label.as_str(),
                self.message
            ),
            None => format!(
                "{} [{}] {}\n",
                self.timestamp.to_rfc3339(),
                level_str(self.level),
                self.message
            ),
        }
    }
}

fn level_str(level: Verbosity) -> &'static str {
    match level {
        Verbosity::Debug => "debug",
        Verbosity::Info => "info",
        Verbosity::Warning => "warning",
        Verbosity::Error => "error",
    }
}

/// Line-flushed append sink for the orchestrator log file.
pub struct OrchestratorLog {
    path: PathBuf,
    file: File,
}

impl OrchestratorLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OrchestratorLogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(OrchestratorLogError::Open)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(OrchestratorLogError::Open)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `record` iff `record.level >= floor` (agent-sourced records
    /// are pre-filtered by the caller against `monitor.console_verbosity`;
    /// lifecycle breadcrumbs always pass since they carry `Info`).
    pub fn write(&mut self, record: &OrchestratorRecord, floor: Verbosity) -> Result<(), OrchestratorLogError> {
        if record.level < floor {
            return Ok(());
        }
        self.file.write_all(record.render().as_bytes()).map_err(OrchestratorLogError::Write)?;
        self.file.flush().map_err(OrchestratorLogError::Write)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_log_tests.rs"]
mod tests;
