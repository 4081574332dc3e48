// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity and configuration types.
//!
//! `AgentLabel` is the runtime-wide unique key operators and Control use to
//! address an agent instance. `PluginId`/`InstanceId` identify which plugin
//! template and which configured instance of it produced the label.

use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::path::PathBuf;

crate::define_id! {
    /// Runtime-wide unique key for one live or configured agent instance.
    pub struct AgentLabel;
}

crate::define_id! {
    /// Identifies an agent plugin (folder watcher, screen tracker, ...).
    pub struct PluginId;
}

crate::define_id! {
    /// Identifies one configured instance of a plugin.
    pub struct InstanceId;
}

/// Immutable configuration for one agent instance, as loaded from the
/// runtime config file. `label` must be unique across all configured
/// instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub label: AgentLabel,
    pub plugin_id: PluginId,
    pub instance_id: InstanceId,
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
    #[serde(default = "default_flush_interval_s")]
    pub flush_interval_s: u64,
    #[serde(default = "default_cpu_budget_pct")]
    pub cpu_budget_pct: f32,
    #[serde(default = "default_start_enabled")]
    pub start_enabled: bool,
    /// Plugin-scoped keys this core version doesn't recognize. Preserved
    /// verbatim (never validated, never dropped) so an older core keeps
    /// tolerating config written by a newer plugin.
    #[serde(flatten, default)]
    pub extra: Map<String, serde_json::Value>,
}

fn default_heartbeat_interval_s() -> u64 {
    15
}

fn default_flush_interval_s() -> u64 {
    30
}

fn default_cpu_budget_pct() -> f32 {
    5.0
}

fn default_start_enabled() -> bool {
    true
}

impl AgentConfig {
    /// The path checked against the trusted-root allowlist at spawn time.
    ///
    /// Per the data model, this is the executable itself, or (when the
    /// executable is a generic interpreter) the first script-looking
    /// argument.
    pub fn trust_check_path(&self) -> &std::path::Path {
        if is_interpreter(&self.executable) {
            if let Some(first_arg) = self.args.first() {
                return std::path::Path::new(first_arg);
            }
        }
        &self.executable
    }
}

fn is_interpreter(executable: &std::path::Path) -> bool {
    matches!(
        executable.file_name().and_then(|n| n.to_str()),
        Some("python3") | Some("python") | Some("node") | Some("sh") | Some("bash")
    )
}

/// Capability declaration for an agent template, consulted by the widget
/// bridge and by Control's rendering surface. Modeled as data rather than
/// trait objects so new plugin capabilities never require new Rust types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub supports_widget: bool,
    pub supports_refresh: bool,
}

/// Lifecycle state machine driven by [`crate::agent::LifecycleEvent`]-shaped
/// transitions in the process manager. `Error` is terminal until an explicit
/// restart clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Inactive,
    Starting,
    Running,
    ShuttingDown,
    Error,
}

impl LifecycleState {
    pub fn is_terminal_error(self) -> bool {
        matches!(self, LifecycleState::Error)
    }

    pub fn is_live(self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Running | LifecycleState::ShuttingDown
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Inactive => "inactive",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
