// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command bridge request/response envelopes (C8 data shape).
//!
//! Transport framing lives in [`crate::wire`]; this module only defines the
//! JSON shapes exchanged once a line has been read off the socket.

use chrono::{DateTime, Utc};
use mimolo_core::{AgentConfig, AgentLabel, Canvas, InstanceId, PluginId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// One request from Control, tagged by `cmd`. Each variant carries exactly
/// the parameters that command needs; `request_id` rides along so the
/// response can echo it for client-side correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeRequest {
    Ping {
        #[serde(default)]
        request_id: Option<String>,
    },
    GetRegisteredPlugins {
        #[serde(default)]
        request_id: Option<String>,
    },
    GetAgentStates {
        #[serde(default)]
        request_id: Option<String>,
    },
    GetAgentInstances {
        #[serde(default)]
        request_id: Option<String>,
    },
    ListAgentTemplates {
        #[serde(default)]
        request_id: Option<String>,
    },
    GetMonitorSettings {
        #[serde(default)]
        request_id: Option<String>,
    },
    GetRuntimePerf {
        #[serde(default)]
        request_id: Option<String>,
    },
    StartAgent {
        #[serde(default)]
        request_id: Option<String>,
        label: AgentLabel,
    },
    StopAgent {
        #[serde(default)]
        request_id: Option<String>,
        label: AgentLabel,
    },
    RestartAgent {
        #[serde(default)]
        request_id: Option<String>,
        label: AgentLabel,
    },
    AddAgentInstance {
        #[serde(default)]
        request_id: Option<String>,
        config: AgentConfig,
    },
    DuplicateAgentInstance {
        #[serde(default)]
        request_id: Option<String>,
        label: AgentLabel,
        new_label: AgentLabel,
    },
    RemoveAgentInstance {
        #[serde(default)]
        request_id: Option<String>,
        label: AgentLabel,
    },
    UpdateAgentInstance {
        #[serde(default)]
        request_id: Option<String>,
        label: AgentLabel,
        patch: Value,
    },
    UpdateMonitorSettings {
        #[serde(default)]
        request_id: Option<String>,
        settings: Value,
    },
    GetWidgetManifest {
        #[serde(default)]
        request_id: Option<String>,
        plugin_id: PluginId,
    },
    RequestWidgetRender {
        #[serde(default)]
        request_id: Option<String>,
        plugin_id: PluginId,
        instance_id: InstanceId,
        canvas: Canvas,
        mode: String,
    },
    DispatchWidgetAction {
        #[serde(default)]
        request_id: Option<String>,
        plugin_id: PluginId,
        instance_id: InstanceId,
        action: String,
        #[serde(default)]
        payload: Value,
    },
    ListInstalledPlugins {
        #[serde(default)]
        request_id: Option<String>,
    },
    InspectPluginArchive {
        #[serde(default)]
        request_id: Option<String>,
        archive_path: PathBuf,
    },
    InstallPlugin {
        #[serde(default)]
        request_id: Option<String>,
        archive_path: PathBuf,
    },
    UpgradePlugin {
        #[serde(default)]
        request_id: Option<String>,
        plugin_id: PluginId,
        archive_path: PathBuf,
    },
}

impl BridgeRequest {
    pub fn request_id(&self) -> Option<&str> {
        macro_rules! rid {
            ($($variant:ident),* $(,)?) => {
                match self {
                    $(BridgeRequest::$variant { request_id, .. } => request_id.as_deref()),*
                }
            };
        }
        rid!(
            Ping,
            GetRegisteredPlugins,
            GetAgentStates,
            GetAgentInstances,
            ListAgentTemplates,
            GetMonitorSettings,
            GetRuntimePerf,
            StartAgent,
            StopAgent,
            RestartAgent,
            AddAgentInstance,
            DuplicateAgentInstance,
            RemoveAgentInstance,
            UpdateAgentInstance,
            UpdateMonitorSettings,
            GetWidgetManifest,
            RequestWidgetRender,
            DispatchWidgetAction,
            ListInstalledPlugins,
            InspectPluginArchive,
            InstallPlugin,
            UpgradePlugin,
        )
    }

    /// The `cmd` string as it appears on the wire, for echoing into the
    /// response envelope and for error-path logging.
    pub fn cmd_name(&self) -> &'static str {
        match self {
            BridgeRequest::Ping { .. } => "ping",
            BridgeRequest::GetRegisteredPlugins { .. } => "get_registered_plugins",
            BridgeRequest::GetAgentStates { .. } => "get_agent_states",
            BridgeRequest::GetAgentInstances { .. } => "get_agent_instances",
            BridgeRequest::ListAgentTemplates { .. } => "list_agent_templates",
            BridgeRequest::GetMonitorSettings { .. } => "get_monitor_settings",
            BridgeRequest::GetRuntimePerf { .. } => "get_runtime_perf",
            BridgeRequest::StartAgent { .. } => "start_agent",
            BridgeRequest::StopAgent { .. } => "stop_agent",
            BridgeRequest::RestartAgent { .. } => "restart_agent",
            BridgeRequest::AddAgentInstance { .. } => "add_agent_instance",
            BridgeRequest::DuplicateAgentInstance { .. } => "duplicate_agent_instance",
            BridgeRequest::RemoveAgentInstance { .. } => "remove_agent_instance",
            BridgeRequest::UpdateAgentInstance { .. } => "update_agent_instance",
            BridgeRequest::UpdateMonitorSettings { .. } => "update_monitor_settings",
            BridgeRequest::GetWidgetManifest { .. } => "get_widget_manifest",
            BridgeRequest::RequestWidgetRender { .. } => "request_widget_render",
            BridgeRequest::DispatchWidgetAction { .. } => "dispatch_widget_action",
            BridgeRequest::ListInstalledPlugins { .. } => "list_installed_plugins",
            BridgeRequest::InspectPluginArchive { .. } => "inspect_plugin_archive",
            BridgeRequest::InstallPlugin { .. } => "install_plugin",
            BridgeRequest::UpgradePlugin { .. } => "upgrade_plugin",
        }
    }

    /// True for requests C8 enqueues onto the control action queue rather
    /// than handling inline.
    pub fn is_queued_action(&self) -> bool {
        matches!(
            self,
            BridgeRequest::StartAgent { .. }
                | BridgeRequest::StopAgent { .. }
                | BridgeRequest::RestartAgent { .. }
                | BridgeRequest::AddAgentInstance { .. }
                | BridgeRequest::DuplicateAgentInstance { .. }
                | BridgeRequest::RemoveAgentInstance { .. }
                | BridgeRequest::UpdateAgentInstance { .. }
                | BridgeRequest::UpdateMonitorSettings { .. }
        )
    }
}

/// Structured error codes the bridge may return. `MissingField` and
/// `UnknownInstance` carry the offending name/label for client display and
/// serialize to the `missing_field:<name>` / `unknown_instance:<label>`
/// colon-suffixed form the command set documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeErrorCode {
    UnknownCommand,
    MissingField { name: String },
    UnknownInstance { label: String },
    PolicyViolation,
    PreconditionFailed,
    RenderTimeout,
    RenderPayloadTooLarge,
    RenderValidationFailed,
    ShuttingDown,
    NotImplementedYet,
}

impl std::fmt::Display for BridgeErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeErrorCode::UnknownCommand => write!(f, "unknown_command"),
            BridgeErrorCode::MissingField { name } => write!(f, "missing_field:{name}"),
            BridgeErrorCode::UnknownInstance { label } => write!(f, "unknown_instance:{label}"),
            BridgeErrorCode::PolicyViolation => write!(f, "policy_violation"),
            BridgeErrorCode::PreconditionFailed => write!(f, "precondition_failed"),
            BridgeErrorCode::RenderTimeout => write!(f, "render_timeout"),
            BridgeErrorCode::RenderPayloadTooLarge => write!(f, "render_payload_too_large"),
            BridgeErrorCode::RenderValidationFailed => write!(f, "render_validation_failed"),
            BridgeErrorCode::ShuttingDown => write!(f, "shutting_down"),
            BridgeErrorCode::NotImplementedYet => write!(f, "not_implemented_yet"),
        }
    }
}

impl std::str::FromStr for BridgeErrorCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("missing_field:") {
            return Ok(BridgeErrorCode::MissingField { name: name.to_string() });
        }
        if let Some(label) = s.strip_prefix("unknown_instance:") {
            return Ok(BridgeErrorCode::UnknownInstance { label: label.to_string() });
        }
        Ok(match s {
            "unknown_command" => BridgeErrorCode::UnknownCommand,
            "policy_violation" => BridgeErrorCode::PolicyViolation,
            "precondition_failed" => BridgeErrorCode::PreconditionFailed,
            "render_timeout" => BridgeErrorCode::RenderTimeout,
            "render_payload_too_large" => BridgeErrorCode::RenderPayloadTooLarge,
            "render_validation_failed" => BridgeErrorCode::RenderValidationFailed,
            "shutting_down" => BridgeErrorCode::ShuttingDown,
            "not_implemented_yet" => BridgeErrorCode::NotImplementedYet,
            _ => return Err(()),
        })
    }
}

impl Serialize for BridgeErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BridgeErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| serde::de::Error::custom(format!("unknown error code: {s}")))
    }
}

/// `{ok, cmd, timestamp, request_id?, data?, error?}` — the single response
/// shape for every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub ok: bool,
    pub cmd: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<BridgeErrorCode>,
}

impl BridgeResponse {
    pub fn ok(request: &BridgeRequest, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            ok: true,
            cmd: request.cmd_name().to_string(),
            timestamp,
            request_id: request.request_id().map(str::to_string),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(request: &BridgeRequest, timestamp: DateTime<Utc>, code: BridgeErrorCode) -> Self {
        Self {
            ok: false,
            cmd: request.cmd_name().to_string(),
            timestamp,
            request_id: request.request_id().map(str::to_string),
            data: None,
            error: Some(code),
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
