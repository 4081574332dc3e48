// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent JLP message envelope (C1 data shape).
//!
//! One JSON object per line on a child's stdout. `ProtocolMessage` is the
//! tagged union of every envelope kind an agent may emit; shared fields are
//! hoisted to the top level and type-specific data lives under `data`.

use chrono::{DateTime, Utc};
use mimolo_core::AgentLabel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every protocol version this build understands the wire shape of.
pub const AGENT_PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent-reported activity signal consulted by the segment tracker. This is
/// the only field the tracker reads out of a `summary`'s `data`; everything
/// else is opaque payload forwarded to the journal untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMode {
    Active,
    Passive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySignal {
    pub mode: ActivityMode,
    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ActivitySignal {
    /// `summary` is cooldown-resetting unless the agent explicitly opts out.
    pub fn resets_cooldown(&self) -> bool {
        matches!(self.mode, ActivityMode::Active) || self.keep_alive
    }
}

/// The tagged union of envelopes an agent may send on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolMessage {
    Handshake(Envelope),
    Summary(Envelope),
    Heartbeat(Envelope),
    Status(Envelope),
    Error(Envelope),
    Ack(Envelope),
    Log(Envelope),
    WidgetFrame(Envelope),
    /// Core→agent direction only: one step of the `stop`/`flush`/`shutdown`
    /// sequence, or a widget render/action request. `data.command` (for
    /// lifecycle steps) or `data.action` (for widget requests) names the
    /// specific instruction; agents ack lifecycle steps via `Ack` with
    /// `ack_command` set to the same name.
    Command(Envelope),
}

impl ProtocolMessage {
    pub fn envelope(&self) -> &Envelope {
        match self {
            ProtocolMessage::Handshake(e)
            | ProtocolMessage::Summary(e)
            | ProtocolMessage::Heartbeat(e)
            | ProtocolMessage::Status(e)
            | ProtocolMessage::Error(e)
            | ProtocolMessage::Ack(e)
            | ProtocolMessage::Log(e)
            | ProtocolMessage::WidgetFrame(e)
            | ProtocolMessage::Command(e) => e,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            ProtocolMessage::Handshake(_) => "handshake",
            ProtocolMessage::Summary(_) => "summary",
            ProtocolMessage::Heartbeat(_) => "heartbeat",
            ProtocolMessage::Status(_) => "status",
            ProtocolMessage::Error(_) => "error",
            ProtocolMessage::Ack(_) => "ack",
            ProtocolMessage::Log(_) => "log",
            ProtocolMessage::WidgetFrame(_) => "widget_frame",
            ProtocolMessage::Command(_) => "command",
        }
    }

    /// Builds one step of the core→agent `stop`/`flush`/`shutdown`
    /// sequence.
    pub fn lifecycle_command(label: AgentLabel, timestamp: DateTime<Utc>, command: &str) -> Self {
        ProtocolMessage::Command(Envelope {
            timestamp,
            agent_id: None,
            agent_label: label,
            protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
            agent_version: None,
            data: serde_json::json!({ "command": command }),
            metrics: None,
            level: None,
            message: None,
            ack_command: Some(command.to_string()),
            request_id: None,
        })
    }

    /// Builds a widget render/action request forwarded to an agent.
    pub fn widget_command(
        label: AgentLabel,
        timestamp: DateTime<Utc>,
        action: &str,
        request_id: String,
        payload: Value,
    ) -> Self {
        ProtocolMessage::Command(Envelope {
            timestamp,
            agent_id: None,
            agent_label: label,
            protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
            agent_version: None,
            data: serde_json::json!({ "action": action, "payload": payload }),
            metrics: None,
            level: None,
            message: None,
            ack_command: None,
            request_id: Some(request_id),
        })
    }

    /// Builds a synthetic `Error` envelope attributed to `label`, used for
    /// frame-level failures the codec must surface without killing the
    /// handle (oversize frames, unknown `type`, bad timestamps).
    pub fn synthetic_error(label: AgentLabel, timestamp: DateTime<Utc>, kind: &str, detail: impl Into<String>) -> Self {
        ProtocolMessage::Error(Envelope {
            timestamp,
            agent_id: None,
            agent_label: label,
            protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
            agent_version: None,
            data: serde_json::json!({ "error_kind": kind }),
            metrics: None,
            level: Some("error".to_string()),
            message: Some(detail.into()),
            ack_command: None,
            request_id: None,
        })
    }
}

/// Shared envelope fields carried by every `ProtocolMessage` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent_id: Option<String>,
    pub agent_label: AgentLabel,
    pub protocol_version: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ack_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
}

impl Envelope {
    /// Parses `summary.data` into an [`ActivitySignal`] if present and
    /// well-shaped. Any other envelope kind, or a malformed signal, yields
    /// `None` — the caller treats a missing signal as non-resetting.
    pub fn activity_signal(&self) -> Option<ActivitySignal> {
        self.data
            .get("activity_signal")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
