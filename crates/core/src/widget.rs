// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Widget render/action correlation types.
//!
//! Owned by the widget bridge's pending-request table; this module only
//! defines the shared shapes so the protocol and engine crates agree on
//! them without a circular dependency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{InstanceId, PluginId};

crate::define_id! {
    /// Opaque correlation key for one outstanding widget render or action.
    pub struct RequestId;
}

crate::define_id! {
    /// Short-lived handle Control exchanges for a resolved artifact, never
    /// exposing the underlying filesystem path.
    pub struct ArtifactToken;
}

/// The rendering surface Control offered for one `request_widget_render`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub aspect_ratio: f32,
    pub max_w: u32,
    pub max_h: u32,
}

/// An outstanding request awaiting a `widget_frame` or `ack` from the
/// target agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRequest {
    pub request_id: RequestId,
    pub plugin_id: PluginId,
    pub instance_id: InstanceId,
    pub canvas: Canvas,
    pub mode: String,
    pub issued_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
}

impl WidgetRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline_at
    }
}

/// Resolved filesystem artifact handed to Control only as an opaque token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub token: ArtifactToken,
    pub plugin_id: PluginId,
    pub instance_id: InstanceId,
    pub artifact_ref: String,
    pub expires_at: DateTime<Utc>,
}

impl ArtifactHandle {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// `src` attributes in a `widget_frame` must match this shape; any bare
/// filesystem path fails validation.
pub fn is_artifact_uri(src: &str) -> bool {
    src.starts_with("mimolo://artifact/") && src.len() > "mimolo://artifact/".len()
}

#[cfg(test)]
#[path = "widget_tests.rs"]
mod tests;
