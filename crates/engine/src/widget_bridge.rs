// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Widget Bridge (C7): correlates `request_widget_render` /
//! `dispatch_widget_action` with the `widget_frame` or `ack` an agent sends
//! back, and mints short-lived artifact tokens so Control never sees a raw
//! filesystem path.
//!
//! The pending table is shared between the command-bridge server's
//! per-connection tasks (which register a wait and block on it) and the
//! runtime tick thread's [`crate::router::EvidenceRouter`] (which resolves
//! a wait when the matching `widget_frame`/`ack` is drained). A
//! `parking_lot::Mutex` guards both tables; nothing here holds it across an
//! `.await`.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mimolo_adapters::AgentHandle;
use mimolo_core::{ArtifactHandle, ArtifactToken, Canvas, IdGen, InstanceId, PluginId, RequestId};
use mimolo_protocol::{BridgeErrorCode, ProtocolMessage};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use tokio::sync::oneshot;

/// Matches an HTML `src="..."`/`src='...'` attribute embedded in a string
/// value, so a raw path smuggled inside a rendered fragment (not just a
/// JSON `src` key) is still caught.
#[allow(clippy::expect_used)]
static SRC_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*"([^"]*)"|(?i)\bsrc\s*=\s*'([^']*)'"#).expect("constant regex pattern is valid"));

/// Default time a render/action request waits for a response before
/// `render_timeout`.
pub const DEFAULT_RENDER_DEADLINE: Duration = Duration::from_secs(2);

/// Frames larger than this (serialized `data`) fail validation.
pub const MAX_FRAGMENT_SIZE_BYTES: usize = 64 * 1024;

pub const ARTIFACT_TTL_MIN_MS: u64 = 500;
pub const ARTIFACT_TTL_MAX_MS: u64 = 10_000;

fn clamp_ttl_ms(ttl_ms: u64) -> u64 {
    ttl_ms.clamp(ARTIFACT_TTL_MIN_MS, ARTIFACT_TTL_MAX_MS)
}

/// What a pending request resolves to: the render/action payload, or a
/// bare acknowledgement (the `dispatch_widget_action` path for actions an
/// agent only acks rather than following with a frame).
#[derive(Debug, Clone)]
pub enum WidgetOutcome {
    Frame(Value),
    Acked,
}

struct PendingEntry {
    responder: oneshot::Sender<Result<WidgetOutcome, BridgeErrorCode>>,
    /// The `mode` the request asked for, if any (only `render` requests set
    /// this). A frame whose own `mode` disagrees fails validation.
    expected_mode: Option<String>,
}

/// Owns C7's two correlation tables: outstanding render/action requests
/// keyed by `request_id`, and minted artifact tokens keyed by their opaque
/// token value.
pub struct WidgetBridge {
    pending: Mutex<HashMap<String, PendingEntry>>,
    artifacts: Mutex<HashMap<String, ArtifactHandle>>,
}

impl Default for WidgetBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetBridge {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(HashMap::new()),
        }
    }

    /// Sends a `request_widget_render` command to `handle` and awaits the
    /// matching `widget_frame` (or `ack`) up to `deadline`, validating the
    /// frame payload before returning it.
    pub async fn render(
        &self,
        handle: &AgentHandle,
        request_id: RequestId,
        plugin_id: PluginId,
        instance_id: InstanceId,
        canvas: Canvas,
        mode: String,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<Value, BridgeErrorCode> {
        let payload = serde_json::json!({
            "plugin_id": plugin_id,
            "instance_id": instance_id,
            "canvas": canvas,
            "mode": mode,
        });
        self.dispatch(handle, request_id, "render", payload, Some(mode), now, deadline).await
    }

    /// Sends a `dispatch_widget_action` command and awaits the matching
    /// `widget_frame` or `ack`.
    pub async fn dispatch_action(
        &self,
        handle: &AgentHandle,
        request_id: RequestId,
        plugin_id: PluginId,
        instance_id: InstanceId,
        action: String,
        action_payload: Value,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<Value, BridgeErrorCode> {
        let payload = serde_json::json!({
            "plugin_id": plugin_id,
            "instance_id": instance_id,
            "action": action,
            "payload": action_payload,
        });
        self.dispatch(handle, request_id, "action", payload, None, now, deadline).await
    }

    async fn dispatch(
        &self,
        handle: &AgentHandle,
        request_id: RequestId,
        action: &str,
        payload: Value,
        expected_mode: Option<String>,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<Value, BridgeErrorCode> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .insert(request_id.as_str().to_string(), PendingEntry { responder: tx, expected_mode });

        let cmd = ProtocolMessage::widget_command(handle.label.clone(), now, action, request_id.as_str().to_string(), payload);
        let sent = handle.send(&cmd, now).await;
        if !sent.ok {
            self.pending.lock().remove(request_id.as_str());
            return Err(BridgeErrorCode::PolicyViolation);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(WidgetOutcome::Frame(data)))) => Ok(data),
            Ok(Ok(Ok(WidgetOutcome::Acked))) => Ok(Value::Null),
            Ok(Ok(Err(code))) => Err(code),
            Ok(Err(_)) => Err(BridgeErrorCode::RenderTimeout),
            Err(_) => {
                self.pending.lock().remove(request_id.as_str());
                Err(BridgeErrorCode::RenderTimeout)
            }
        }
    }

    /// Called by the router (C4) when a `widget_frame` is drained. Validates
    /// the frame shape before resolving the waiter; an invalid frame
    /// resolves the waiter with `render_validation_failed` instead of the
    /// raw payload.
    pub fn resolve_frame(&self, request_id: &str, data: Value) {
        let Some(entry) = self.pending.lock().remove(request_id) else {
            return;
        };
        let result = match validate_frame(&data, entry.expected_mode.as_deref()) {
            Ok(()) => Ok(WidgetOutcome::Frame(data)),
            Err(code) => Err(code),
        };
        let _ = entry.responder.send(result);
    }

    /// Called by the router when an `ack` carrying a `request_id` is
    /// drained. Returns whether a pending widget request was actually
    /// resolved (vs. an unrelated ack).
    pub fn resolve_ack(&self, request_id: &str) -> bool {
        let Some(entry) = self.pending.lock().remove(request_id) else {
            return false;
        };
        let _ = entry.responder.send(Ok(WidgetOutcome::Acked));
        true
    }

    /// Evicts and rejects every pending request past its deadline. The
    /// `dispatch`/`render` callers already race their own `tokio::time`
    /// timeout, so this is only a backstop against entries whose caller
    /// task was itself dropped without draining the channel.
    pub fn sweep_expired(&self) {
        self.pending.lock().retain(|_, entry| !entry.responder.is_closed());
    }

    /// Registers an artifact an agent offered via a `status` envelope's
    /// `artifact_offer` field (`{artifact_ref, ttl_ms}`), minting a fresh
    /// token. Malformed offers are ignored.
    pub fn offer_artifact(&self, label: mimolo_core::AgentLabel, offer: Value, now: DateTime<Utc>) {
        let _ = label;
        let Some(artifact_ref) = offer.get("artifact_ref").and_then(Value::as_str) else {
            return;
        };
        let ttl_ms = offer.get("ttl_ms").and_then(Value::as_u64).unwrap_or(ARTIFACT_TTL_MIN_MS);
        let plugin_id = offer
            .get("plugin_id")
            .and_then(Value::as_str)
            .map(PluginId::new)
            .unwrap_or_else(|| PluginId::new("unknown"));
        let instance_id = offer
            .get("instance_id")
            .and_then(Value::as_str)
            .map(InstanceId::new)
            .unwrap_or_else(|| InstanceId::new("unknown"));
        self.issue_artifact_token(plugin_id, instance_id, artifact_ref.to_string(), ttl_ms, now, &mimolo_core::UuidIdGen);
    }

    pub fn issue_artifact_token(
        &self,
        plugin_id: PluginId,
        instance_id: InstanceId,
        artifact_ref: String,
        ttl_ms: u64,
        now: DateTime<Utc>,
        id_gen: &impl IdGen,
    ) -> ArtifactToken {
        let token = ArtifactToken::new(id_gen.next());
        let handle = ArtifactHandle {
            token: token.clone(),
            plugin_id,
            instance_id,
            artifact_ref,
            expires_at: now + chrono::Duration::milliseconds(clamp_ttl_ms(ttl_ms) as i64),
        };
        self.artifacts.lock().insert(token.as_str().to_string(), handle);
        token
    }

    /// Resolves a token to its `ArtifactHandle` if present and not expired,
    /// evicting it from the table either way (single-use: Control fetches
    /// once through Operations, never holds a standing handle).
    pub fn resolve_artifact(&self, token: &ArtifactToken, now: DateTime<Utc>) -> Option<ArtifactHandle> {
        let mut artifacts = self.artifacts.lock();
        let handle = artifacts.remove(token.as_str())?;
        if handle.is_expired(now) {
            None
        } else {
            Some(handle)
        }
    }

    pub fn sweep_expired_artifacts(&self, now: DateTime<Utc>) {
        self.artifacts.lock().retain(|_, handle| !handle.is_expired(now));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Validates a `widget_frame`'s payload per §4.7: rejects it outright if
/// its serialized size exceeds [`MAX_FRAGMENT_SIZE_BYTES`], requires every
/// `src` reference (whether a literal JSON `src` key or an HTML `src=`
/// attribute embedded in a string value) to already be a
/// `mimolo://artifact/<token>` URI, and — when the original request named a
/// `mode` — requires the frame's own `mode`, if present, to agree with it.
fn validate_frame(data: &Value, expected_mode: Option<&str>) -> Result<(), BridgeErrorCode> {
    let size = serde_json::to_vec(data).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > MAX_FRAGMENT_SIZE_BYTES {
        return Err(BridgeErrorCode::RenderPayloadTooLarge);
    }
    if !validate_mode(data, expected_mode) {
        return Err(BridgeErrorCode::RenderValidationFailed);
    }
    if !validate_src_fields(data) {
        return Err(BridgeErrorCode::RenderValidationFailed);
    }
    Ok(())
}

fn validate_mode(data: &Value, expected_mode: Option<&str>) -> bool {
    match data.get("mode") {
        None => true,
        Some(Value::String(mode)) => expected_mode.map_or(true, |expected| mode == expected),
        Some(_) => false,
    }
}

/// Recursively walks `data`. A string under a key literally named `src`
/// must already be a `mimolo://artifact/<token>` URI; any other string is
/// scanned for embedded HTML `src="..."`/`src='...'` attributes (a rendered
/// fragment smuggling a raw path inside `html` rather than a bare JSON
/// field), each of which is held to the same rule.
fn validate_src_fields(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().all(|(key, v)| {
            if key == "src" {
                v.as_str().map(mimolo_core::is_artifact_uri).unwrap_or(false)
            } else {
                validate_src_fields(v)
            }
        }),
        Value::Array(items) => items.iter().all(validate_src_fields),
        Value::String(s) => validate_embedded_src_attrs(s),
        _ => true,
    }
}

fn validate_embedded_src_attrs(s: &str) -> bool {
    SRC_ATTR.captures_iter(s).all(|caps| {
        let src = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        mimolo_core::is_artifact_uri(src)
    })
}

#[cfg(test)]
#[path = "widget_bridge_tests.rs"]
mod tests;
