// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command Bridge Server (C8): the local stream socket Control talks to.
//!
//! One JSON object per line, same framing discipline as Agent JLP ([`mimolo_protocol::wire`]).
//! Each accepted connection is served on its own task so one long-lived
//! Control client cannot block another's requests; commands on a single
//! connection are still handled one at a time and in order.
//!
//! Introspection commands read [`EngineState`] directly under its mutex.
//! Lifecycle and config-mutating commands are hashed through C9's
//! [`mimolo_engine::ControlActionQueue`] so they apply on the tick thread in
//! FIFO order instead of racing it. Widget commands go straight to C7,
//! which is its own independently-synchronized structure.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use mimolo_core::{Clock, IdGen, RequestId, UuidIdGen};
use mimolo_engine::{WidgetBridge, DEFAULT_RENDER_DEADLINE};
use mimolo_protocol::{BridgeErrorCode, BridgeRequest, BridgeResponse};
use serde_json::{json, Value};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::plugin_store::{self, PluginStoreError};
use crate::runtime::EngineState;

/// Binds the command-bridge socket at `path`, removing a stale socket file
/// left behind by an unclean previous exit and setting owner-only
/// permissions per §6.
pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Accepts connections until `shutdown_signal` fires, spawning one task per
/// connection. Returned future resolves once the listener stops accepting;
/// already-spawned connection tasks are left to finish their in-flight
/// request on their own.
pub async fn serve(
    listener: UnixListener,
    state: Arc<Mutex<EngineState>>,
    widget_bridge: Arc<WidgetBridge>,
    clock: Arc<dyn Clock>,
    shutdown_signal: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown_signal.notified() => {
                info!("command bridge no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let state = Arc::clone(&state);
                        let widget_bridge = Arc::clone(&widget_bridge);
                        let clock = Arc::clone(&clock);
                        tokio::spawn(async move {
                            handle_connection(stream, state, widget_bridge, clock).await;
                        });
                    }
                    Err(err) => warn!(error = %err, "command bridge accept error"),
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<Mutex<EngineState>>, widget_bridge: Arc<WidgetBridge>, clock: Arc<dyn Clock>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = tokio::io::BufReader::new(read_half);

    loop {
        let request = match mimolo_protocol::wire::read_request(&mut reader, mimolo_protocol::wire::DEFAULT_READ_TIMEOUT).await {
            Ok(request) => request,
            Err(mimolo_protocol::wire::WireError::ConnectionClosed) => break,
            Err(mimolo_protocol::wire::WireError::Timeout) => break,
            Err(err) => {
                let response = BridgeResponse {
                    ok: false,
                    cmd: "unknown".to_string(),
                    timestamp: clock.now(),
                    request_id: None,
                    data: None,
                    error: Some(BridgeErrorCode::UnknownCommand),
                };
                debug!(error = %err, "malformed command bridge request");
                if mimolo_protocol::wire::write_response(&mut write_half, &response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        debug!(cmd = request.cmd_name(), "command bridge request");
        let response = dispatch(&request, &state, &widget_bridge, clock.as_ref()).await;
        if mimolo_protocol::wire::write_response(&mut write_half, &response).await.is_err() {
            break;
        }
    }
}

async fn dispatch(request: &BridgeRequest, state: &Arc<Mutex<EngineState>>, widget_bridge: &Arc<WidgetBridge>, clock: &dyn Clock) -> BridgeResponse {
    let now = clock.now();

    if request.is_queued_action() {
        let mut guard = state.lock().await;
        if guard.shutting_down {
            return BridgeResponse::err(request, now, BridgeErrorCode::ShuttingDown);
        }
        let receiver = guard.queue.enqueue(request.clone());
        drop(guard);
        return match receiver.await {
            Ok(Ok(data)) => BridgeResponse::ok(request, now, data),
            Ok(Err(code)) => BridgeResponse::err(request, now, code),
            Err(_) => BridgeResponse::err(request, now, BridgeErrorCode::ShuttingDown),
        };
    }

    match request {
        BridgeRequest::Ping { .. } => BridgeResponse::ok(request, now, json!({"pong": true})),
        BridgeRequest::GetRegisteredPlugins { .. } => {
            let guard = state.lock().await;
            handle_list_installed(request, now, &guard.config.plugin_store_dir())
        }
        BridgeRequest::GetAgentStates { .. } => {
            let guard = state.lock().await;
            let snapshots = guard.manager.snapshots();
            BridgeResponse::ok(request, now, json!({"agents": snapshots_to_json(&snapshots)}))
        }
        BridgeRequest::GetAgentInstances { .. } => {
            let guard = state.lock().await;
            BridgeResponse::ok(request, now, json!({"agents": guard.config.agents}))
        }
        BridgeRequest::ListAgentTemplates { .. } => {
            let guard = state.lock().await;
            handle_list_installed(request, now, &guard.config.plugin_store_dir())
        }
        BridgeRequest::GetMonitorSettings { .. } => {
            let guard = state.lock().await;
            BridgeResponse::ok(request, now, json!({"monitor": guard.config.monitor}))
        }
        BridgeRequest::GetRuntimePerf { .. } => {
            let guard = state.lock().await;
            BridgeResponse::ok(request, now, perf_to_json(&guard.perf))
        }
        BridgeRequest::GetWidgetManifest { plugin_id, .. } => {
            let guard = state.lock().await;
            handle_widget_manifest(request, now, &guard.config.plugin_store_dir(), plugin_id)
        }
        BridgeRequest::RequestWidgetRender { plugin_id, instance_id, canvas, mode, .. } => {
            handle_request_widget_render(request, now, state, widget_bridge, plugin_id, instance_id, *canvas, mode.clone()).await
        }
        BridgeRequest::DispatchWidgetAction { plugin_id, instance_id, action, payload, .. } => {
            handle_dispatch_widget_action(request, now, state, widget_bridge, plugin_id, instance_id, action.clone(), payload.clone()).await
        }
        BridgeRequest::ListInstalledPlugins { .. } => {
            let guard = state.lock().await;
            handle_list_installed(request, now, &guard.config.plugin_store_dir())
        }
        BridgeRequest::InspectPluginArchive { archive_path, .. } => match plugin_store::inspect_archive(archive_path) {
            Ok(manifest) => BridgeResponse::ok(request, now, json!({"manifest": manifest})),
            Err(err) => BridgeResponse::err(request, now, plugin_store_error_to_bridge(&err)),
        },
        BridgeRequest::InstallPlugin { archive_path, .. } => {
            let guard = state.lock().await;
            match plugin_store::install(&guard.config.plugin_store_dir(), archive_path) {
                Ok(installed) => BridgeResponse::ok(request, now, json!({"installed": installed})),
                Err(err) => BridgeResponse::err(request, now, plugin_store_error_to_bridge(&err)),
            }
        }
        BridgeRequest::UpgradePlugin { archive_path, .. } => {
            let guard = state.lock().await;
            match plugin_store::upgrade(&guard.config.plugin_store_dir(), archive_path) {
                Ok(installed) => BridgeResponse::ok(request, now, json!({"installed": installed})),
                Err(err) => BridgeResponse::err(request, now, plugin_store_error_to_bridge(&err)),
            }
        }
        // Lifecycle and config-mutating variants are all handled by the
        // `is_queued_action` branch above, which returns before this match
        // is reached for any of them.
        BridgeRequest::StartAgent { .. }
        | BridgeRequest::StopAgent { .. }
        | BridgeRequest::RestartAgent { .. }
        | BridgeRequest::AddAgentInstance { .. }
        | BridgeRequest::DuplicateAgentInstance { .. }
        | BridgeRequest::RemoveAgentInstance { .. }
        | BridgeRequest::UpdateAgentInstance { .. }
        | BridgeRequest::UpdateMonitorSettings { .. } => BridgeResponse::err(request, now, BridgeErrorCode::ShuttingDown),
    }
}

fn snapshots_to_json(snapshots: &[mimolo_engine::AgentSnapshot]) -> Value {
    serde_json::to_value(
        snapshots
            .iter()
            .map(|s| {
                json!({
                    "label": s.label,
                    "lifecycle_state": s.lifecycle_state,
                    "detail": s.detail,
                    "agent_id": s.agent_id,
                    "protocol_version": s.protocol_version,
                    "started_at": s.started_at,
                    "last_heartbeat_at": s.last_heartbeat_at,
                    "last_summary_at": s.last_summary_at,
                })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or(Value::Null)
}

fn perf_to_json(perf: &mimolo_engine::PerfRecorder) -> Value {
    let samples: Vec<Value> = perf
        .samples()
        .map(|s| {
            json!({
                "at": s.at,
                "wall_clock_ms": s.wall_clock_ms,
                "stage_durations": {
                    "drain_ms": s.stage_durations.drain_ms,
                    "route_ms": s.stage_durations.route_ms,
                    "tick_work_ms": s.stage_durations.tick_work_ms,
                    "flush_ms": s.stage_durations.flush_ms,
                },
                "queue_depth_total": s.queue_depth_total,
                "dropped_total": s.dropped_total,
                "per_agent": s.per_agent.iter().map(|a| json!({
                    "label": a.label,
                    "cpu_pct": a.cpu_pct,
                    "rss_bytes": a.rss_bytes,
                    "queue_depth": a.queue_depth,
                    "dropped_total": a.dropped_total,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({"retained": perf.len(), "samples": samples})
}

fn handle_list_installed(request: &BridgeRequest, now: chrono::DateTime<Utc>, store_dir: &Path) -> BridgeResponse {
    match plugin_store::list_installed(store_dir) {
        Ok(installed) => BridgeResponse::ok(request, now, json!({"plugins": installed})),
        Err(err) => BridgeResponse::err(request, now, plugin_store_error_to_bridge(&err)),
    }
}

fn handle_widget_manifest(request: &BridgeRequest, now: chrono::DateTime<Utc>, store_dir: &Path, plugin_id: &mimolo_core::PluginId) -> BridgeResponse {
    let installed = match plugin_store::list_installed(store_dir) {
        Ok(installed) => installed,
        Err(err) => return BridgeResponse::err(request, now, plugin_store_error_to_bridge(&err)),
    };
    let Some(found) = installed.iter().filter(|p| &p.manifest.plugin_id == plugin_id).max_by(|a, b| a.manifest.version.cmp(&b.manifest.version)) else {
        return BridgeResponse::err(request, now, BridgeErrorCode::UnknownInstance { label: plugin_id.to_string() });
    };
    BridgeResponse::ok(request, now, json!({"manifest": found.manifest}))
}

async fn handle_request_widget_render(
    request: &BridgeRequest,
    now: chrono::DateTime<Utc>,
    state: &Arc<Mutex<EngineState>>,
    widget_bridge: &Arc<WidgetBridge>,
    plugin_id: &mimolo_core::PluginId,
    instance_id: &mimolo_core::InstanceId,
    canvas: mimolo_core::Canvas,
    mode: String,
) -> BridgeResponse {
    let handle = {
        let guard = state.lock().await;
        let Some(label) = guard.manager.find_by_instance(plugin_id, instance_id) else {
            return BridgeResponse::err(request, now, BridgeErrorCode::UnknownInstance { label: instance_id.to_string() });
        };
        guard.manager.handle_arc(&label)
    };
    let Some(handle) = handle else {
        return BridgeResponse::err(request, now, BridgeErrorCode::PreconditionFailed);
    };

    let request_id = RequestId::new(UuidIdGen.next());
    match widget_bridge
        .render(&handle, request_id, plugin_id.clone(), instance_id.clone(), canvas, mode, now, DEFAULT_RENDER_DEADLINE)
        .await
    {
        Ok(data) => BridgeResponse::ok(request, now, data),
        Err(code) => BridgeResponse::err(request, now, code),
    }
}

async fn handle_dispatch_widget_action(
    request: &BridgeRequest,
    now: chrono::DateTime<Utc>,
    state: &Arc<Mutex<EngineState>>,
    widget_bridge: &Arc<WidgetBridge>,
    plugin_id: &mimolo_core::PluginId,
    instance_id: &mimolo_core::InstanceId,
    action: String,
    payload: Value,
) -> BridgeResponse {
    let handle = {
        let guard = state.lock().await;
        let Some(label) = guard.manager.find_by_instance(plugin_id, instance_id) else {
            return BridgeResponse::err(request, now, BridgeErrorCode::UnknownInstance { label: instance_id.to_string() });
        };
        guard.manager.handle_arc(&label)
    };
    let Some(handle) = handle else {
        return BridgeResponse::err(request, now, BridgeErrorCode::PreconditionFailed);
    };

    let request_id = RequestId::new(UuidIdGen.next());
    match widget_bridge
        .dispatch_action(&handle, request_id, plugin_id.clone(), instance_id.clone(), action, payload, now, DEFAULT_RENDER_DEADLINE)
        .await
    {
        Ok(data) => BridgeResponse::ok(request, now, data),
        Err(code) => BridgeResponse::err(request, now, code),
    }
}

fn plugin_store_error_to_bridge(err: &PluginStoreError) -> BridgeErrorCode {
    match err {
        PluginStoreError::NotFound(_) | PluginStoreError::InvalidManifest(_) | PluginStoreError::MissingEntrypoint { .. } | PluginStoreError::BadVersion(_) => {
            BridgeErrorCode::PreconditionFailed
        }
        PluginStoreError::AlreadyInstalled { .. } | PluginStoreError::NotNewer { .. } => BridgeErrorCode::PreconditionFailed,
        PluginStoreError::Io(_) => BridgeErrorCode::PreconditionFailed,
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
