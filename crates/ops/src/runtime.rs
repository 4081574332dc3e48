// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstraps and drives the runtime tick loop: bundles C3 (process
//! manager), C4/C5/C6 (evidence router over the segment tracker and
//! sinks), C9 (control action queue) and C11 (perf telemetry) behind one
//! `EngineState`, owned by the tick thread and shared with the command
//! bridge's connection tasks behind a `tokio::sync::Mutex`.
//!
//! C7 (the widget bridge) is shared separately as its own `Arc` — it is
//! internally synchronized and never needs the tick thread's lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mimolo_core::{AgentConfig, AgentLabel, Clock, IdGen, UuidIdGen};
use mimolo_engine::{
    force_close_segment, shutdown_runtime, AgentProcessManager, AgentSampleInput, EvidenceRouter, ManagerError,
    OutOfOrderPolicy, PerfRecorder, ProcessSampler, SegmentTracker, ShutdownOutcome, StageDurations, WidgetBridge,
    DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_GRACE_TOTAL,
};
use mimolo_protocol::{BridgeErrorCode, BridgeRequest};
use mimolo_storage::{Journal, OrchestratorLog, OrchestratorLogError};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::config::RuntimeConfig;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("io error during bootstrap: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open orchestrator log: {0}")]
    OrchestratorLog(#[from] OrchestratorLogError),
}

/// Everything the tick thread owns and every command-bridge handler that
/// mutates runtime state needs exclusive access to.
pub struct EngineState {
    pub manager: AgentProcessManager,
    pub router: EvidenceRouter<UuidIdGen>,
    pub queue: mimolo_engine::ControlActionQueue,
    pub perf: PerfRecorder,
    pub sampler: ProcessSampler,
    pub config: RuntimeConfig,
    pub config_path: PathBuf,
    pub shutting_down: bool,
}

/// Creates every sink and the process manager from `config`, registers its
/// configured agents, and starts the ones marked `start_enabled`. A single
/// agent failing to start is logged and skipped rather than failing the
/// whole bootstrap — one bad plugin must not keep the runtime from coming
/// up for the rest.
pub async fn bootstrap(config: RuntimeConfig, config_path: PathBuf, clock: Arc<dyn Clock>) -> Result<EngineState, RuntimeError> {
    std::fs::create_dir_all(config.stderr_log_dir())?;
    std::fs::create_dir_all(config.plugin_store_dir())?;
    std::fs::create_dir_all(config.journal_dir())?;
    std::fs::create_dir_all(config.cache_dir())?;

    let mut manager = AgentProcessManager::new(config.trust_roots(), config.stderr_log_dir(), Arc::clone(&clock));
    for agent in &config.agents {
        manager.register(agent.clone());
    }

    let journal = Journal::new(config.journal_dir());
    let orchestrator_log_path = config
        .ops_log_path
        .clone()
        .unwrap_or_else(|| config.data_dir.join("operations/logs/orchestrator.log"));
    let orchestrator_log = OrchestratorLog::open(orchestrator_log_path)?;
    let segment_cache_path = config.cache_dir().join("current_segment.json");
    let segment_tracker = SegmentTracker::new(config.monitor.cooldown_seconds, OutOfOrderPolicy::default(), UuidIdGen);
    let router = EvidenceRouter::new(segment_tracker, journal, orchestrator_log, segment_cache_path, config.monitor.console_verbosity);

    let mut state = EngineState {
        manager,
        router,
        queue: mimolo_engine::ControlActionQueue::new(),
        perf: PerfRecorder::default(),
        sampler: ProcessSampler::new(),
        config,
        config_path,
        shutting_down: false,
    };

    let to_start: Vec<AgentLabel> = state.config.agents.iter().filter(|a| a.start_enabled).map(|a| a.label.clone()).collect();
    for label in to_start {
        if let Err(err) = state.manager.start(&label).await {
            warn!(label = %label, error = %err, "failed to start agent at bootstrap");
        }
    }

    Ok(state)
}

/// The runtime tick loop: polls the process manager, routes drained
/// evidence, drains the control queue, sweeps widget/artifact deadlines,
/// and records one perf sample, then sleeps for `monitor.poll_tick_s`
/// (re-read each iteration so `update_monitor_settings` takes effect
/// without a restart).
pub async fn run(state: Arc<Mutex<EngineState>>, widget_bridge: Arc<WidgetBridge>, clock: Arc<dyn Clock>, shutdown_signal: Arc<Notify>) {
    loop {
        let poll = {
            let guard = state.lock().await;
            Duration::from_secs_f64(guard.config.monitor.poll_tick_s.max(0.01))
        };

        tokio::select! {
            _ = shutdown_signal.notified() => break,
            _ = tokio::time::sleep(poll) => {}
        }

        let mut guard = state.lock().await;
        if guard.shutting_down {
            break;
        }
        run_one_tick(&mut guard, &widget_bridge, clock.as_ref()).await;
    }
}

async fn run_one_tick(state: &mut EngineState, widget_bridge: &WidgetBridge, clock: &dyn Clock) {
    let now = clock.now();
    let tick_start = Instant::now();

    let drain_start = Instant::now();
    state.manager.tick(now).await;
    let drain_ms = drain_start.elapsed().as_secs_f64() * 1000.0;

    let route_start = Instant::now();
    state.router.tick(&mut state.manager, widget_bridge, now);
    let route_ms = route_start.elapsed().as_secs_f64() * 1000.0;

    let tick_work_start = Instant::now();
    drain_control_queue(state).await;
    let tick_work_ms = tick_work_start.elapsed().as_secs_f64() * 1000.0;

    let flush_start = Instant::now();
    widget_bridge.sweep_expired();
    widget_bridge.sweep_expired_artifacts(now);
    let flush_ms = flush_start.elapsed().as_secs_f64() * 1000.0;

    state.sampler.refresh();
    let mut inputs = Vec::new();
    for (label, handle) in state.manager.all_handles() {
        let (cpu_pct, rss_bytes) = state.sampler.sample(handle.process_id);
        inputs.push(AgentSampleInput {
            label: label.clone(),
            handle_metrics: handle.metrics(cpu_pct, rss_bytes),
        });
    }

    let stage = StageDurations { drain_ms, route_ms, tick_work_ms, flush_ms };
    state.perf.record(now, tick_start.elapsed(), stage, inputs);
}

async fn drain_control_queue(state: &mut EngineState) {
    let config_path = state.config_path.clone();
    while let Some((request, responder)) = state.queue.pop_next() {
        let result = apply_queued_action(state, &config_path, request).await;
        let _ = responder.send(result);
    }
}

fn manager_error_to_bridge(err: ManagerError) -> BridgeErrorCode {
    match err {
        ManagerError::AlreadyRunning(_) => BridgeErrorCode::PreconditionFailed,
        ManagerError::UnknownAgent(label) => BridgeErrorCode::UnknownInstance { label: label.to_string() },
        ManagerError::Spawn(mimolo_adapters::SpawnError::ExecutableNotTrusted(_)) => BridgeErrorCode::PolicyViolation,
        ManagerError::Spawn(mimolo_adapters::SpawnError::SpawnFailed(_)) => BridgeErrorCode::PreconditionFailed,
    }
}

async fn apply_queued_action(state: &mut EngineState, config_path: &Path, request: BridgeRequest) -> Result<Value, BridgeErrorCode> {
    match request {
        BridgeRequest::StartAgent { label, .. } => state
            .manager
            .start(&label)
            .await
            .map(|_| json!({"label": label}))
            .map_err(manager_error_to_bridge),
        BridgeRequest::StopAgent { label, .. } => state
            .manager
            .begin_stop(&label)
            .await
            .map(|_| json!({"label": label}))
            .map_err(manager_error_to_bridge),
        BridgeRequest::RestartAgent { label, .. } => state
            .manager
            .restart(&label)
            .await
            .map(|_| json!({"label": label}))
            .map_err(manager_error_to_bridge),
        BridgeRequest::AddAgentInstance { config, .. } => add_agent_instance(state, config_path, config).await,
        BridgeRequest::DuplicateAgentInstance { label, new_label, .. } => {
            duplicate_agent_instance(state, config_path, label, new_label).await
        }
        BridgeRequest::RemoveAgentInstance { label, .. } => remove_agent_instance(state, config_path, label).await,
        BridgeRequest::UpdateAgentInstance { label, patch, .. } => update_agent_instance(state, config_path, label, patch).await,
        BridgeRequest::UpdateMonitorSettings { settings, .. } => update_monitor_settings(state, config_path, settings),
        _ => Err(BridgeErrorCode::NotImplementedYet),
    }
}

async fn add_agent_instance(state: &mut EngineState, config_path: &Path, config: AgentConfig) -> Result<Value, BridgeErrorCode> {
    if state.manager.contains(&config.label) {
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    state.config.agents.push(config.clone());
    if state.config.persist(config_path).is_err() {
        state.config.agents.pop();
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    let start_enabled = config.start_enabled;
    let label = config.label.clone();
    state.manager.register(config);
    if start_enabled {
        if let Err(err) = state.manager.start(&label).await {
            warn!(label = %label, error = %err, "failed to auto-start newly added agent instance");
        }
    }

    Ok(json!({"label": label}))
}

async fn duplicate_agent_instance(
    state: &mut EngineState,
    config_path: &Path,
    label: AgentLabel,
    new_label: AgentLabel,
) -> Result<Value, BridgeErrorCode> {
    let Some(source) = state.manager.config(&label).cloned() else {
        return Err(BridgeErrorCode::UnknownInstance { label: label.to_string() });
    };
    if state.manager.contains(&new_label) {
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    let mut duplicate = source;
    let instance_suffix = new_label.as_str().to_string();
    duplicate.label = new_label;
    duplicate.instance_id = mimolo_core::InstanceId::new(format!("{}-copy-{instance_suffix}", duplicate.instance_id.as_str()));

    add_agent_instance(state, config_path, duplicate).await
}

async fn remove_agent_instance(state: &mut EngineState, config_path: &Path, label: AgentLabel) -> Result<Value, BridgeErrorCode> {
    if !state.manager.contains(&label) {
        return Err(BridgeErrorCode::UnknownInstance { label: label.to_string() });
    }

    if state.manager.lifecycle_state(&label).map(|s| s.is_live()).unwrap_or(false) {
        let _ = state.manager.begin_stop(&label).await;
    }

    let previous = state.config.agents.clone();
    state.config.agents.retain(|a| a.label != label);
    if state.config.persist(config_path).is_err() {
        state.config.agents = previous;
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    state.manager.remove(&label);
    Ok(json!({"label": label}))
}

async fn update_agent_instance(
    state: &mut EngineState,
    config_path: &Path,
    label: AgentLabel,
    patch: Value,
) -> Result<Value, BridgeErrorCode> {
    let Some(position) = state.config.agents.iter().position(|a| a.label == label) else {
        return Err(BridgeErrorCode::UnknownInstance { label: label.to_string() });
    };
    let Some(patch_obj) = patch.as_object() else {
        return Err(BridgeErrorCode::PreconditionFailed);
    };

    let Ok(mut merged) = serde_json::to_value(&state.config.agents[position]) else {
        return Err(BridgeErrorCode::PreconditionFailed);
    };
    let Some(merged_obj) = merged.as_object_mut() else {
        return Err(BridgeErrorCode::PreconditionFailed);
    };
    for (key, value) in patch_obj {
        merged_obj.insert(key.clone(), value.clone());
    }
    let Ok(updated) = serde_json::from_value::<AgentConfig>(merged) else {
        return Err(BridgeErrorCode::PreconditionFailed);
    };
    if updated.label != label {
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    let previous = state.config.agents[position].clone();
    state.config.agents[position] = updated.clone();
    if state.config.persist(config_path).is_err() {
        state.config.agents[position] = previous;
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    let was_live = state.manager.lifecycle_state(&label).map(|s| s.is_live()).unwrap_or(false);
    state.manager.remove(&label);
    state.manager.register(updated);
    if was_live {
        if let Err(err) = state.manager.start(&label).await {
            warn!(label = %label, error = %err, "failed to restart agent after update_agent_instance");
        }
    }

    Ok(json!({"label": label}))
}

fn update_monitor_settings(state: &mut EngineState, config_path: &Path, settings: Value) -> Result<Value, BridgeErrorCode> {
    let Some(obj) = settings.as_object() else {
        return Err(BridgeErrorCode::PolicyViolation);
    };
    for key in obj.keys() {
        if !mimolo_core::MonitorSettings::is_allowed_key(key) {
            return Err(BridgeErrorCode::PolicyViolation);
        }
    }

    let mut candidate = state.config.monitor;
    if let Some(v) = obj.get("poll_tick_s").and_then(Value::as_f64) {
        candidate.poll_tick_s = v;
    }
    if let Some(v) = obj.get("cooldown_seconds").and_then(Value::as_i64) {
        candidate.cooldown_seconds = v;
    }
    if let Some(v) = obj.get("console_verbosity").and_then(Value::as_str) {
        candidate.console_verbosity = match v {
            "debug" => mimolo_core::Verbosity::Debug,
            "info" => mimolo_core::Verbosity::Info,
            "warning" => mimolo_core::Verbosity::Warning,
            "error" => mimolo_core::Verbosity::Error,
            _ => return Err(BridgeErrorCode::PolicyViolation),
        };
    }

    let previous = state.config.monitor;
    state.config.monitor = candidate;
    if state.config.persist(config_path).is_err() {
        state.config.monitor = previous;
        return Err(BridgeErrorCode::PreconditionFailed);
    }

    state.router.set_console_verbosity(candidate.console_verbosity);
    state.router.segment_tracker_mut().set_cooldown_seconds(candidate.cooldown_seconds);

    Ok(json!({"monitor": candidate}))
}

/// C10: marks the runtime `shutting_down`, rejects anything still queued,
/// runs the stop/flush/shutdown sequence to completion (or grace expiry),
/// drains one final round of trailing acks/summaries, force-closes any
/// open segment, and leaves `orchestrator.shutdown_initiated` /
/// `orchestrator.shutdown_complete` breadcrumbs in the journal and
/// orchestrator log.
pub async fn graceful_shutdown(state: &Arc<Mutex<EngineState>>, widget_bridge: &WidgetBridge, clock: &dyn Clock) -> ShutdownOutcome {
    let mut guard = state.lock().await;
    guard.shutting_down = true;
    guard.queue.reject_all(BridgeErrorCode::ShuttingDown);

    let started_at = clock.now();
    let live_count = guard.manager.live_labels().len();
    guard.router.append_lifecycle(started_at, "orchestrator.shutdown_initiated", json!({"live_agents": live_count}));
    guard.router.write_orchestrator_lifecycle(started_at, format!("shutdown initiated ({live_count} live agents)"));

    let outcome = shutdown_runtime(&mut guard.manager, clock, DEFAULT_SHUTDOWN_GRACE_TOTAL, DEFAULT_POLL_INTERVAL).await;

    // One final drain to pick up any trailing acks/summaries that arrived
    // during the wait, before the segment and sinks are torn down.
    let drain_now = clock.now();
    let st = &mut *guard;
    st.router.tick(&mut st.manager, widget_bridge, drain_now);

    if let Some(seg_outcome) = force_close_segment(guard.router.segment_tracker_mut(), drain_now) {
        guard.router.ingest_tracker_outcome(seg_outcome);
    }

    let complete_at = clock.now();
    guard.router.append_lifecycle(
        complete_at,
        "orchestrator.shutdown_complete",
        json!({
            "initiated": outcome.initiated_labels.len(),
            "forced": outcome.forced_labels.len(),
            "closed_open_segment": outcome.closed_open_segment,
        }),
    );
    guard.router.write_orchestrator_lifecycle(
        complete_at,
        format!("shutdown complete: {} initiated, {} forced", outcome.initiated_labels.len(), outcome.forced_labels.len()),
    );

    info!(forced = outcome.forced_labels.len(), "shutdown sequence complete");
    outcome
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
