// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Process Manager (C3): the lifecycle state machine layered over
//! [`mimolo_adapters::AgentHandle`]. This module owns every live handle
//! exclusively; other components address an agent only by its
//! [`AgentLabel`] and read a [`AgentSnapshot`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mimolo_adapters::{AgentHandle, SpawnError};
use mimolo_core::{AgentConfig, AgentLabel, Clock, LifecycleState, TrustRoots};
use mimolo_protocol::ProtocolMessage;
use thiserror::Error;
use tracing::{info, warn};

/// Default window to wait for a `handshake` after spawn before declaring
/// `handshake_timeout`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace period for the stop/flush/shutdown sequence before a
/// force-kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Default window to wait for each individual phase's ack before the next
/// phase in the stop/flush/shutdown sequence proceeds without it.
pub const DEFAULT_PHASE_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// The stop/flush/shutdown sequence, in order. An agent's `stop_phase`
/// indexes into this array.
const STOP_PHASES: [&str; 3] = ["stop", "flush", "shutdown"];

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("agent label already running: {0}")]
    AlreadyRunning(AgentLabel),
    #[error("no such agent: {0}")]
    UnknownAgent(AgentLabel),
    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
}

/// Point-in-time view of one managed agent, safe to hand to C8/C9 without
/// exposing the handle itself.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub label: AgentLabel,
    pub lifecycle_state: LifecycleState,
    pub detail: Option<String>,
    pub agent_id: Option<String>,
    pub protocol_version: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_summary_at: Option<DateTime<Utc>>,
}

struct ManagedAgent {
    config: AgentConfig,
    handle: Option<Arc<AgentHandle>>,
    state: LifecycleState,
    detail: Option<String>,
    agent_id: Option<String>,
    protocol_version: Option<String>,
    started_at: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    last_summary_at: Option<DateTime<Utc>>,
    starting_deadline: Option<DateTime<Utc>>,
    stop_deadline: Option<DateTime<Utc>>,
    /// Index into [`STOP_PHASES`] of the phase currently awaiting its ack.
    stop_phase: usize,
    phase_acked: bool,
    phase_deadline: Option<DateTime<Utc>>,
}

impl ManagedAgent {
    fn new(config: AgentConfig) -> Self {
        Self {
            config,
            handle: None,
            state: LifecycleState::Inactive,
            detail: None,
            agent_id: None,
            protocol_version: None,
            started_at: None,
            last_heartbeat_at: None,
            last_summary_at: None,
            starting_deadline: None,
            stop_deadline: None,
            stop_phase: 0,
            phase_acked: false,
            phase_deadline: None,
        }
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            label: self.config.label.clone(),
            lifecycle_state: self.state,
            detail: self.detail.clone(),
            agent_id: self.agent_id.clone(),
            protocol_version: self.protocol_version.clone(),
            started_at: self.started_at,
            last_heartbeat_at: self.last_heartbeat_at,
            last_summary_at: self.last_summary_at,
        }
    }
}

/// Owns every live [`AgentHandle`] and the lifecycle state machine driving
/// it. Exclusively mutated from the runtime tick thread.
pub struct AgentProcessManager {
    agents: HashMap<AgentLabel, ManagedAgent>,
    trust_roots: TrustRoots,
    stderr_log_dir: std::path::PathBuf,
    clock: Arc<dyn Clock>,
    handshake_timeout: Duration,
    stop_grace: Duration,
    phase_ack_timeout: Duration,
}

impl AgentProcessManager {
    pub fn new(trust_roots: TrustRoots, stderr_log_dir: std::path::PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            agents: HashMap::new(),
            trust_roots,
            stderr_log_dir,
            clock,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            phase_ack_timeout: DEFAULT_PHASE_ACK_TIMEOUT,
        }
    }

    /// Overrides the handshake window, e.g. for tests exercising
    /// `handshake_timeout` without a multi-second wait.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Overrides the stop/flush/shutdown grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Overrides the per-phase ack timeout within the stop/flush/shutdown
    /// sequence, e.g. for tests exercising phase advancement without a
    /// multi-second wait.
    pub fn with_phase_ack_timeout(mut self, timeout: Duration) -> Self {
        self.phase_ack_timeout = timeout;
        self
    }

    /// Registers `config` without spawning. Call [`Self::start`] to bring
    /// it up; `start_enabled` configs are started explicitly by the caller
    /// at startup, not implicitly here.
    pub fn register(&mut self, config: AgentConfig) {
        self.agents.insert(config.label.clone(), ManagedAgent::new(config));
    }

    pub fn remove(&mut self, label: &AgentLabel) -> Option<AgentConfig> {
        self.agents.remove(label).map(|a| a.config)
    }

    pub fn contains(&self, label: &AgentLabel) -> bool {
        self.agents.contains_key(label)
    }

    pub fn config(&self, label: &AgentLabel) -> Option<&AgentConfig> {
        self.agents.get(label).map(|a| &a.config)
    }

    pub fn snapshot(&self, label: &AgentLabel) -> Option<AgentSnapshot> {
        self.agents.get(label).map(|a| a.snapshot())
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents.values().map(|a| a.snapshot()).collect()
    }

    pub fn labels(&self) -> Vec<AgentLabel> {
        self.agents.keys().cloned().collect()
    }

    /// Resolves a `(plugin_id, instance_id)` pair — the addressing scheme
    /// Control's widget commands use — to the `AgentLabel` C3 keys its
    /// handles by.
    pub fn find_by_instance(
        &self,
        plugin_id: &mimolo_core::PluginId,
        instance_id: &mimolo_core::InstanceId,
    ) -> Option<AgentLabel> {
        self.agents
            .values()
            .find(|a| &a.config.plugin_id == plugin_id && &a.config.instance_id == instance_id)
            .map(|a| a.config.label.clone())
    }

    pub fn handle(&self, label: &AgentLabel) -> Option<&AgentHandle> {
        self.agents.get(label).and_then(|a| a.handle.as_deref())
    }

    /// Clones the `Arc` behind a live handle, for callers (the command
    /// bridge's widget-render path) that must await on it without holding
    /// whatever lock guards this manager.
    pub fn handle_arc(&self, label: &AgentLabel) -> Option<Arc<AgentHandle>> {
        self.agents.get(label).and_then(|a| a.handle.clone())
    }

    pub fn all_handles(&self) -> impl Iterator<Item = (&AgentLabel, &AgentHandle)> {
        self.agents.iter().filter_map(|(label, a)| a.handle.as_deref().map(|h| (label, h)))
    }

    /// `inactive | error → starting`: validates trust, spawns the child,
    /// starts the handshake timer.
    pub async fn start(&mut self, label: &AgentLabel) -> Result<(), ManagerError> {
        let agent = self.agents.get_mut(label).ok_or_else(|| ManagerError::UnknownAgent(label.clone()))?;
        if matches!(agent.state, LifecycleState::Starting | LifecycleState::Running | LifecycleState::ShuttingDown) {
            return Err(ManagerError::AlreadyRunning(label.clone()));
        }

        let now = self.clock.now();
        let stderr_path = self.stderr_log_dir.join(format!("{}.stderr.log", label.as_str()));
        let handle = AgentHandle::spawn(&agent.config, &self.trust_roots, stderr_path, self.clock.clone()).await?;

        agent.started_at = Some(now);
        agent.handle = Some(Arc::new(handle));
        agent.state = LifecycleState::Starting;
        agent.detail = None;
        agent.agent_id = None;
        agent.protocol_version = None;
        agent.starting_deadline = Some(now + chrono::Duration::from_std(self.handshake_timeout).unwrap_or_default());
        info!(label = %label, "agent starting");
        Ok(())
    }

    /// `running → shutting-down`: issues the first phase (`stop`) of the
    /// stop/flush/shutdown sequence and starts both the overall grace timer
    /// and that phase's own ack timeout. [`Self::tick`] advances through
    /// `flush` and `shutdown` as each phase acks or its individual
    /// [`Self::phase_ack_timeout`] elapses, and force-kills at the overall
    /// `stop_deadline` regardless of how far the sequence got.
    pub async fn begin_stop(&mut self, label: &AgentLabel) -> Result<(), ManagerError> {
        let now = self.clock.now();
        let agent = self.agents.get_mut(label).ok_or_else(|| ManagerError::UnknownAgent(label.clone()))?;
        if agent.state != LifecycleState::Running {
            return Err(ManagerError::UnknownAgent(label.clone()));
        }
        let Some(handle) = &agent.handle else {
            return Err(ManagerError::UnknownAgent(label.clone()));
        };

        let cmd = ProtocolMessage::lifecycle_command(label.clone(), now, STOP_PHASES[0]);
        handle.send(&cmd, now).await;

        agent.state = LifecycleState::ShuttingDown;
        agent.stop_phase = 0;
        agent.phase_acked = false;
        agent.phase_deadline = Some(now + chrono::Duration::from_std(self.phase_ack_timeout).unwrap_or_default());
        agent.stop_deadline = Some(now + chrono::Duration::from_std(self.stop_grace).unwrap_or_default());
        Ok(())
    }

    /// Applies one drained protocol message to the owning agent's
    /// lifecycle state. Called by the router (C4) after it has already
    /// dispatched the message for journaling/segment purposes.
    pub fn apply_message(&mut self, label: &AgentLabel, msg: &ProtocolMessage, now: DateTime<Utc>) {
        let Some(agent) = self.agents.get_mut(label) else {
            return;
        };

        match msg {
            ProtocolMessage::Handshake(env) => {
                if agent.state == LifecycleState::Starting {
                    agent.agent_id = env.agent_id.clone();
                    agent.protocol_version = Some(env.protocol_version.clone());
                    agent.state = LifecycleState::Running;
                    agent.starting_deadline = None;
                    agent.last_heartbeat_at = Some(now);
                    info!(label = %label, "agent running");
                }
            }
            ProtocolMessage::Heartbeat(_) => {
                agent.last_heartbeat_at = Some(now);
                if agent.detail.as_deref() == Some("degraded_heartbeat") {
                    agent.detail = None;
                }
            }
            ProtocolMessage::Summary(_) => {
                agent.last_summary_at = Some(now);
            }
            ProtocolMessage::Ack(env) => {
                if agent.state == LifecycleState::ShuttingDown {
                    if let Some(ack_command) = &env.ack_command {
                        if ack_command.as_str() == STOP_PHASES[agent.stop_phase] {
                            agent.phase_acked = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Updates the free-text `status` detail shown in the snapshot. Returns
    /// whether the detail actually changed, so the router can decide
    /// whether this is a health transition worth journaling (C4).
    pub fn update_status_detail(&mut self, label: &AgentLabel, detail: Option<String>) -> bool {
        let Some(agent) = self.agents.get_mut(label) else {
            return false;
        };
        if agent.detail == detail {
            return false;
        }
        agent.detail = detail;
        true
    }

    /// Labels currently in a live lifecycle state (`starting`, `running`, or
    /// `shutting-down`). Used by the shutdown orchestrator (C10) to decide
    /// what needs stopping.
    pub fn live_labels(&self) -> Vec<AgentLabel> {
        self.agents
            .iter()
            .filter(|(_, a)| a.state.is_live())
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn lifecycle_state(&self, label: &AgentLabel) -> Option<LifecycleState> {
        self.agents.get(label).map(|a| a.state)
    }

    /// Unconditionally kills every still-live agent without waiting for
    /// acks, for use after the shutdown orchestrator's overall grace period
    /// has elapsed. Returns the labels force-killed.
    pub async fn force_kill_all_live(&mut self) -> Vec<AgentLabel> {
        let mut killed = Vec::new();
        let labels: Vec<AgentLabel> = self.agents.keys().cloned().collect();
        for label in labels {
            let Some(agent) = self.agents.get_mut(&label) else { continue };
            if !agent.state.is_live() {
                continue;
            }
            if let Some(handle) = agent.handle.take() {
                handle.shutdown(Duration::from_millis(0)).await;
            }
            agent.state = LifecycleState::Inactive;
            agent.detail = Some("force_killed".to_string());
            agent.stop_deadline = None;
            agent.phase_deadline = None;
            killed.push(label);
        }
        killed
    }

    /// Explicit restart: only valid from `error`. Clears the error state
    /// and re-enters `starting` via [`Self::start`].
    pub async fn restart(&mut self, label: &AgentLabel) -> Result<(), ManagerError> {
        {
            let agent = self.agents.get_mut(label).ok_or_else(|| ManagerError::UnknownAgent(label.clone()))?;
            if agent.state != LifecycleState::Error && agent.state != LifecycleState::Inactive {
                return Err(ManagerError::AlreadyRunning(label.clone()));
            }
            agent.state = LifecycleState::Inactive;
            agent.detail = None;
        }
        self.start(label).await
    }

    /// Periodic liveness sweep: handshake timeouts, degraded heartbeats,
    /// unexpected child exits, and shutting-down reaps/force-kills. Returns
    /// the labels that transitioned, for the router/log to report.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<(AgentLabel, LifecycleState)> {
        let mut transitions = Vec::new();
        let labels: Vec<AgentLabel> = self.agents.keys().cloned().collect();

        for label in labels {
            let Some(agent) = self.agents.get_mut(&label) else { continue };

            match agent.state {
                LifecycleState::Starting => {
                    if let Some(deadline) = agent.starting_deadline {
                        if now >= deadline {
                            if let Some(handle) = agent.handle.take() {
                                handle.shutdown(Duration::from_millis(0)).await;
                            }
                            agent.state = LifecycleState::Error;
                            agent.detail = Some("handshake_timeout".to_string());
                            transitions.push((label.clone(), LifecycleState::Error));
                            warn!(label = %label, "agent handshake timed out");
                        }
                    }
                }
                LifecycleState::Running => {
                    if let Some(handle) = &agent.handle {
                        if handle.reader_finished() {
                            agent.state = LifecycleState::Error;
                            agent.detail = Some("reader_aborted".to_string());
                            transitions.push((label.clone(), LifecycleState::Error));
                            warn!(label = %label, "agent reader task finished unexpectedly");
                            continue;
                        }
                    }
                    if let Some(last_hb) = agent.last_heartbeat_at {
                        let threshold = chrono::Duration::seconds(2 * agent.config.heartbeat_interval_s as i64);
                        if now - last_hb > threshold && agent.detail.as_deref() != Some("degraded_heartbeat") {
                            agent.detail = Some("degraded_heartbeat".to_string());
                            warn!(label = %label, "agent heartbeat degraded");
                        }
                    }
                }
                LifecycleState::ShuttingDown => {
                    let reaped = if let Some(handle) = &agent.handle {
                        handle.reader_finished()
                    } else {
                        true
                    };
                    let overall_expired = agent.stop_deadline.map(|d| now >= d).unwrap_or(false);

                    if reaped {
                        if let Some(handle) = agent.handle.take() {
                            handle.shutdown(Duration::from_millis(0)).await;
                        }
                        agent.state = LifecycleState::Inactive;
                        agent.stop_deadline = None;
                        agent.phase_deadline = None;
                        transitions.push((label.clone(), LifecycleState::Inactive));
                    } else if overall_expired {
                        if let Some(handle) = agent.handle.take() {
                            handle.shutdown(Duration::from_millis(0)).await;
                        }
                        agent.state = LifecycleState::Inactive;
                        agent.detail = Some("force_killed".to_string());
                        agent.stop_deadline = None;
                        agent.phase_deadline = None;
                        transitions.push((label.clone(), LifecycleState::Inactive));
                        warn!(label = %label, "agent force-killed at grace expiry");
                    } else {
                        let phase_expired = agent.phase_deadline.map(|d| now >= d).unwrap_or(false);
                        if agent.phase_acked || phase_expired {
                            if phase_expired && !agent.phase_acked {
                                warn!(
                                    label = %label,
                                    phase = STOP_PHASES[agent.stop_phase],
                                    "shutdown phase ack missed, proceeding to next phase"
                                );
                            }
                            if agent.stop_phase + 1 < STOP_PHASES.len() {
                                agent.stop_phase += 1;
                                agent.phase_acked = false;
                                if let Some(handle) = agent.handle.as_deref() {
                                    let cmd = ProtocolMessage::lifecycle_command(label.clone(), now, STOP_PHASES[agent.stop_phase]);
                                    handle.send(&cmd, now).await;
                                }
                                agent.phase_deadline =
                                    Some(now + chrono::Duration::from_std(self.phase_ack_timeout).unwrap_or_default());
                            } else {
                                // last phase resolved; wait for the child to exit or the
                                // overall grace period to expire.
                                agent.phase_deadline = None;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        transitions
    }
}

#[cfg(test)]
#[path = "process_manager_tests.rs"]
mod tests;
