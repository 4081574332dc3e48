// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence Router (C4): drains every agent's inbound queue each tick and
//! classifies each message to its destination — the segment tracker (C5),
//! the journal (C6), the orchestrator log (C6), or the widget bridge (C7).
//! This is the only place that reads a raw [`ProtocolMessage`] after it
//! leaves an [`mimolo_adapters::AgentHandle`]'s inbound queue.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mimolo_core::{AgentLabel, EvidenceRecord, IdGen, Verbosity};
use mimolo_protocol::ProtocolMessage;
use mimolo_storage::{Journal, OrchestratorLog, OrchestratorRecord};
use serde_json::Value;

use crate::process_manager::AgentProcessManager;
use crate::segment_tracker::{SegmentTracker, TrackerOutcome};
use crate::widget_bridge::WidgetBridge;

/// Upper bound on how many queued messages one agent's handle contributes
/// per tick, so one noisy agent cannot starve the others.
pub const DEFAULT_MAX_MESSAGES_PER_AGENT_PER_TICK: usize = 64;

/// Tallies produced by one [`EvidenceRouter::tick`] call, folded into the
/// perf sample (C11).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOutcome {
    pub messages_processed: u64,
    pub journaled: u64,
    pub logs_emitted: u64,
    pub widget_frames_routed: u64,
    pub acks_routed: u64,
}

fn parse_verbosity(level: Option<&str>) -> Verbosity {
    match level {
        Some("debug") => Verbosity::Debug,
        Some("warning") | Some("warn") => Verbosity::Warning,
        Some("error") => Verbosity::Error,
        _ => Verbosity::Info,
    }
}

/// Owns the C4/C5/C6 evidence pipeline. The widget bridge (C7) is shared
/// with the command-bridge server's async tasks and so is passed in by
/// reference rather than owned here.
pub struct EvidenceRouter<I: IdGen> {
    segment_tracker: SegmentTracker<I>,
    journal: Journal,
    orchestrator_log: OrchestratorLog,
    segment_cache_path: PathBuf,
    console_verbosity: Verbosity,
    max_messages_per_tick: usize,
}

impl<I: IdGen> EvidenceRouter<I> {
    pub fn new(
        segment_tracker: SegmentTracker<I>,
        journal: Journal,
        orchestrator_log: OrchestratorLog,
        segment_cache_path: PathBuf,
        console_verbosity: Verbosity,
    ) -> Self {
        Self {
            segment_tracker,
            journal,
            orchestrator_log,
            segment_cache_path,
            console_verbosity,
            max_messages_per_tick: DEFAULT_MAX_MESSAGES_PER_AGENT_PER_TICK,
        }
    }

    pub fn set_console_verbosity(&mut self, verbosity: Verbosity) {
        self.console_verbosity = verbosity;
    }

    pub fn segment_tracker(&self) -> &SegmentTracker<I> {
        &self.segment_tracker
    }

    pub fn segment_tracker_mut(&mut self) -> &mut SegmentTracker<I> {
        &mut self.segment_tracker
    }

    pub fn console_verbosity(&self) -> Verbosity {
        self.console_verbosity
    }

    /// Appends a runtime-sourced breadcrumb (shutdown markers, widget audit
    /// events) directly to the journal, outside the per-message routing
    /// path. Used by `mimolo-ops::runtime` for C10's lifecycle breadcrumbs.
    pub fn append_lifecycle(&mut self, timestamp: DateTime<Utc>, tag: &str, payload: Value) -> bool {
        let record = EvidenceRecord::lifecycle(timestamp, tag, payload);
        self.journal.append(&record).is_ok()
    }

    /// Writes a lifecycle line to the orchestrator log directly, bypassing
    /// the agent-`log`-envelope verbosity filter (these always pass).
    pub fn write_orchestrator_lifecycle(&mut self, timestamp: DateTime<Utc>, message: impl Into<String>) -> bool {
        let record = OrchestratorRecord::lifecycle(timestamp, message);
        self.orchestrator_log.write(&record, self.console_verbosity).is_ok()
    }

    /// Journals a [`TrackerOutcome`] produced outside the normal per-message
    /// routing path, e.g. a force-closed segment at shutdown (C10). Reuses
    /// the same journal-then-cache-rewrite sequencing as [`Self::tick`].
    pub fn ingest_tracker_outcome(&mut self, outcome: TrackerOutcome) {
        let mut discard = RouterOutcome::default();
        self.apply_segment_outcome(outcome, &mut discard);
    }

    /// Drains every agent's handle, routes each message, then runs the
    /// segment tracker's own periodic cooldown check. Call once per runtime
    /// tick after [`AgentProcessManager::tick`].
    pub fn tick(
        &mut self,
        manager: &mut AgentProcessManager,
        widget_bridge: &WidgetBridge,
        now: DateTime<Utc>,
    ) -> RouterOutcome {
        let mut outcome = RouterOutcome::default();

        let drained: Vec<(AgentLabel, Vec<ProtocolMessage>)> = manager
            .all_handles()
            .map(|(label, handle)| (label.clone(), handle.drain(self.max_messages_per_tick)))
            .collect();

        for (label, messages) in drained {
            for msg in messages {
                outcome.messages_processed += 1;
                manager.apply_message(&label, &msg, now);
                self.route_one(manager, widget_bridge, &label, msg, now, &mut outcome);
            }
        }

        let seg_outcome = self.segment_tracker.tick(now);
        self.apply_segment_outcome(seg_outcome, &mut outcome);

        outcome
    }

    fn route_one(
        &mut self,
        manager: &mut AgentProcessManager,
        widget_bridge: &WidgetBridge,
        label: &AgentLabel,
        msg: ProtocolMessage,
        now: DateTime<Utc>,
        outcome: &mut RouterOutcome,
    ) {
        match msg {
            ProtocolMessage::Handshake(_) => {}
            ProtocolMessage::Heartbeat(_) => {}
            ProtocolMessage::Command(_) => {
                // Core -> agent direction only; an agent emitting this is
                // malformed and is simply dropped rather than routed.
            }
            ProtocolMessage::Summary(env) => {
                let segment_id = self.segment_tracker.projection().active.map(|s| s.segment_id);
                let record = EvidenceRecord::summary(env.timestamp, label.clone(), segment_id, env.data.clone());
                if self.journal.append(&record).is_ok() {
                    outcome.journaled += 1;
                }

                let resets = env.activity_signal().map(|s| s.resets_cooldown()).unwrap_or(false);
                if resets {
                    let seg_outcome = self.segment_tracker.ingest_resetting_event(label.clone(), env.timestamp, now);
                    if let Some((skewed_label, original_at)) = &seg_outcome.clock_skew_warning {
                        tracing::warn!(
                            label = %skewed_label,
                            original_at = %original_at,
                            "resetting event clock skew clamped to tracker clock"
                        );
                    }
                    self.apply_segment_outcome(seg_outcome, outcome);
                }
            }
            ProtocolMessage::Status(env) => {
                if let Some(offer) = env.data.get("artifact_offer") {
                    widget_bridge.offer_artifact(label.clone(), offer.clone(), now);
                }
                let changed = manager.update_status_detail(label, env.message.clone());
                if changed {
                    let record = EvidenceRecord::status(env.timestamp, label.clone(), env.message.clone());
                    if self.journal.append(&record).is_ok() {
                        outcome.journaled += 1;
                    }
                }
            }
            ProtocolMessage::Error(env) => {
                let record = EvidenceRecord::error(env.timestamp, label.clone(), env.data.clone());
                if self.journal.append(&record).is_ok() {
                    outcome.journaled += 1;
                }
            }
            ProtocolMessage::Ack(env) => {
                if let Some(request_id) = &env.request_id {
                    if widget_bridge.resolve_ack(request_id) {
                        outcome.acks_routed += 1;
                    }
                }
                // Lifecycle stop/flush/shutdown acks are consumed by
                // `AgentProcessManager::apply_message` above; nothing left
                // to do here for those.
            }
            ProtocolMessage::Log(env) => {
                let level = parse_verbosity(env.level.as_deref());
                let record =
                    OrchestratorRecord::agent_log(env.timestamp, level, label.clone(), env.message.clone().unwrap_or_default());
                if self.orchestrator_log.write(&record, self.console_verbosity).is_ok() {
                    outcome.logs_emitted += 1;
                }
            }
            ProtocolMessage::WidgetFrame(env) => {
                if let Some(request_id) = &env.request_id {
                    widget_bridge.resolve_frame(request_id, env.data.clone());
                    outcome.widget_frames_routed += 1;
                }
            }
        }
    }

    fn apply_segment_outcome(&mut self, seg_outcome: TrackerOutcome, outcome: &mut RouterOutcome) {
        for record in seg_outcome.records {
            if self.journal.append(&record).is_ok() {
                outcome.journaled += 1;
            }
        }
        if seg_outcome.cache_write.is_some() {
            if let Err(err) = mimolo_storage::write_current_segment(&self.segment_cache_path, &self.segment_tracker.projection()) {
                tracing::warn!(error = %err, "failed to write current-segment cache");
            }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
