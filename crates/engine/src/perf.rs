// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Perf Telemetry (C11): samples one snapshot of runtime health per tick —
//! wall-clock and per-stage durations, per-agent CPU%/RSS, queue depth, and
//! dropped-message counters — and retains the last [`DEFAULT_RETENTION`]
//! samples for `get_runtime_perf`.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mimolo_adapters::HandleMetrics;
use mimolo_core::AgentLabel;
use sysinfo::{Pid, System};

/// Number of samples kept in the ring buffer.
pub const DEFAULT_RETENTION: usize = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageDurations {
    pub drain_ms: f64,
    pub route_ms: f64,
    pub tick_work_ms: f64,
    pub flush_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentPerfSample {
    pub label: AgentLabel,
    pub cpu_pct: f32,
    pub rss_bytes: u64,
    pub queue_depth: usize,
    pub dropped_total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerfSample {
    pub at: DateTime<Utc>,
    pub wall_clock_ms: f64,
    pub stage_durations: StageDurations,
    pub per_agent: Vec<AgentPerfSample>,
    pub queue_depth_total: usize,
    pub dropped_total: u64,
}

/// Queries OS-level CPU%/RSS for one process ID. A `None` process_id (no
/// handle yet, or already reaped) yields zeroed metrics rather than an
/// error — perf sampling must never fail a tick.
pub struct ProcessSampler {
    system: System,
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self { system: System::new_all() }
    }

    /// Refreshes the process table once, then reads `pid`'s CPU%/RSS.
    /// Callers sample every live agent against the same refresh to avoid
    /// re-scanning `/proc` per agent.
    pub fn refresh(&mut self) {
        self.system.refresh_all();
    }

    pub fn sample(&self, pid: Option<u32>) -> (f32, u64) {
        let Some(pid) = pid else { return (0.0, 0) };
        match self.system.process(Pid::from_u32(pid)) {
            Some(proc_) => (proc_.cpu_usage(), proc_.memory()),
            None => (0.0, 0),
        }
    }
}

/// One agent's metrics input to [`PerfRecorder::record`]: its handle
/// metrics plus the OS-level CPU%/RSS sampled separately.
pub struct AgentSampleInput {
    pub label: AgentLabel,
    pub handle_metrics: HandleMetrics,
}

/// Ring buffer of [`PerfSample`]s, capped at `retention`.
pub struct PerfRecorder {
    samples: VecDeque<PerfSample>,
    retention: usize,
}

impl Default for PerfRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl PerfRecorder {
    pub fn new(retention: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(retention),
            retention,
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>, tick_duration: Duration, stage_durations: StageDurations, inputs: Vec<AgentSampleInput>) {
        let per_agent: Vec<AgentPerfSample> = inputs
            .into_iter()
            .map(|input| AgentPerfSample {
                label: input.label,
                cpu_pct: input.handle_metrics.cpu_pct,
                rss_bytes: input.handle_metrics.rss_bytes,
                queue_depth: input.handle_metrics.queue_depth,
                dropped_total: input.handle_metrics.dropped_total,
            })
            .collect();

        let queue_depth_total = per_agent.iter().map(|a| a.queue_depth).sum();
        let dropped_total = per_agent.iter().map(|a| a.dropped_total).sum();

        let sample = PerfSample {
            at,
            wall_clock_ms: tick_duration.as_secs_f64() * 1000.0,
            stage_durations,
            per_agent,
            queue_depth_total,
            dropped_total,
        };

        if self.samples.len() >= self.retention {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&PerfSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &PerfSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
#[path = "perf_tests.rs"]
mod tests;
