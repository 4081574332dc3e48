// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segment Tracker (C5).
//!
//! Holds at most one open segment and derives the evidence journal's
//! `segment_start` / `segment_close` / `idle_start` breadcrumbs from
//! resetting summaries. The tracker is the sole mutator of segment state;
//! everyone else reads the `current_segment` projection it publishes.

use chrono::{DateTime, Utc};
use mimolo_core::{AgentLabel, CurrentSegmentProjection, EvidenceRecord, IdGen, Segment, SegmentId};

/// How an out-of-order resetting event (timestamp older than the segment's
/// `last_event_at`) is handled. The distilled spec leaves this as an open
/// question; `AcceptWithoutRewind` is the documented default (see
/// DESIGN.md), `DropAsOutOfOrder` is offered behind this switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfOrderPolicy {
    #[default]
    AcceptWithoutRewind,
    DropAsOutOfOrder,
}

/// Clamp window: a resetting event timestamped more than this far in the
/// future (relative to the tracker's clock) is clamped to `now` and logged.
const CLOCK_SKEW_CLAMP_SECONDS: i64 = 5 * 60;

/// Minimum spacing between throttled cache-file rewrites triggered by
/// resetting events (segment open/close transitions always rewrite).
const CACHE_WRITE_THROTTLE_SECONDS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWriteReason {
    Transition,
    ResettingEvent,
}

/// One outcome of feeding an event (or a tick) through the tracker: the
/// evidence records to journal, plus whether the cache file should be
/// rewritten and why.
#[derive(Debug, Default)]
pub struct TrackerOutcome {
    pub records: Vec<EvidenceRecord>,
    pub cache_write: Option<CacheWriteReason>,
    pub clock_skew_warning: Option<(AgentLabel, DateTime<Utc>)>,
}

pub struct SegmentTracker<I: IdGen> {
    cooldown_seconds: i64,
    out_of_order_policy: OutOfOrderPolicy,
    active: Option<Segment>,
    last_closed: Option<Segment>,
    id_gen: I,
    last_cache_write_at: Option<DateTime<Utc>>,
}

impl<I: IdGen> SegmentTracker<I> {
    pub fn new(cooldown_seconds: i64, out_of_order_policy: OutOfOrderPolicy, id_gen: I) -> Self {
        Self {
            cooldown_seconds,
            out_of_order_policy,
            active: None,
            last_closed: None,
            id_gen,
            last_cache_write_at: None,
        }
    }

    pub fn projection(&self) -> CurrentSegmentProjection {
        CurrentSegmentProjection {
            active: self.active.clone(),
            last_closed: self.last_closed.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn cooldown_seconds(&self) -> i64 {
        self.cooldown_seconds
    }

    /// Applies a runtime `update_monitor_settings` change to `cooldown_seconds`.
    /// Does not retroactively move the currently open segment's
    /// `cooldown_deadline`; only events and ticks from this point on see
    /// the new value.
    pub fn set_cooldown_seconds(&mut self, seconds: i64) {
        self.cooldown_seconds = seconds;
    }

    /// Feeds one resetting summary event into the tracker. `at` is the
    /// agent-supplied (journal-canonical) event timestamp; `now` is the
    /// tracker's own clock, used only for clock-skew clamping.
    pub fn ingest_resetting_event(
        &mut self,
        label: AgentLabel,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TrackerOutcome {
        let mut outcome = TrackerOutcome::default();

        let clamped_at = if at > now + chrono::Duration::seconds(CLOCK_SKEW_CLAMP_SECONDS) {
            outcome.clock_skew_warning = Some((label.clone(), at));
            now
        } else {
            at
        };

        match &mut self.active {
            None => {
                let segment_id = SegmentId::new(self.id_gen.next());
                let mut segment = Segment::open(segment_id.clone(), clamped_at, self.cooldown_seconds);
                segment.contributing_labels.insert(label.clone());
                outcome.records.push(EvidenceRecord::segment_start(clamped_at, segment_id, label));
                self.active = Some(segment);
                outcome.cache_write = Some(CacheWriteReason::Transition);
            }
            Some(segment) => {
                let is_out_of_order = clamped_at < segment.last_event_at;
                if is_out_of_order && self.out_of_order_policy == OutOfOrderPolicy::DropAsOutOfOrder {
                    return outcome;
                }

                segment.resets_count += 1;
                segment.contributing_labels.insert(label);
                if !is_out_of_order {
                    segment.last_event_at = clamped_at;
                    segment.cooldown_deadline = clamped_at + chrono::Duration::seconds(self.cooldown_seconds);
                }

                let should_write = match self.last_cache_write_at {
                    None => true,
                    Some(prev) => (now - prev).num_seconds() >= CACHE_WRITE_THROTTLE_SECONDS,
                };
                if should_write {
                    outcome.cache_write = Some(CacheWriteReason::ResettingEvent);
                }
            }
        }

        if outcome.cache_write.is_some() {
            self.last_cache_write_at = Some(now);
        }

        outcome
    }

    /// Called once per runtime tick. Closes the open segment if its
    /// cooldown has elapsed.
    #[allow(clippy::expect_used)]
    pub fn tick(&mut self, now: DateTime<Utc>) -> TrackerOutcome {
        let mut outcome = TrackerOutcome::default();

        let Some(segment) = &self.active else {
            return outcome;
        };

        if !segment.is_expired(now) {
            return outcome;
        }

        let mut closed = self.active.take().expect("checked above");
        let closed_at = closed.cooldown_deadline.max(closed.last_event_at);
        closed.closed_at = Some(closed_at);

        outcome.records.push(EvidenceRecord::segment_close(
            closed_at,
            closed.segment_id.clone(),
            closed.duration_s().unwrap_or_default(),
            closed.resets_count,
        ));
        outcome.records.push(EvidenceRecord::idle_start(closed_at));
        outcome.cache_write = Some(CacheWriteReason::Transition);
        self.last_closed = Some(closed);

        outcome
    }

    /// Closes the open segment immediately, regardless of cooldown. Used by
    /// the shutdown orchestrator (C10) so a live segment is never left
    /// dangling across a restart.
    pub fn force_close(&mut self, now: DateTime<Utc>) -> TrackerOutcome {
        let mut outcome = TrackerOutcome::default();

        let Some(mut closed) = self.active.take() else {
            return outcome;
        };

        closed.closed_at = Some(now);
        outcome.records.push(EvidenceRecord::segment_close(
            now,
            closed.segment_id.clone(),
            closed.duration_s().unwrap_or_default(),
            closed.resets_count,
        ));
        outcome.records.push(EvidenceRecord::idle_start(now));
        outcome.cache_write = Some(CacheWriteReason::Transition);
        self.last_closed = Some(closed);

        outcome
    }
}

#[cfg(test)]
#[path = "segment_tracker_tests.rs"]
mod tests;
