// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segment timeline types.
//!
//! A segment is a contiguous span of cooldown-linked activity. At most one
//! segment is open at a time; the tracker in `mimolo-engine` is the sole
//! mutator, this module only defines the shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::agent::AgentLabel;

crate::define_id! {
    /// Identifies one segment for the lifetime of the runtime process.
    pub struct SegmentId;
}

/// One contiguous span of cooldown-linked activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: SegmentId,
    pub started_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub resets_count: u64,
    pub contributing_labels: BTreeSet<AgentLabel>,
    pub cooldown_deadline: DateTime<Utc>,
}

impl Segment {
    pub fn open(segment_id: SegmentId, started_at: DateTime<Utc>, cooldown_seconds: i64) -> Self {
        Self {
            segment_id,
            started_at,
            last_event_at: started_at,
            closed_at: None,
            resets_count: 1,
            contributing_labels: BTreeSet::new(),
            cooldown_deadline: started_at + chrono::Duration::seconds(cooldown_seconds),
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now >= self.cooldown_deadline
    }

    pub fn duration_s(&self) -> Option<i64> {
        self.closed_at.map(|at| (at - self.started_at).num_seconds())
    }
}

/// Snapshot written to `current_segment.json`: the last-closed segment plus
/// an optionally-open active one. Consulted by Control and by restart
/// reconciliation; never replayed to reconstruct lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentSegmentProjection {
    pub active: Option<Segment>,
    pub last_closed: Option<Segment>,
}

#[cfg(test)]
#[path = "segment_tests.rs"]
mod tests;
