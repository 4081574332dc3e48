// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence ledger record shape.
//!
//! One [`EvidenceRecord`] is written per line to the daily journal. The
//! journal is the system's ground truth: nothing downstream replays or
//! rewrites it, so this type must stay backward-compatible as fields are
//! added (new optional fields only, never a renamed/removed one).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentLabel;
use crate::segment::SegmentId;

/// Discriminates what produced an [`EvidenceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    SegmentStart,
    Summary,
    SegmentClose,
    IdleStart,
    /// An agent-reported `status` health transition (C4).
    Status,
    /// An agent-reported `error` envelope (C4).
    Error,
    /// A runtime-sourced lifecycle breadcrumb, e.g. shutdown markers (C10).
    Lifecycle,
}

/// One append-only journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: EvidenceKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<AgentLabel>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub segment_id: Option<SegmentId>,
    pub payload: Value,
}

impl EvidenceRecord {
    pub fn segment_start(timestamp: DateTime<Utc>, segment_id: SegmentId, label: AgentLabel) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::SegmentStart,
            label: Some(label),
            segment_id: Some(segment_id),
            payload: Value::Null,
        }
    }

    pub fn segment_close(
        timestamp: DateTime<Utc>,
        segment_id: SegmentId,
        duration_s: i64,
        resets_count: u64,
    ) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::SegmentClose,
            label: None,
            segment_id: Some(segment_id),
            payload: serde_json::json!({ "duration_s": duration_s, "resets_count": resets_count }),
        }
    }

    pub fn idle_start(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::IdleStart,
            label: None,
            segment_id: None,
            payload: Value::Null,
        }
    }

    pub fn summary(
        timestamp: DateTime<Utc>,
        label: AgentLabel,
        segment_id: Option<SegmentId>,
        payload: Value,
    ) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::Summary,
            label: Some(label),
            segment_id,
            payload,
        }
    }

    pub fn status(timestamp: DateTime<Utc>, label: AgentLabel, detail: Option<String>) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::Status,
            label: Some(label),
            segment_id: None,
            payload: serde_json::json!({ "detail": detail }),
        }
    }

    pub fn error(timestamp: DateTime<Utc>, label: AgentLabel, payload: Value) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::Error,
            label: Some(label),
            segment_id: None,
            payload,
        }
    }

    /// A runtime-sourced breadcrumb not tied to any single agent, e.g.
    /// `orchestrator.shutdown_initiated` / `orchestrator.shutdown_complete`.
    pub fn lifecycle(timestamp: DateTime<Utc>, tag: &str, payload: Value) -> Self {
        Self {
            timestamp,
            kind: EvidenceKind::Lifecycle,
            label: None,
            segment_id: None,
            payload: serde_json::json!({ "tag": tag, "detail": payload }),
        }
    }
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
