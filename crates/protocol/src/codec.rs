// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent JLP line codec (C1).
//!
//! One JSON object per line, UTF-8, `\n`-terminated. Frame-level failures
//! (oversize lines, unknown `type`) are turned into a synthetic `Error`
//! envelope rather than propagated as a hard error — a malformed line from
//! one agent must never kill its handle.

use chrono::{DateTime, Utc};
use mimolo_core::AgentLabel;
use thiserror::Error;

use crate::envelope::ProtocolMessage;

/// Lines longer than this are rejected with `protocol_frame_oversize`.
pub const MAX_LINE_SIZE: usize = 256 * 1024;

/// Diagnostic payload for an unparseable line is truncated to this many bytes.
pub const RAW_LINE_DIAGNOSTIC_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("line exceeds max size of {max} bytes ({actual} bytes)")]
    FrameOversize { actual: usize, max: usize },
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("missing or unknown message type")]
    UnknownType,
    #[error("timestamp missing timezone or failed to parse")]
    BadTimestamp,
}

/// Parses one stdout line from an agent into a [`ProtocolMessage`].
///
/// Never returns `Err` for content problems — those are folded into a
/// synthetic `Error` envelope attributed to `label` so the caller can push
/// it through the same pipeline as any other message. `Err` is reserved for
/// truly unrecoverable framing problems (oversize, non-UTF-8) where even a
/// synthetic envelope can't safely echo the raw bytes.
pub fn parse_line(label: &AgentLabel, raw: &[u8], now: DateTime<Utc>) -> ProtocolMessage {
    if raw.len() > MAX_LINE_SIZE {
        return ProtocolMessage::synthetic_error(
            label.clone(),
            now,
            "protocol_frame_oversize",
            format!("line of {} bytes exceeds max {}", raw.len(), MAX_LINE_SIZE),
        );
    }

    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(_) => {
            return ProtocolMessage::synthetic_error(
                label.clone(),
                now,
                "protocol_invalid_utf8",
                "line was not valid UTF-8",
            )
        }
    };

    match serde_json::from_str::<ProtocolMessage>(text) {
        Ok(msg) => {
            if validate_timestamp(text) {
                msg
            } else {
                ProtocolMessage::synthetic_error(
                    label.clone(),
                    now,
                    "protocol_bad_timestamp",
                    truncated(text),
                )
            }
        }
        Err(_) => ProtocolMessage::synthetic_error(
            label.clone(),
            now,
            "protocol_unknown_type",
            truncated(text),
        ),
    }
}

/// `ProtocolMessage`'s own deserialization already rejects a missing
/// timezone (chrono's `DateTime<Utc>` requires an offset in the source
/// text), so this performs the belt-and-suspenders check spec callers
/// expect on the raw text before the tag dispatch runs.
fn validate_timestamp(raw_line: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw_line) else {
        return false;
    };
    match value.get("timestamp").and_then(|v| v.as_str()) {
        Some(ts) => DateTime::parse_from_rfc3339(ts).is_ok(),
        None => false,
    }
}

fn truncated(raw_line: &str) -> String {
    if raw_line.len() <= RAW_LINE_DIAGNOSTIC_BYTES {
        raw_line.to_string()
    } else {
        let mut end = RAW_LINE_DIAGNOSTIC_BYTES;
        while !raw_line.is_char_boundary(end) {
            end -= 1;
        }
        raw_line[..end].to_string()
    }
}

/// Serializes an outbound envelope with deterministic key order and a
/// trailing newline, ready to be written to a child's stdin.
pub fn encode_line(msg: &ProtocolMessage) -> Result<String, CodecError> {
    let mut json = serde_json::to_string(msg).map_err(|_| CodecError::UnknownType)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
