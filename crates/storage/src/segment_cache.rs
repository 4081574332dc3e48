// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Current-segment cache writer (C6.2).
//!
//! `current_segment.json` is rewritten atomically: serialize to a sibling
//! `.tmp` file, fsync it, then rename over the final path. A reader never
//! observes a partially-written cache file.

use mimolo_core::CurrentSegmentProjection;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmentCacheError {
    #[error("failed to serialize segment projection: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io error writing segment cache: {0}")]
    Io(#[from] std::io::Error),
}

/// Atomically replaces `path` with the serialized `projection`.
pub fn write_current_segment(
    path: &Path,
    projection: &CurrentSegmentProjection,
) -> Result<(), SegmentCacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(projection)?;

    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&body)?;
        tmp.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "segment_cache_tests.rs"]
mod tests;
