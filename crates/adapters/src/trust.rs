// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trusted-root executable policy.
//!
//! Spawn validation resolves symlinks before comparing against the
//! allowlist so a trusted-looking path that ultimately points outside the
//! workspace or plugin store is still rejected.

use mimolo_core::TrustRoots;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("executable path does not exist: {0}")]
    NotFound(PathBuf),
    #[error("executable resolves outside trusted roots: {0}")]
    PolicyViolation(PathBuf),
}

/// Canonicalizes `candidate` (following symlinks) and checks the result
/// against `roots`. Returns the canonical path so callers spawn exactly
/// what was validated.
pub fn resolve_trusted(candidate: &Path, roots: &TrustRoots) -> Result<PathBuf, TrustError> {
    let canonical = candidate
        .canonicalize()
        .map_err(|_| TrustError::NotFound(candidate.to_path_buf()))?;

    if roots.allows(&canonical) {
        Ok(canonical)
    } else {
        Err(TrustError::PolicyViolation(canonical))
    }
}

#[cfg(test)]
#[path = "trust_tests.rs"]
mod tests;
