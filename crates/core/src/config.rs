// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime-wide monitor settings and the trusted-root spawn policy.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log verbosity floor applied to `log` envelopes before they reach the
/// orchestrator log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Info
    }
}

/// The subset of configuration mutable at runtime via `update_monitor_settings`.
///
/// The key whitelist lives in [`MonitorSettings::ALLOWED_KEYS`]; C9 rejects
/// any other key with `unknown_field`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub poll_tick_s: f64,
    pub cooldown_seconds: i64,
    pub console_verbosity: Verbosity,
}

impl MonitorSettings {
    pub const ALLOWED_KEYS: &'static [&'static str] =
        &["poll_tick_s", "cooldown_seconds", "console_verbosity"];

    pub fn is_allowed_key(key: &str) -> bool {
        Self::ALLOWED_KEYS.contains(&key)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_tick_s: 0.2,
            cooldown_seconds: 300,
            console_verbosity: Verbosity::Info,
        }
    }
}

/// Allowlisted directories an agent `executable` (or, for interpreters, its
/// first script argument) must resolve within after symlink canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRoots {
    pub roots: Vec<PathBuf>,
}

impl TrustRoots {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// True if `candidate` (already canonicalized by the caller) falls
    /// under one of the allowlisted roots.
    pub fn allows(&self, candidate: &Path) -> bool {
        self.roots.iter().any(|root| candidate.starts_with(root))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
