// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the `ops` binary.
//!
//! Per §6, these override the config file's corresponding paths — env wins
//! over config file. `ipc_path` additionally self-corrects for the OS
//! socket-path length limit rather than failing startup outright.

use std::path::{Path, PathBuf};

/// Conservative cross-platform bound on `sockaddr_un.sun_path`. Linux
/// allows up to 108 bytes including the NUL terminator; some BSDs cap at
/// 104. Using the tighter bound means a path valid here is valid anywhere
/// this binary runs.
pub const UNIX_SOCKET_PATH_MAX: usize = 100;

pub fn data_dir_override() -> Option<PathBuf> {
    std::env::var_os("MIMOLO_DATA_DIR").map(PathBuf::from)
}

pub fn ops_log_path_override() -> Option<PathBuf> {
    std::env::var_os("MIMOLO_OPS_LOG_PATH").map(PathBuf::from)
}

fn ipc_path_env() -> Option<PathBuf> {
    std::env::var_os("MIMOLO_IPC_PATH").map(PathBuf::from)
}

/// Resolves the effective IPC socket path: `MIMOLO_IPC_PATH` if set (with a
/// length fallback), else the config file's `ipc_path`, else a path under
/// `data_dir`. Returns `(path, substituted)` where `substituted` is true iff
/// the caller should log that a long path was swapped for a short one.
pub fn resolve_ipc_path(configured: Option<&Path>, data_dir: &Path) -> (PathBuf, bool) {
    let requested = ipc_path_env().or_else(|| configured.map(Path::to_path_buf)).unwrap_or_else(|| data_dir.join("operations/ipc.sock"));

    if requested.as_os_str().len() <= UNIX_SOCKET_PATH_MAX {
        return (requested, false);
    }

    let short = std::env::temp_dir().join(format!("mimolo-{}.sock", std::process::id()));
    (short, true)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
