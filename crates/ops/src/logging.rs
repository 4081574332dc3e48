// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tracing` setup for the `ops` binary's own engineering diagnostics.
//!
//! This is distinct from the orchestrator log (C6.3, `mimolo_storage::OrchestratorLog`):
//! that sink carries evidence-adjacent records (agent `log` envelopes,
//! shutdown breadcrumbs) an operator or Control may read as plain text.
//! This module wires up the workspace's own `RUST_LOG`-filtered spans —
//! every one that touches an agent carries an `agent_label` field — to a
//! stderr layer for interactive runs plus a rolling daily file under
//! `<data_dir>/operations/logs/ops.log`.

use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Must be held for the lifetime of the process; dropping it stops the
/// non-blocking writer from flushing.
pub struct LoggingGuard(#[allow(dead_code)] tracing_appender::non_blocking::WorkerGuard);

pub fn init(internal_log_dir: &Path, verbose: bool) -> std::io::Result<LoggingGuard> {
    std::fs::create_dir_all(internal_log_dir)?;

    let file_appender = tracing_appender::rolling::daily(internal_log_dir, "ops.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(LoggingGuard(guard))
}
