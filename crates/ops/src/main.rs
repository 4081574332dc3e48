// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ops`: the MiMoLo Operations runtime entrypoint.
//!
//! Loads config, bootstraps the tick loop (C3-C6, C9, C11), binds the
//! command-bridge socket (C8), and runs until SIGTERM/SIGINT triggers the
//! shutdown orchestrator (C10). Exits 0 on clean shutdown, non-zero on a
//! fatal startup error per §6.

use std::sync::Arc;

use mimolo_core::SystemClock;
use mimolo_ops::cli::{self, CliArgs, CliOutcome};
use mimolo_ops::config::RuntimeConfig;
use mimolo_ops::{bridge, env, logging, runtime};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = match cli::parse(std::env::args()) {
        CliOutcome::Run(args) => args,
        CliOutcome::PrintAndExit(text) => {
            println!("{text}");
            std::process::exit(0);
        }
        CliOutcome::Error(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(args).await {
        eprintln!("fatal startup error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RuntimeConfig::load(&args.config_path)?;
    if let Some(data_dir) = env::data_dir_override() {
        config.data_dir = data_dir;
    }
    if let Some(ops_log_path) = env::ops_log_path_override() {
        config.ops_log_path = Some(ops_log_path);
    }

    let _log_guard = logging::init(&config.data_dir.join("operations/logs"), args.verbose)?;
    info!(config_path = %args.config_path.display(), "loaded runtime config");

    let (ipc_path, substituted) = env::resolve_ipc_path(config.ipc_path.as_deref(), &config.data_dir);
    if substituted {
        warn!(path = %ipc_path.display(), "MIMOLO_IPC_PATH exceeded the socket path length limit, substituted a short temp-dir path");
    }

    let clock: Arc<dyn mimolo_core::Clock> = Arc::new(SystemClock);
    let config_path = args.config_path.clone();
    let engine_state = runtime::bootstrap(config, config_path, Arc::clone(&clock)).await?;
    let state = Arc::new(Mutex::new(engine_state));
    let widget_bridge = Arc::new(mimolo_engine::WidgetBridge::new());
    let shutdown_signal = Arc::new(Notify::new());

    let listener = bridge::bind(&ipc_path)?;
    info!(path = %ipc_path.display(), "command bridge listening");

    let bridge_task = tokio::spawn(bridge::serve(
        listener,
        Arc::clone(&state),
        Arc::clone(&widget_bridge),
        Arc::clone(&clock),
        Arc::clone(&shutdown_signal),
    ));

    let tick_task = tokio::spawn(runtime::run(Arc::clone(&state), Arc::clone(&widget_bridge), Arc::clone(&clock), Arc::clone(&shutdown_signal)));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    // Stop accepting bridge connections and advancing the tick loop before
    // running the shutdown orchestrator, per the teardown order in §9.
    shutdown_signal.notify_waiters();
    if let Err(err) = bridge_task.await {
        error!(error = %err, "command bridge task panicked");
    }
    if let Err(err) = tick_task.await {
        error!(error = %err, "tick loop task panicked");
    }

    runtime::graceful_shutdown(&state, &widget_bridge, clock.as_ref()).await;

    if let Err(err) = std::fs::remove_file(&ipc_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %err, path = %ipc_path.display(), "failed to remove command bridge socket on exit");
        }
    }

    info!("ops exited cleanly");
    Ok(())
}
