// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-rolled argument parsing for the `ops` binary. No `clap`: the
//! surface is two flags and doesn't earn the dependency.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliOutcome {
    Run(CliArgs),
    PrintAndExit(String),
    Error(String),
}

/// Parses `args` (including argv\[0\], which is skipped). `--version`/`--help`
/// win over a missing `--config` even if both are present — this mirrors
/// how operators actually invoke a CLI to check its version before wiring
/// up a real config file.
pub fn parse<I: Iterator<Item = String>>(args: I) -> CliOutcome {
    let mut config_path = None;
    let mut verbose = false;
    let mut iter = args.skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" | "-V" => return CliOutcome::PrintAndExit(format!("ops {}", env!("CARGO_PKG_VERSION"))),
            "--help" | "-h" => return CliOutcome::PrintAndExit(help_text()),
            "--config" => match iter.next() {
                Some(value) => config_path = Some(PathBuf::from(value)),
                None => return CliOutcome::Error("--config requires a path argument".to_string()),
            },
            "--verbose" => verbose = true,
            other => return CliOutcome::Error(format!("unexpected argument '{other}'")),
        }
    }

    match config_path {
        Some(path) => CliOutcome::Run(CliArgs { config_path: path, verbose }),
        None => CliOutcome::Error("--config <path> is required".to_string()),
    }
}

fn help_text() -> String {
    format!(
        "ops {}\n\nMiMoLo Operations runtime.\n\nUSAGE:\n    ops --config <path> [--verbose]\n\nOPTIONS:\n    --config <path>   Path to the runtime TOML config (required)\n    --verbose         Raise the default tracing level to debug\n    -h, --help        Print help information\n    -V, --version     Print version information\n",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
