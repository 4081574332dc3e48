// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test harness for the Operations runtime behavioral specs: spawns
//! the real `ops` binary against a private config/data directory and talks
//! to its command bridge over a Unix socket exactly as Control would.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mimolo_core::{AgentConfig, AgentLabel, InstanceId, MonitorSettings, PluginId};
use mimolo_ops::config::RuntimeConfig;
use serde_json::{json, Value};

pub const SPEC_POLL_INTERVAL_MS: u64 = 20;
pub const SPEC_WAIT_MAX_MS: u64 = 5_000;

/// Resolves a sibling binary's path, checking the llvm-cov target directory
/// first and falling back to the current test binary's own debug directory
/// when `CARGO_MANIFEST_DIR` is stale.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

pub fn ops_binary() -> PathBuf {
    binary_path("ops")
}

pub fn fake_agent_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fake_agent"))
}

/// Poll `condition` until it returns true or `timeout_ms` elapses.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS));
    }
    false
}

static SOCKET_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds one `fake_agent`-backed [`AgentConfig`]. `mode_args` becomes the
/// child's argv (`["active_repeat", "3", "100"]`-style); the fixture reads
/// `argv[1]` as its mode.
pub fn fake_agent_config(label: &str, start_enabled: bool, mode_args: &[&str]) -> AgentConfig {
    AgentConfig {
        label: AgentLabel::new(label),
        plugin_id: PluginId::new(format!("{label}-plugin")),
        instance_id: InstanceId::new(format!("{label}-instance")),
        executable: fake_agent_path(),
        args: mode_args.iter().map(|s| s.to_string()).collect(),
        heartbeat_interval_s: 15,
        flush_interval_s: 30,
        cpu_budget_pct: 5.0,
        start_enabled,
        extra: Default::default(),
    }
}

/// A running `ops` process under a private tempdir, with a command-bridge
/// client connection opened lazily on first [`Harness::request`].
pub struct Harness {
    _dir: tempfile::TempDir,
    data_dir: PathBuf,
    ipc_path: PathBuf,
    child: Child,
    conn: Option<(UnixStream, BufReader<UnixStream>)>,
    next_request_id: u64,
}

impl Harness {
    /// Starts `ops` with `fake_agent`'s own directory as the sole trust
    /// root, which covers every scenario except the untrusted-executable
    /// one (see [`Self::start_with_trust_roots`]).
    pub fn start(agents: Vec<AgentConfig>, monitor: MonitorSettings) -> Self {
        let trust_root = std::fs::canonicalize(fake_agent_path().parent().expect("fake_agent binary has a parent dir"))
            .expect("canonicalize fake_agent's directory");
        Self::start_with_trust_roots(agents, monitor, vec![trust_root])
    }

    pub fn start_with_trust_roots(agents: Vec<AgentConfig>, monitor: MonitorSettings, trust_roots: Vec<PathBuf>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).expect("create data dir");
        let config_path = dir.path().join("ops.toml");
        let suffix = SOCKET_COUNTER.fetch_add(1, Ordering::Relaxed);
        let ipc_path = std::env::temp_dir().join(format!("mml-{}-{suffix}.sock", std::process::id()));

        let config = RuntimeConfig {
            data_dir: data_dir.clone(),
            ipc_path: Some(ipc_path.clone()),
            ops_log_path: None,
            journal_dir: None,
            cache_dir: None,
            monitor,
            trust_roots,
            agents,
        };
        let body = toml::to_string_pretty(&config).expect("serialize runtime config");
        std::fs::write(&config_path, body).expect("write runtime config");

        let child = Command::new(ops_binary())
            .arg("--config")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn ops");

        let mut harness = Self { _dir: dir, data_dir, ipc_path, child, conn: None, next_request_id: 0 };
        let up = wait_for(SPEC_WAIT_MAX_MS, || UnixStream::connect(&harness.ipc_path).is_ok());
        assert!(up, "command bridge never came up at {}", harness.ipc_path.display());
        harness
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn ensure_conn(&mut self) -> &mut (UnixStream, BufReader<UnixStream>) {
        if self.conn.is_none() {
            let stream = UnixStream::connect(&self.ipc_path).expect("connect to command bridge");
            let read_half = stream.try_clone().expect("clone command bridge stream");
            self.conn = Some((stream, BufReader::new(read_half)));
        }
        self.conn.as_mut().expect("connection just established")
    }

    /// Sends one bridge request (a JSON object with at least a `cmd` field)
    /// and returns the decoded response. Fills in `request_id` if the
    /// caller didn't set one.
    pub fn request(&mut self, mut request: Value) -> Value {
        self.next_request_id += 1;
        let rid = format!("spec-{}", self.next_request_id);
        {
            let obj = request.as_object_mut().expect("bridge request must be a json object");
            obj.entry("request_id").or_insert_with(|| json!(rid));
        }

        let (stream, reader) = self.ensure_conn();
        let mut line = serde_json::to_string(&request).expect("serialize bridge request");
        line.push('\n');
        stream.write_all(line.as_bytes()).expect("write bridge request");
        stream.flush().expect("flush bridge request");

        let mut resp_line = String::new();
        reader.read_line(&mut resp_line).expect("read bridge response");
        serde_json::from_str(resp_line.trim_end()).expect("parse bridge response json")
    }

    pub fn agent_states(&mut self) -> Vec<Value> {
        let resp = self.request(json!({"cmd": "get_agent_states"}));
        assert!(resp["ok"].as_bool().unwrap_or(false), "get_agent_states failed: {resp}");
        resp["data"]["agents"].as_array().cloned().unwrap_or_default()
    }

    pub fn lifecycle_state(&mut self, label: &str) -> Option<String> {
        self.agent_states()
            .into_iter()
            .find(|a| a["label"] == label)
            .and_then(|a| a["lifecycle_state"].as_str().map(str::to_string))
    }

    /// Sends SIGTERM so `ops` runs its graceful shutdown orchestrator
    /// instead of simply dying.
    pub fn terminate(&mut self) {
        let pid = self.child.id();
        let _ = Command::new("kill").args(["-TERM", &pid.to_string()]).status();
    }

    pub fn wait_exit(&mut self, timeout_ms: u64) -> Option<std::process::ExitStatus> {
        wait_for(timeout_ms, || matches!(self.child.try_wait(), Ok(Some(_))));
        self.child.try_wait().ok().flatten()
    }

    /// Every line of today's UTC evidence journal, parsed as JSON. Lines
    /// that failed to parse are silently skipped, matching how a real
    /// reader tolerates a torn trailing write.
    pub fn journal_records(&self) -> Vec<Value> {
        let today = chrono::Utc::now().date_naive();
        let path = self.data_dir.join("operations/journal").join(format!("{}.mimolo.jsonl", today.format("%Y-%m-%d")));
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        text.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
    }

    pub fn journal_kinds(&self) -> Vec<String> {
        self.journal_records()
            .into_iter()
            .filter_map(|record| record.get("kind").and_then(|k| k.as_str()).map(str::to_string))
            .collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.terminate();
            if self.wait_exit(2_000).is_none() {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}
