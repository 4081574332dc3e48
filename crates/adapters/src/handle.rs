// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Process Handle (C2): owns one child's stdin/stdout/stderr and its
//! bounded inbound queue. The process manager (in `mimolo-engine`) owns
//! lifecycle state; this type only isolates subprocess I/O.

use chrono::{DateTime, Utc};
use mimolo_core::{AgentConfig, AgentLabel, Clock, TrustRoots};
use mimolo_protocol::{encode_line, parse_line, ProtocolMessage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;

use crate::spawn::{spawn_agent, SpawnError};

/// Default capacity of the bounded inbound queue before drop-oldest kicks in.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

struct Inbound {
    queue: Mutex<VecDeque<ProtocolMessage>>,
    capacity: usize,
    dropped_total: AtomicU64,
    last_rx_at: Mutex<Option<DateTime<Utc>>>,
}

impl Inbound {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped_total: AtomicU64::new(0),
            last_rx_at: Mutex::new(None),
        }
    }

    fn push(&self, msg: ProtocolMessage, now: DateTime<Utc>) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(msg);
        *self.last_rx_at.lock() = Some(now);
    }

    fn drain(&self, max_messages: usize) -> Vec<ProtocolMessage> {
        let mut queue = self.queue.lock();
        let n = max_messages.min(queue.len());
        queue.drain(..n).collect()
    }

    fn depth(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Point-in-time metrics for one handle, exposed through `get_runtime_perf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleMetrics {
    pub queue_depth: usize,
    pub dropped_total: u64,
    pub last_rx_at: Option<DateTime<Utc>>,
    pub last_tx_at: Option<DateTime<Utc>>,
    pub cpu_pct: f32,
    pub rss_bytes: u64,
}

/// Result of one `send()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendResult {
    pub ok: bool,
    pub writer_closed: bool,
    pub backpressure_full: bool,
}

impl SendResult {
    fn sent() -> Self {
        Self { ok: true, ..Default::default() }
    }

    fn closed() -> Self {
        Self { writer_closed: true, ..Default::default() }
    }
}

/// Owns one child subprocess's I/O. Reader and stderr-tee tasks are
/// detached; both terminate when the child exits and are not joined by
/// `AgentHandle` itself — `shutdown()` only awaits the child.
pub struct AgentHandle {
    pub label: AgentLabel,
    pub process_id: Option<u32>,
    pub started_at: DateTime<Utc>,
    child: Mutex<Child>,
    writer: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    inbound: Arc<Inbound>,
    last_tx_at: Mutex<Option<DateTime<Utc>>>,
    reader_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl AgentHandle {
    /// Spawns the agent and starts its reader/stderr-tee tasks.
    #[allow(clippy::expect_used)]
    pub async fn spawn(
        config: &AgentConfig,
        roots: &TrustRoots,
        stderr_log_path: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SpawnError> {
        let mut child = spawn_agent(config, roots)?;
        let process_id = child.id();
        let stdin = child.stdin.take();
        // spawn_agent always requests piped stdout/stderr; absence here is a bug, not an I/O failure.
        let stdout = child.stdout.take().expect("stdout piped at spawn");
        let stderr = child.stderr.take().expect("stderr piped at spawn");

        let inbound = Arc::new(Inbound::new(DEFAULT_INBOUND_CAPACITY));
        let reader_task = spawn_reader_task(config.label.clone(), stdout, inbound.clone(), clock.clone());
        let stderr_task = spawn_stderr_tee_task(stderr, stderr_log_path);

        Ok(Self {
            label: config.label.clone(),
            process_id,
            started_at: clock.now(),
            child: Mutex::new(child),
            writer: Arc::new(tokio::sync::Mutex::new(stdin)),
            inbound,
            last_tx_at: Mutex::new(None),
            reader_task,
            stderr_task,
        })
    }

    /// Serializes `command` to a single line and writes it to the child's
    /// stdin under the writer lock.
    pub async fn send(&self, command: &ProtocolMessage, now: DateTime<Utc>) -> SendResult {
        let line = match encode_line(command) {
            Ok(line) => line,
            Err(_) => return SendResult::default(),
        };

        let mut guard = self.writer.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return SendResult::closed();
        };

        match stdin.write_all(line.as_bytes()).await {
            Ok(()) => {
                *self.last_tx_at.lock() = Some(now);
                SendResult::sent()
            }
            Err(_) => {
                *guard = None;
                SendResult::closed()
            }
        }
    }

    /// Non-blocking pull of up to `max_messages` from the inbound queue.
    pub fn drain(&self, max_messages: usize) -> Vec<ProtocolMessage> {
        self.inbound.drain(max_messages)
    }

    pub fn metrics(&self, cpu_pct: f32, rss_bytes: u64) -> HandleMetrics {
        HandleMetrics {
            queue_depth: self.inbound.depth(),
            dropped_total: self.inbound.dropped_total.load(Ordering::Relaxed),
            last_rx_at: *self.inbound.last_rx_at.lock(),
            last_tx_at: *self.last_tx_at.lock(),
            cpu_pct,
            rss_bytes,
        }
    }

    /// True once the reader task has ended, meaning the child's stdout
    /// pipe is closed (child exited or crashed).
    pub fn reader_finished(&self) -> bool {
        self.reader_task.is_finished()
    }

    pub fn stderr_tee_finished(&self) -> bool {
        self.stderr_task.is_finished()
    }

    /// Waits up to `grace` for the child to exit on its own, then kills it.
    /// Callers are responsible for sending the stop/flush/shutdown command
    /// sequence before calling this.
    pub async fn shutdown(&self, grace: std::time::Duration) {
        let exited = {
            let mut child = self.child.lock();
            // `try_wait` is synchronous; a real exit race is resolved by the
            // polling loop below rather than blocking here under the lock.
            matches!(child.try_wait(), Ok(Some(_)))
        };
        if exited {
            return;
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            {
                let mut child = self.child.lock();
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        let mut child = self.child.lock();
        let _ = child.start_kill();
    }
}

fn spawn_reader_task(
    label: AgentLabel,
    stdout: tokio::process::ChildStdout,
    inbound: Arc<Inbound>,
    clock: Arc<dyn Clock>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let now = clock.now();
                    let msg = parse_line(&label, line.as_bytes(), now);
                    inbound.push(msg, now);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
    })
}

fn spawn_stderr_tee_task(
    stderr: tokio::process::ChildStderr,
    log_path: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(file) = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        else {
            return;
        };
        let mut writer = tokio::io::BufWriter::new(file);
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if writer.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    if writer.write_all(b"\n").await.is_err() {
                        break;
                    }
                    if writer.flush().await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
