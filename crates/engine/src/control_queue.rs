// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control Action Queue (C9): serializes every lifecycle/config-mutating
//! command behind a single FIFO so the tick thread applies them in arrival
//! order, one at a time, instead of racing a C8 connection task against
//! the tick loop.
//!
//! This module is deliberately thin: it owns ordering and the
//! request/response plumbing only. What it means to *apply* a
//! `BridgeRequest` — touching [`crate::process_manager::AgentProcessManager`],
//! persisting a config file, rebuilding the plugin registry — is supplied
//! by the caller's closure, since that logic spans crates C9 itself must
//! not depend on (`mimolo-ops` owns config persistence).

use std::collections::VecDeque;

use mimolo_protocol::{BridgeErrorCode, BridgeRequest};
use serde_json::Value;
use tokio::sync::oneshot;

pub type ActionResult = Result<Value, BridgeErrorCode>;

struct QueuedAction {
    request: BridgeRequest,
    responder: oneshot::Sender<ActionResult>,
}

/// FIFO of queued mutating actions. Not `Send`-shared directly — callers
/// wrap it in their own `Mutex`/actor as the runtime wiring (`mimolo-ops`)
/// requires, since the queue itself has no opinion on concurrency model.
#[derive(Default)]
pub struct ControlActionQueue {
    queue: VecDeque<QueuedAction>,
}

impl ControlActionQueue {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    /// Enqueues `request` and returns a receiver that resolves once the
    /// tick thread applies it via [`Self::drain_with`].
    pub fn enqueue(&mut self, request: BridgeRequest) -> oneshot::Receiver<ActionResult> {
        let (tx, rx) = oneshot::channel();
        self.queue.push_back(QueuedAction { request, responder: tx });
        rx
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Applies every currently-queued action in FIFO order via `apply`,
    /// resolving each waiter with the result. `apply` is synchronous by
    /// design — this runs on the tick thread, which must not block on
    /// agent I/O while holding the queue.
    pub fn drain_with<F>(&mut self, mut apply: F)
    where
        F: FnMut(&BridgeRequest) -> ActionResult,
    {
        while let Some(action) = self.queue.pop_front() {
            let result = apply(&action.request);
            let _ = action.responder.send(result);
        }
    }

    /// Pops the oldest queued action for a caller that applies it with an
    /// `async` handler (agent start/stop/restart all await subprocess I/O).
    /// Keeps the same single-FIFO ordering as [`Self::drain_with`]; callers
    /// that need synchronous application (tests, purely in-memory settings
    /// patches) can still use `drain_with` instead.
    pub fn pop_next(&mut self) -> Option<(BridgeRequest, oneshot::Sender<ActionResult>)> {
        self.queue.pop_front().map(|action| (action.request, action.responder))
    }

    /// Drains and rejects every queued action with `code`, for use once the
    /// runtime has begun shutting down and will accept no further mutation.
    pub fn reject_all(&mut self, code: BridgeErrorCode) {
        while let Some(action) = self.queue.pop_front() {
            let _ = action.responder.send(Err(code.clone()));
        }
    }
}

#[cfg(test)]
#[path = "control_queue_tests.rs"]
mod tests;
