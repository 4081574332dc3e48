// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixture agent used by the behavioral specs under `tests/specs/`.
//!
//! Speaks real Agent JLP over stdin/stdout using [`mimolo_protocol`]'s own
//! envelope types, so the specs exercise the actual wire codec rather than a
//! hand-rolled approximation of it. Behavior branches on `argv[1]` (the
//! fixture "mode"); everything after that is mode-specific.
//!
//! Modes:
//!   idle           - handshake + heartbeats only.
//!   active_repeat  - handshake, then argv[2] active summaries argv[3]ms apart.
//!   bad_then_good  - one malformed raw line, then one active summary.
//!   widget         - answers widget render/action commands with a frame.
//!   never_ack      - ignores stop/flush/shutdown instead of acking them.

use std::io::{BufRead, Write};
use std::time::Duration;

use chrono::Utc;
use mimolo_core::AgentLabel;
use mimolo_protocol::{encode_line, ActivityMode, ActivitySignal, Envelope, ProtocolMessage, AGENT_PROTOCOL_VERSION};
use serde_json::json;

fn label() -> AgentLabel {
    AgentLabel::new(std::env::var("MIMOLO_AGENT_LABEL").unwrap_or_else(|_| "fixture".to_string()))
}

fn base_envelope(label: &AgentLabel, data: serde_json::Value) -> Envelope {
    Envelope {
        timestamp: Utc::now(),
        agent_id: Some(format!("fixture-{}", label.as_str())),
        agent_label: label.clone(),
        protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
        agent_version: Some("0.0.0-fixture".to_string()),
        data,
        metrics: None,
        level: None,
        message: None,
        ack_command: None,
        request_id: None,
    }
}

fn send(msg: &ProtocolMessage) {
    let Ok(line) = encode_line(msg) else { return };
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(line.as_bytes());
    let _ = out.flush();
}

fn send_active_summary(label: &AgentLabel) {
    let signal = ActivitySignal { mode: ActivityMode::Active, keep_alive: false, reason: None };
    let data = json!({ "activity_signal": signal });
    send(&ProtocolMessage::Summary(base_envelope(label, data)));
}

fn send_ack(label: &AgentLabel, command: &str) {
    let env = Envelope { ack_command: Some(command.to_string()), ..base_envelope(label, json!({})) };
    send(&ProtocolMessage::Ack(env));
}

fn send_widget_frame(label: &AgentLabel, request_id: Option<String>, action: &str) {
    let data = json!({
        "html": "<div data-src=\"mimolo://artifact/tok-fixture\"></div>",
        "action": action,
    });
    let env = Envelope { request_id, ..base_envelope(label, data) };
    send(&ProtocolMessage::WidgetFrame(env));
}

fn main() {
    let label = label();
    let mode = std::env::args().nth(1).unwrap_or_else(|| "idle".to_string());

    send(&ProtocolMessage::Handshake(base_envelope(&label, json!({}))));

    {
        let label = label.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_millis(150));
            send(&ProtocolMessage::Heartbeat(base_envelope(&label, json!({}))));
        });
    }

    match mode.as_str() {
        "active_repeat" => {
            let count: u32 = std::env::args().nth(2).and_then(|s| s.parse().ok()).unwrap_or(1);
            let gap_ms: u64 = std::env::args().nth(3).and_then(|s| s.parse().ok()).unwrap_or(150);
            let label = label.clone();
            std::thread::spawn(move || {
                for _ in 0..count {
                    std::thread::sleep(Duration::from_millis(gap_ms));
                    send_active_summary(&label);
                }
            });
        }
        "bad_then_good" => {
            std::thread::spawn(|| {
                std::thread::sleep(Duration::from_millis(75));
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(b"this is not a json envelope\n");
                let _ = out.flush();
            });
            let label = label.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(200));
                send_active_summary(&label);
            });
        }
        _ => {}
    }

    let never_ack = mode == "never_ack";

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(msg) = serde_json::from_str::<ProtocolMessage>(&line) else {
            continue;
        };
        let ProtocolMessage::Command(env) = msg else {
            continue;
        };

        if let Some(command) = env.data.get("command").and_then(|v| v.as_str()) {
            if never_ack {
                continue;
            }
            send_ack(&label, command);
            if command == "shutdown" {
                std::process::exit(0);
            }
        } else if let Some(action) = env.data.get("action").and_then(|v| v.as_str()) {
            send_widget_frame(&label, env.request_id.clone(), action);
        }
    }
}
