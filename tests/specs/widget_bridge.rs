// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Widget render/action round trip: `request_widget_render` and
//! `dispatch_widget_action` correlate with the target agent's `widget_frame`
//! reply and surface its payload back through the bridge response.

use mimolo_core::MonitorSettings;
use serde_json::json;

use crate::prelude::*;

#[test]
fn request_widget_render_returns_the_agents_frame() {
    let agent = fake_agent_config("widget-worker", true, &["widget"]);
    let mut harness = Harness::start(vec![agent], MonitorSettings::default());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("widget-worker").as_deref() == Some("running")),
        "agent never reached running"
    );

    let resp = harness.request(json!({
        "cmd": "request_widget_render",
        "plugin_id": "widget-worker-plugin",
        "instance_id": "widget-worker-instance",
        "canvas": {"aspect_ratio": 1.0, "max_w": 320, "max_h": 240},
        "mode": "default",
    }));

    assert_eq!(resp["ok"], json!(true), "{resp}");
    assert_eq!(resp["data"]["action"], json!("render"), "{resp}");
    assert_eq!(resp["data"]["html"], json!("<div data-src=\"mimolo://artifact/tok-fixture\"></div>"), "{resp}");
}

#[test]
fn dispatch_widget_action_returns_the_agents_frame() {
    let agent = fake_agent_config("widget-worker-2", true, &["widget"]);
    let mut harness = Harness::start(vec![agent], MonitorSettings::default());

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || harness.lifecycle_state("widget-worker-2").as_deref() == Some("running")),
        "agent never reached running"
    );

    let resp = harness.request(json!({
        "cmd": "dispatch_widget_action",
        "plugin_id": "widget-worker-2-plugin",
        "instance_id": "widget-worker-2-instance",
        "action": "refresh",
        "payload": {},
    }));

    assert_eq!(resp["ok"], json!(true), "{resp}");
    assert_eq!(resp["data"]["action"], json!("refresh"), "{resp}");
}

#[test]
fn widget_render_for_unknown_instance_is_rejected() {
    let mut harness = Harness::start(vec![], MonitorSettings::default());

    let resp = harness.request(json!({
        "cmd": "request_widget_render",
        "plugin_id": "ghost-plugin",
        "instance_id": "ghost-instance",
        "canvas": {"aspect_ratio": 1.0, "max_w": 320, "max_h": 240},
        "mode": "default",
    }));

    assert_eq!(resp["ok"], json!(false), "{resp}");
    assert_eq!(resp["error"], json!("unknown_instance:ghost-instance"), "{resp}");
}
