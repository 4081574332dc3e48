// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

#[test]
fn widget_request_expires_at_deadline() {
    let req = WidgetRequest {
        request_id: RequestId::new("r1"),
        plugin_id: PluginId::new("p"),
        instance_id: InstanceId::new("i"),
        canvas: Canvas { aspect_ratio: 1.0, max_w: 100, max_h: 100 },
        mode: "default".into(),
        issued_at: at(0),
        deadline_at: at(2),
    };
    assert!(!req.is_expired(at(1)));
    assert!(req.is_expired(at(2)));
}

#[test]
fn artifact_handle_expires_at_ttl() {
    let handle = ArtifactHandle {
        token: ArtifactToken::new("tok-1"),
        plugin_id: PluginId::new("p"),
        instance_id: InstanceId::new("i"),
        artifact_ref: "snapshot.png".into(),
        expires_at: at(5),
    };
    assert!(!handle.is_expired(at(4)));
    assert!(handle.is_expired(at(5)));
}

#[test]
fn artifact_uri_shape_is_validated() {
    assert!(is_artifact_uri("mimolo://artifact/abc123"));
    assert!(!is_artifact_uri("mimolo://artifact/"));
    assert!(!is_artifact_uri("/etc/passwd"));
    assert!(!is_artifact_uri("file:///etc/passwd"));
}
