use super::*;
use crate::config::RuntimeConfig;
use crate::runtime;
use mimolo_core::SystemClock;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn config_for(dir: &Path) -> RuntimeConfig {
    RuntimeConfig {
        data_dir: dir.to_path_buf(),
        ipc_path: None,
        ops_log_path: None,
        journal_dir: None,
        cache_dir: None,
        monitor: mimolo_core::MonitorSettings::default(),
        trust_roots: Vec::new(),
        agents: Vec::new(),
    }
}

async fn state_for(dir: &Path) -> Arc<Mutex<EngineState>> {
    let config = config_for(dir);
    let config_path = dir.join("ops.toml");
    let engine_state = runtime::bootstrap(config, config_path, Arc::new(SystemClock)).await.unwrap();
    Arc::new(Mutex::new(engine_state))
}

#[test]
fn bind_creates_socket_with_owner_only_permissions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ipc.sock");
    let listener = bind(&path).unwrap();
    drop(listener);

    let perms = std::fs::metadata(&path).unwrap().permissions();
    assert_eq!(perms.mode() & 0o777, 0o600);
}

#[test]
fn bind_replaces_stale_socket_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ipc.sock");
    std::fs::write(&path, b"stale").unwrap();

    let listener = bind(&path).unwrap();
    drop(listener);
    assert!(path.exists());
}

#[tokio::test]
async fn dispatch_ping_returns_pong() {
    let dir = tempdir().unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());

    let request = BridgeRequest::Ping { request_id: Some("r1".to_string()) };
    let response = dispatch(&request, &state, &widget_bridge, &SystemClock).await;

    assert!(response.ok);
    assert_eq!(response.request_id.as_deref(), Some("r1"));
    assert_eq!(response.data.unwrap()["pong"], true);
}

#[tokio::test]
async fn dispatch_get_agent_instances_reflects_config() {
    let dir = tempdir().unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());

    let request = BridgeRequest::GetAgentInstances { request_id: None };
    let response = dispatch(&request, &state, &widget_bridge, &SystemClock).await;

    assert!(response.ok);
    assert_eq!(response.data.unwrap()["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn dispatch_get_agent_states_is_empty_with_no_agents() {
    let dir = tempdir().unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());

    let request = BridgeRequest::GetAgentStates { request_id: None };
    let response = dispatch(&request, &state, &widget_bridge, &SystemClock).await;

    assert!(response.ok);
    assert_eq!(response.data.unwrap()["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn dispatch_queued_action_rejected_once_shutting_down() {
    let dir = tempdir().unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());
    state.lock().await.shutting_down = true;

    let request = BridgeRequest::StartAgent { label: mimolo_core::AgentLabel::new("a1"), request_id: None };
    let response = dispatch(&request, &state, &widget_bridge, &SystemClock).await;

    assert!(!response.ok);
    assert_eq!(response.error, Some(BridgeErrorCode::ShuttingDown));
}

#[tokio::test]
async fn dispatch_widget_render_on_unknown_instance_is_an_error() {
    let dir = tempdir().unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());

    let request = BridgeRequest::RequestWidgetRender {
        plugin_id: mimolo_core::PluginId::new("ghost"),
        instance_id: mimolo_core::InstanceId::new("ghost"),
        canvas: mimolo_core::Canvas { aspect_ratio: 1.0, max_w: 100, max_h: 100 },
        mode: "default".to_string(),
        request_id: None,
    };
    let response = dispatch(&request, &state, &widget_bridge, &SystemClock).await;

    assert!(!response.ok);
    assert!(matches!(response.error, Some(BridgeErrorCode::UnknownInstance { .. })));
}

#[tokio::test]
async fn dispatch_get_registered_plugins_empty_store_is_ok() {
    let dir = tempdir().unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());

    let request = BridgeRequest::GetRegisteredPlugins { request_id: None };
    let response = dispatch(&request, &state, &widget_bridge, &SystemClock).await;

    assert!(response.ok);
    assert_eq!(response.data.unwrap()["plugins"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn serve_answers_ping_over_the_socket() {
    let dir = tempdir().unwrap();
    let socket_path = dir.path().join("ipc.sock");
    let listener = bind(&socket_path).unwrap();
    let state = state_for(dir.path()).await;
    let widget_bridge = Arc::new(WidgetBridge::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shutdown_signal = Arc::new(Notify::new());

    let serve_task = tokio::spawn(serve(listener, state, widget_bridge, clock, Arc::clone(&shutdown_signal)));

    let stream = UnixStream::connect(&socket_path).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"{\"cmd\":\"ping\"}\n").await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["ok"], true);
    assert_eq!(response["data"]["pong"], true);

    shutdown_signal.notify_waiters();
    serve_task.await.unwrap();
}
