use bridge_host::app::{HostApp, PLUGIN_UNLOADED_EVENT, READY_EVENT};
use bridge_host::error::HostError;
use bridge_host::plugins::builtin_plugins;

use bridge_core::bridge::{Bridge, MemoryBridge};
use bridge_core::command::{CommandHandler, CommandMap, Registrar};
use bridge_core::error::{InvokeError, PluginError, RegistrarError};
use bridge_core::config::{BridgeConfig, PluginSettings};
use bridge_core::ipc::protocol::{INVOKE_HOOK, parse_event_script, parse_response_script};
use bridge_core::ipc::{CorrelationId, ErrorKind, Response};
use bridge_core::plugin::{PermissionPolicy, Plugin, PluginContext, PluginState};
use bridge_core::serializer::{CommandSpec, ValueKind};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, timeout};

fn headless_config(data_dir: &TempDir) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.app.data_dir_override = Some(data_dir.path().to_path_buf());
    config.ipc.websocket = false;
    config
}

fn start_on_memory(
    config: BridgeConfig,
    settings: PluginSettings,
) -> (HostApp, Arc<MemoryBridge>, UnboundedReceiver<String>) {
    let (bridge, scripts) = MemoryBridge::new();
    let bridge = Arc::new(bridge);
    let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
    let app = HostApp::with_bridge(config, settings, dyn_bridge, builtin_plugins())
        .expect("Host should start");
    (app, bridge, scripts)
}

async fn next_script(scripts: &mut UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(2), scripts.recv())
        .await
        .expect("Timed out waiting for a script")
        .expect("Script channel closed")
}

async fn call(app: &HostApp, id: &str, command: &str, args: Value) -> Response {
    let raw = json!({ "cmd": command, "args": args }).to_string();
    app.handler()
        .handle(CorrelationId::from(id), &raw)
        .await
        .expect("Dispatch")
}

/// **VALUE**: Startup wires built-in commands, bundled plugins and announces readiness.
///
/// **WHY THIS MATTERS**: The UI waits for the ready event before its first call.
#[tokio::test]
async fn given_headless_config_when_host_starts_then_ready_event_and_commands_available() {
    // GIVEN: Default config pointed at a temp data dir
    let data_dir = TempDir::new().expect("temp dir");

    // WHEN: Starting the host
    let (app, _bridge, mut scripts) =
        start_on_memory(headless_config(&data_dir), PluginSettings::default());

    // THEN: The first script is the ready event
    let script = next_script(&mut scripts).await;
    let (name, envelope) = parse_event_script(&script).expect("event script");
    assert_eq!(name, READY_EVENT);
    assert_eq!(envelope.payload["plugins"], json!(["math", "timer", "notes"]));

    // THEN: Core, app and plugin commands all answer
    for command in ["bridge:ping", "app:info", "math:add", "notes:list"] {
        assert!(app.registry().contains(command), "{command} missing");
    }
    let response = call(&app, "1", "math:add", json!({ "a": 1, "b": 2 })).await;
    assert_eq!(response.result, Some(json!(3.0)));
    assert_eq!(app.plugin_states().get("notes"), Some(PluginState::Initialized));

    app.shutdown();
}

/// **VALUE**: A request triggered through the bridge hook is answered through the bridge.
#[tokio::test]
async fn given_running_host_when_ui_triggers_hook_then_response_script_is_evaluated() {
    // GIVEN: Running host, ready event consumed
    let data_dir = TempDir::new().expect("temp dir");
    let (app, bridge, mut scripts) =
        start_on_memory(headless_config(&data_dir), PluginSettings::default());
    next_script(&mut scripts).await;

    // WHEN: The UI calls an unknown command through the hook
    assert!(bridge.trigger(INVOKE_HOOK, "ui-1", r#"{"cmd":"math:pow","args":{}}"#));

    // THEN: Unknown-command response under the same id
    let response = parse_response_script(&next_script(&mut scripts).await).expect("response");
    assert_eq!(response.correlation_id, CorrelationId::from("ui-1"));
    assert_eq!(response.error_kind, Some(ErrorKind::UnknownCommand));

    app.shutdown();
}

/// **VALUE**: Config drives the plugin set: disabled plugins are skipped and
/// the explicit policy withholds ungranted permissions.
#[tokio::test]
async fn given_disabled_and_ungranted_plugins_when_host_starts_then_only_others_load() {
    // GIVEN: timer disabled, notes not granted fs:write
    let data_dir = TempDir::new().expect("temp dir");
    let mut config = headless_config(&data_dir);
    config.plugins.disabled = vec![String::from("timer")];
    config.plugins.permission_policy = PermissionPolicy::Explicit;

    // WHEN: Starting
    let (app, _bridge, _scripts) = start_on_memory(config, PluginSettings::default());

    // THEN: Only math is live
    let states = app.plugin_states();
    assert_eq!(states.get("math"), Some(PluginState::Initialized));
    assert_eq!(states.get("timer"), Some(PluginState::Registered));
    assert_eq!(states.get("notes"), Some(PluginState::Failed));
    assert!(!app.registry().contains("notes:add"));

    let response = call(&app, "plugins", "app:plugins", json!({})).await;
    assert_eq!(
        response.result,
        Some(json!([
            { "id": "math", "state": "Initialized" },
            { "id": "notes", "state": "Failed" },
            { "id": "timer", "state": "Registered" }
        ]))
    );

    app.shutdown();
}

/// **VALUE**: Unloading a plugin at runtime removes its commands and tells the UI.
#[tokio::test]
async fn given_running_host_when_plugin_unloaded_then_commands_gone_and_event_pushed() {
    // GIVEN: Running host
    let data_dir = TempDir::new().expect("temp dir");
    let (mut app, _bridge, mut scripts) =
        start_on_memory(headless_config(&data_dir), PluginSettings::default());
    next_script(&mut scripts).await;

    // WHEN: Unloading math
    app.unload_plugin("math").expect("unload");

    // THEN: Event pushed, command gone, unknown id refused
    let (name, envelope) =
        parse_event_script(&next_script(&mut scripts).await).expect("event script");
    assert_eq!(name, PLUGIN_UNLOADED_EVENT);
    assert_eq!(envelope.payload, json!({ "plugin": "math" }));
    let response = call(&app, "gone", "math:add", json!({ "a": 1, "b": 1 })).await;
    assert_eq!(response.error_kind, Some(ErrorKind::UnknownCommand));
    assert!(matches!(
        app.unload_plugin("math"),
        Err(HostError::Core { .. })
    ));

    // THEN: Shutdown covers only what is left, in reverse order
    assert_eq!(app.shutdown(), vec!["notes", "timer"]);
}

/// **VALUE**: `app:quit` releases the host's wait so `main` can shut down.
#[tokio::test]
async fn given_running_host_when_quit_invoked_then_wait_for_quit_returns() {
    // GIVEN: Running host
    let data_dir = TempDir::new().expect("temp dir");
    let (app, _bridge, _scripts) =
        start_on_memory(headless_config(&data_dir), PluginSettings::default());

    // WHEN: The UI asks to quit
    let response = call(&app, "bye", "app:quit", json!({})).await;

    // THEN: The wait resolves
    assert!(response.success);
    timeout(Duration::from_secs(1), app.wait_for_quit())
        .await
        .expect("wait_for_quit should return");
    app.shutdown();
}

/// **VALUE**: An invalid config stops startup with a core error.
#[tokio::test]
async fn given_invalid_config_when_host_starts_then_startup_fails() {
    // GIVEN: An empty app name
    let data_dir = TempDir::new().expect("temp dir");
    let mut config = headless_config(&data_dir);
    config.app.name = String::new();

    // WHEN: Starting
    let (bridge, _scripts) = MemoryBridge::new();
    let result = HostApp::with_bridge(
        config,
        PluginSettings::default(),
        Arc::new(bridge),
        builtin_plugins(),
    );

    // THEN: Refused
    assert!(matches!(result, Err(HostError::Core { .. })));
}

/// **VALUE**: With the WebSocket transport enabled the host listens on localhost.
#[tokio::test]
async fn given_websocket_config_when_host_starts_then_transport_listens_on_loopback() {
    // GIVEN: WebSocket on a free port with a fixed token
    let data_dir = TempDir::new().expect("temp dir");
    let mut config = headless_config(&data_dir);
    config.ipc.websocket = true;
    config.ipc.port = 0;
    config.ipc.auth_token = Some(String::from("host-token"));

    // WHEN: Starting
    let app = HostApp::start(config, PluginSettings::default(), builtin_plugins())
        .await
        .expect("Host should start");

    // THEN: Transport bound to loopback with the configured token
    let ws_bridge = app.ws_bridge().expect("WebSocket transport");
    assert!(ws_bridge.local_addr().ip().is_loopback());
    assert_ne!(ws_bridge.local_addr().port(), 0);
    assert_eq!(ws_bridge.auth_token(), "host-token");
    app.shutdown();
}

/// Plugin that claims `app:info`, which the host already provides.
struct Squatter {
    shut_down: Arc<AtomicBool>,
}

struct SquatterCommands;

impl CommandHandler for SquatterCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(
                CommandSpec::new("app:info").returns(ValueKind::String),
                |_commands, _args| Ok::<_, InvokeError>("mine"),
            )
            .finish()
    }
}

impl Plugin for Squatter {
    fn id(&self) -> &str {
        "squatter"
    }

    fn name(&self) -> &str {
        "Squatter"
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    fn initialize(&mut self, _context: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PluginError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        vec![Arc::new(SquatterCommands)]
    }
}

/// **VALUE**: A command collision aborts startup, and plugins that already
/// initialized still run their shutdown.
///
/// **WHY THIS MATTERS**: Plugins persist state on shutdown; an aborted
/// startup must not skip that.
///
/// **BUG THIS CATCHES**: Would catch an early return out of startup that
/// drops the loader without tearing plugins down.
#[tokio::test]
async fn given_colliding_plugin_command_when_host_starts_then_initialized_plugins_shut_down() {
    // GIVEN: The bundled plugins plus one claiming `app:info`
    let data_dir = TempDir::new().expect("temp dir");
    let shut_down = Arc::new(AtomicBool::new(false));
    let mut plugins = builtin_plugins();
    plugins.push(Box::new(Squatter {
        shut_down: Arc::clone(&shut_down),
    }));

    // WHEN: Starting
    let (bridge, _scripts) = MemoryBridge::new();
    let result = HostApp::with_bridge(
        headless_config(&data_dir),
        PluginSettings::default(),
        Arc::new(bridge),
        plugins,
    );

    // THEN: Startup fails on the collision
    match result {
        Err(HostError::Core { message, .. }) => assert!(message.contains("app:info")),
        Err(other) => panic!("Expected Core error, got {other:?}"),
        Ok(_) => panic!("Startup should fail on a duplicate command"),
    }

    // THEN: Every initialized plugin was shut down; notes flushed its store
    assert!(shut_down.load(Ordering::SeqCst));
    assert!(
        data_dir
            .path()
            .join("plugins")
            .join("notes")
            .join("notes.json")
            .exists()
    );
}
