//! Test helpers for dispatch integration tests.
//!
//! - A handler with fast, slow, failing and panicking commands
//! - A dispatch loop wired to an in-memory bridge
//! - WebSocket client helpers for the localhost transport

use bridge_core::bridge::{Bridge, MemoryBridge};
use bridge_core::command::{BridgeCommands, CommandHandler, CommandMap, Registrar};
use bridge_core::error::{InvokeError, RegistrarError};
use bridge_core::ipc::protocol::parse_response_script;
use bridge_core::ipc::{IpcHandler, Response};
use bridge_core::registry::CommandRegistry;
use bridge_core::serializer::{CommandSpec, ValueKind};

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, Instant, sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub const TEST_AUTH_TOKEN: &str = "test-token-12345";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands under `test:` used across the dispatch tests.
pub struct TestCommands;

impl CommandHandler for TestCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(
                CommandSpec::new("test:add")
                    .param("a", ValueKind::Integer)
                    .param("b", ValueKind::Integer)
                    .returns(ValueKind::Integer),
                |_commands, args| {
                    let a: i64 = args.get("a")?;
                    let b: i64 = args.get("b")?;
                    Ok(a + b)
                },
            )
            .command_sync(
                CommandSpec::new("test:divide")
                    .param("a", ValueKind::Float)
                    .param("b", ValueKind::Float)
                    .returns(ValueKind::Float),
                |_commands, args| {
                    let a: f64 = args.get("a")?;
                    let b: f64 = args.get("b")?;
                    if b == 0.0 {
                        return Err(InvokeError::handler("division by zero"));
                    }
                    Ok(a / b)
                },
            )
            .command(
                CommandSpec::new("test:sleep")
                    .param("ms", ValueKind::Integer)
                    .returns(ValueKind::Integer),
                |_commands, args| async move {
                    let ms: u64 = args.get("ms")?;
                    let deadline = Instant::now() + Duration::from_millis(ms);
                    while Instant::now() < deadline {
                        if args.cancellation().is_cancelled() {
                            return Err(InvokeError::handler("cancelled"));
                        }
                        sleep(Duration::from_millis(5)).await;
                    }
                    Ok(ms)
                },
            )
            .command_sync(
                CommandSpec::new("test:panic"),
                |_commands, _args| -> Result<Value, InvokeError> { panic!("boom") },
            )
            .finish()
    }
}

/// A registry holding the bridge's own commands plus [`TestCommands`].
pub fn test_registry() -> CommandRegistry {
    let registry = CommandRegistry::new();
    registry
        .register_handler(Arc::new(BridgeCommands::new(&registry)))
        .expect("Failed to register bridge commands");
    registry
        .register_handler(Arc::new(TestCommands))
        .expect("Failed to register test commands");
    registry
}

pub struct Harness {
    pub handler: IpcHandler,
    pub bridge: Arc<MemoryBridge>,
    pub scripts: UnboundedReceiver<String>,
}

/// Test helper: dispatch loop over an in-memory bridge. Must run inside a tokio runtime.
pub fn harness(registry: CommandRegistry) -> Harness {
    let (bridge, scripts) = MemoryBridge::new();
    let bridge = Arc::new(bridge);
    let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
    let handler = IpcHandler::new(registry, dyn_bridge).expect("Failed to create dispatch loop");
    Harness {
        handler,
        bridge,
        scripts,
    }
}

/// Test helper: the raw request text for `command` with `args`.
pub fn request(command: &str, args: Value) -> String {
    json!({ "cmd": command, "args": args }).to_string()
}

/// Test helper: next script evaluated on the bridge, failing after two seconds.
pub async fn next_script(scripts: &mut UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(2), scripts.recv())
        .await
        .expect("Timed out waiting for a script")
        .expect("Script channel closed")
}

/// Test helper: next response delivered on the bridge.
pub async fn next_response(scripts: &mut UnboundedReceiver<String>) -> Response {
    let script = next_script(scripts).await;
    parse_response_script(&script)
        .unwrap_or_else(|| panic!("Expected a response script, got: {script}"))
}

/// Test helper: connect to the WebSocket bridge.
pub async fn connect_to_bridge(port: u16) -> WsClient {
    let url = format!("ws://127.0.0.1:{port}");
    let (ws_stream, _) = connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket bridge");
    ws_stream
}

/// Test helper: send a text frame holding `value`.
pub async fn send_json(ws: &mut WsClient, value: &Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Test helper: next text frame, failing after two seconds.
pub async fn receive_text(ws: &mut WsClient) -> String {
    let frame = timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Timed out waiting for a frame")
        .expect("No frame received")
        .expect("Error receiving frame");

    match frame {
        Message::Text(text) => text.as_str().to_string(),
        other => panic!("Expected a text frame, got {other:?}"),
    }
}

/// Test helper: send the token handshake and return the reply.
pub async fn authenticate(ws: &mut WsClient, token: &str) -> Value {
    send_json(ws, &json!({ "token": token })).await;
    let reply = receive_text(ws).await;
    serde_json::from_str(&reply).expect("Auth reply is not JSON")
}

/// Test helper: check whether the server closed the connection.
pub async fn is_connection_closed(ws: &mut WsClient) -> bool {
    match timeout(Duration::from_millis(500), ws.next()).await {
        Err(_) => false,
        Ok(None) => true,
        Ok(Some(Ok(Message::Close(_)))) => true,
        Ok(Some(Ok(_))) => false,
        Ok(Some(Err(_))) => true,
    }
}
