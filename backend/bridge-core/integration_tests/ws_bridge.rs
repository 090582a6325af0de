use crate::helpers::{
    TEST_AUTH_TOKEN, authenticate, connect_to_bridge, is_connection_closed, receive_text,
    send_json, test_registry,
};

use bridge_core::bridge::{Bridge, WsBridge};
use bridge_core::event::EventEmitter;
use bridge_core::error::BridgeError;
use bridge_core::ipc::protocol::{
    INVOKE_HOOK, parse_event_script, parse_response_script, response_script,
};
use bridge_core::ipc::{CorrelationId, IpcHandler, Response};

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tokio::time::{Duration, timeout};

async fn start_bridge() -> Arc<WsBridge> {
    let bridge = WsBridge::start(0, Some(String::from(TEST_AUTH_TOKEN)))
        .await
        .expect("Failed to start WebSocket bridge");
    Arc::new(bridge)
}

/// **VALUE**: A client presenting the right token is authenticated and registered.
#[tokio::test]
async fn given_valid_token_when_authenticating_then_success() {
    // GIVEN: Bridge on a free port
    let bridge = start_bridge().await;

    // WHEN: Client authenticates with the right token
    let mut ws = connect_to_bridge(bridge.local_addr().port()).await;
    let reply = authenticate(&mut ws, TEST_AUTH_TOKEN).await;

    // THEN: Authenticated and counted as a client
    assert_eq!(reply["authenticated"], json!(true));
    assert!(reply.get("error").is_none());
    assert_eq!(bridge.client_count(), 1);
    bridge.shutdown();
}

/// **VALUE**: A wrong token is refused and the connection closed.
///
/// **BUG THIS CATCHES**: Would catch any local process being able to drive
/// commands without knowing the token.
#[tokio::test]
async fn given_invalid_token_when_authenticating_then_rejected_and_closed() {
    // GIVEN: Bridge on a free port
    let bridge = start_bridge().await;

    // WHEN: Client presents the wrong token
    let mut ws = connect_to_bridge(bridge.local_addr().port()).await;
    let reply = authenticate(&mut ws, "wrong-token").await;

    // THEN: Refused with a reason, then disconnected
    assert_eq!(reply["authenticated"], json!(false));
    assert!(reply["error"].is_string());
    assert!(is_connection_closed(&mut ws).await);
    assert_eq!(bridge.client_count(), 0);
}

/// **VALUE**: A first frame that is not a handshake closes the connection.
#[tokio::test]
async fn given_unauthenticated_client_when_sending_request_first_then_closed() {
    // GIVEN: Bridge on a free port
    let bridge = start_bridge().await;
    let mut ws = connect_to_bridge(bridge.local_addr().port()).await;

    // WHEN: Client skips the handshake
    send_json(
        &mut ws,
        &json!({ "hook": INVOKE_HOOK, "id": 1, "request": { "cmd": "bridge:ping" } }),
    )
    .await;

    // THEN: Connection is closed without an answer
    assert!(is_connection_closed(&mut ws).await);
}

/// **VALUE**: Requests sent over the socket reach the dispatch loop and the
/// response comes back as a script frame.
///
/// **WHY THIS MATTERS**: This is the round trip every UI call makes.
#[tokio::test]
async fn given_authenticated_client_when_invoking_then_response_script_frame() {
    // GIVEN: Dispatch loop attached to the WebSocket bridge
    let bridge = start_bridge().await;
    let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
    let handler = IpcHandler::new(test_registry(), dyn_bridge).expect("dispatch loop");
    handler.attach().expect("attach");

    // GIVEN: Authenticated client
    let mut ws = connect_to_bridge(bridge.local_addr().port()).await;
    let reply = authenticate(&mut ws, TEST_AUTH_TOKEN).await;
    assert_eq!(reply["authenticated"], json!(true));

    // WHEN: Client invokes a command with a numeric id
    send_json(
        &mut ws,
        &json!({
            "hook": INVOKE_HOOK,
            "id": 12,
            "request": { "cmd": "test:add", "args": { "a": 40, "b": 2 } }
        }),
    )
    .await;

    // THEN: The response script carries the result under the same id
    let frame = receive_text(&mut ws).await;
    let response = parse_response_script(&frame).expect("response script");
    assert_eq!(response.correlation_id, CorrelationId::from("12"));
    assert_eq!(response.result, Some(json!(42)));
    bridge.shutdown();
}

/// **VALUE**: Two clients reusing the same request id each get their own
/// response, and only their own.
///
/// **WHY THIS MATTERS**: Ids are chosen per client; a second window or tab
/// starts counting from 1 just like the first.
///
/// **BUG THIS CATCHES**: Would catch ids shared across connections, where the
/// second request is dropped as a duplicate and its client resolves the call
/// with the other client's result.
#[tokio::test]
async fn given_two_clients_with_same_id_when_invoking_concurrently_then_each_gets_own_response() {
    // GIVEN: Dispatch loop attached to the WebSocket bridge, two authenticated clients
    let bridge = start_bridge().await;
    let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
    let handler = IpcHandler::new(test_registry(), dyn_bridge).expect("dispatch loop");
    handler.attach().expect("attach");

    let mut slow = connect_to_bridge(bridge.local_addr().port()).await;
    let mut fast = connect_to_bridge(bridge.local_addr().port()).await;
    authenticate(&mut slow, TEST_AUTH_TOKEN).await;
    authenticate(&mut fast, TEST_AUTH_TOKEN).await;

    // WHEN: Both send id 1, the first a slow command, the second a fast one
    send_json(
        &mut slow,
        &json!({ "hook": INVOKE_HOOK, "id": 1, "request": { "cmd": "test:sleep", "args": { "ms": 300 } } }),
    )
    .await;
    send_json(
        &mut fast,
        &json!({ "hook": INVOKE_HOOK, "id": 1, "request": { "cmd": "test:add", "args": { "a": 1, "b": 1 } } }),
    )
    .await;

    // THEN: The fast client gets its own result under its own id
    let fast_response = parse_response_script(&receive_text(&mut fast).await).expect("response");
    assert_eq!(fast_response.correlation_id, CorrelationId::from("1"));
    assert_eq!(fast_response.result, Some(json!(2)));

    // THEN: The slow client gets its own result once the sleep ends
    let slow_response = parse_response_script(&receive_text(&mut slow).await).expect("response");
    assert_eq!(slow_response.correlation_id, CorrelationId::from("1"));
    assert_eq!(slow_response.result, Some(json!(300)));

    // THEN: Neither response leaked to the other client
    assert!(timeout(Duration::from_millis(100), fast.next()).await.is_err());
    assert_eq!(handler.in_flight(), 0);
    bridge.shutdown();
}

/// **VALUE**: Events emitted in the backend are broadcast to every authenticated client.
#[tokio::test]
async fn given_two_clients_when_event_emitted_then_both_receive_it() {
    // GIVEN: Emitter pushing through the WebSocket bridge, two clients
    let bridge = start_bridge().await;
    let dyn_bridge: Arc<dyn Bridge> = bridge.clone();
    let emitter = EventEmitter::with_bridge(dyn_bridge);

    let mut first = connect_to_bridge(bridge.local_addr().port()).await;
    let mut second = connect_to_bridge(bridge.local_addr().port()).await;
    authenticate(&mut first, TEST_AUTH_TOKEN).await;
    authenticate(&mut second, TEST_AUTH_TOKEN).await;

    // WHEN: An event is emitted
    emitter.emit("status", json!({ "ready": true }));

    // THEN: Both clients get the same event script
    for ws in [&mut first, &mut second] {
        let frame = receive_text(ws).await;
        let (name, envelope) = parse_event_script(&frame).expect("event script");
        assert_eq!(name, "status");
        assert_eq!(envelope.payload, json!({ "ready": true }));
    }
    bridge.shutdown();
}

/// **VALUE**: A response whose id was not issued for any connection is refused,
/// never broadcast.
#[tokio::test]
async fn given_response_without_client_namespace_when_evaluated_then_eval_error() {
    // GIVEN: Bridge with one authenticated client
    let bridge = start_bridge().await;
    let mut ws = connect_to_bridge(bridge.local_addr().port()).await;
    authenticate(&mut ws, TEST_AUTH_TOKEN).await;

    // WHEN: Evaluating a response for a bare id
    let script = response_script(&Response::success(CorrelationId::from("7"), json!(true)))
        .expect("render");
    let result = bridge.eval(&script);

    // THEN: Refused, and the client saw nothing
    assert!(matches!(result, Err(BridgeError::Eval { .. })));
    assert!(timeout(Duration::from_millis(100), ws.next()).await.is_err());
    bridge.shutdown();
}
