use crate::helpers::{harness, next_response, next_script, request, test_registry};

use bridge_core::error::IpcError;
use bridge_core::ipc::protocol::INVOKE_HOOK;
use bridge_core::ipc::{CorrelationId, ErrorKind, RequestPhase};

use serde_json::json;
use tokio::time::{Duration, sleep, timeout};

// ============================================
// OUTCOMES
// ============================================

/// **VALUE**: A successful command answers with its result under the request's id.
#[tokio::test]
async fn given_known_command_when_received_then_success_response_with_same_id() {
    // GIVEN: Dispatch loop with the test commands
    let mut harness = harness(test_registry());

    // WHEN: A valid request arrives
    harness
        .handler
        .receive(
            CorrelationId::from("req-1"),
            request("test:add", json!({ "a": 2, "b": 3 })),
        )
        .expect("Request should be accepted");

    // THEN: One success response carries the result and the id
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.correlation_id, CorrelationId::from("req-1"));
    assert!(response.success);
    assert_eq!(response.result, Some(json!(5)));
    assert_eq!(response.error_kind, None);
    assert_eq!(harness.handler.in_flight(), 0);
}

/// **VALUE**: An unregistered name yields an unknown-command failure, tagged with the same id.
///
/// **WHY THIS MATTERS**: The UI must be able to settle the promise of a request
/// that named a command this build does not have.
///
/// **BUG THIS CATCHES**: Would catch a missing command being dropped silently,
/// which leaves the caller waiting forever.
#[tokio::test]
async fn given_unknown_command_when_received_then_unknown_command_error() {
    // GIVEN: Dispatch loop with the test commands
    let mut harness = harness(test_registry());

    // WHEN: The request names a command nobody registered
    harness
        .handler
        .receive(
            CorrelationId::from("req-404"),
            request("does:not:exist", json!({})),
        )
        .expect("Request should be accepted");

    // THEN: The failure names the command and keeps the id
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.correlation_id, CorrelationId::from("req-404"));
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::UnknownCommand));
    assert_eq!(
        response.error.as_deref(),
        Some("unknown command 'does:not:exist'")
    );
}

/// **VALUE**: A handler error reaches the caller as a handler failure with its message.
#[tokio::test]
async fn given_failing_handler_when_received_then_handler_error_with_message() {
    // GIVEN: Dispatch loop with the test commands
    let mut harness = harness(test_registry());

    // WHEN: Dividing by zero
    harness
        .handler
        .receive(
            CorrelationId::from("div"),
            request("test:divide", json!({ "a": 1.0, "b": 0.0 })),
        )
        .expect("Request should be accepted");

    // THEN: The handler's message is passed through
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Handler));
    assert_eq!(response.error.as_deref(), Some("division by zero"));
}

/// **VALUE**: Malformed requests and badly typed arguments are failures of their own kinds.
///
/// **BUG THIS CATCHES**: Would catch a parse failure escaping the request and
/// taking the dispatch loop down, or a type mismatch reaching the handler.
#[tokio::test]
async fn given_malformed_request_or_bad_args_when_received_then_protocol_and_decoding_errors() {
    // GIVEN: Dispatch loop with the test commands
    let mut harness = harness(test_registry());

    // WHEN: One request is not JSON
    harness
        .handler
        .receive(CorrelationId::from("broken"), String::from("{ not json"))
        .expect("Request should be accepted");

    // THEN: Protocol error
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.correlation_id, CorrelationId::from("broken"));
    assert_eq!(response.error_kind, Some(ErrorKind::Protocol));

    // WHEN: Another passes a string where an integer is declared
    harness
        .handler
        .receive(
            CorrelationId::from("typed"),
            request("test:add", json!({ "a": "two", "b": 3 })),
        )
        .expect("Request should be accepted");

    // THEN: Decoding error naming the parameter
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Decoding));
    let message = response.error.expect("Failure carries a message");
    assert!(
        message.starts_with("invalid parameter 'a'"),
        "unexpected message: {message}"
    );
}

/// **VALUE**: A panicking handler becomes a handler failure and the loop keeps serving.
#[tokio::test]
async fn given_panicking_handler_when_received_then_handler_error_and_loop_survives() {
    // GIVEN: Dispatch loop with the test commands
    let mut harness = harness(test_registry());

    // WHEN: The handler panics
    harness
        .handler
        .receive(CorrelationId::from("boom"), request("test:panic", json!({})))
        .expect("Request should be accepted");

    // THEN: The panic is reported to the caller
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.error_kind, Some(ErrorKind::Handler));
    assert_eq!(response.error.as_deref(), Some("handler panicked: boom"));

    // THEN: The next request still dispatches
    harness
        .handler
        .receive(
            CorrelationId::from("after"),
            request("test:add", json!({ "a": 1, "b": 1 })),
        )
        .expect("Request should be accepted");
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.result, Some(json!(2)));
}

// ============================================
// CONCURRENCY AND COMPLETION
// ============================================

/// **VALUE**: A slow command does not hold up a fast one received after it.
///
/// **WHY THIS MATTERS**: Requests are independent; serializing them behind the
/// slowest handler would freeze the UI.
#[tokio::test]
async fn given_slow_and_fast_requests_when_received_then_fast_completes_first() {
    // GIVEN: Dispatch loop with the test commands
    let mut harness = harness(test_registry());

    // WHEN: A slow request then a fast one arrive
    harness
        .handler
        .receive(
            CorrelationId::from("slow"),
            request("test:sleep", json!({ "ms": 300 })),
        )
        .expect("Request should be accepted");
    harness
        .handler
        .receive(
            CorrelationId::from("fast"),
            request("test:add", json!({ "a": 20, "b": 22 })),
        )
        .expect("Request should be accepted");

    // THEN: Each response pairs with its own request, fast first
    let first = next_response(&mut harness.scripts).await;
    let second = next_response(&mut harness.scripts).await;
    assert_eq!(first.correlation_id, CorrelationId::from("fast"));
    assert_eq!(first.result, Some(json!(42)));
    assert_eq!(second.correlation_id, CorrelationId::from("slow"));
    assert_eq!(second.result, Some(json!(300)));
}

/// **VALUE**: A request completes exactly once; a second completion is refused.
///
/// **BUG THIS CATCHES**: Would catch a stale outcome being delivered twice and
/// resolving a reused id on the UI side.
#[tokio::test]
async fn given_completed_request_when_completed_again_then_rejected() {
    // GIVEN: A request that has already completed
    let mut harness = harness(test_registry());
    let id = CorrelationId::from("once");
    let response = harness
        .handler
        .handle(id.clone(), &request("test:add", json!({ "a": 1, "b": 2 })))
        .await
        .expect("First completion");
    assert_eq!(response.result, Some(json!(3)));
    next_script(&mut harness.scripts).await;

    // WHEN: Completing it again
    let error = harness
        .handler
        .complete(&id, &Ok(json!(99)))
        .expect_err("Second completion must fail");

    // THEN: Rejected and nothing else is delivered
    assert!(matches!(error, IpcError::CompletionRejected { .. }));
    assert!(harness.scripts.try_recv().is_err());
}

/// **VALUE**: A correlation id already in flight is refused at receipt; the first request is unaffected.
#[tokio::test]
async fn given_id_in_flight_when_same_id_received_then_second_is_rejected() {
    // GIVEN: A slow request in flight
    let mut harness = harness(test_registry());
    let id = CorrelationId::from("dup");
    harness
        .handler
        .receive(id.clone(), request("test:sleep", json!({ "ms": 100 })))
        .expect("First request accepted");

    // WHEN: Another request reuses the id
    let second = harness
        .handler
        .receive(id.clone(), request("test:add", json!({ "a": 1, "b": 1 })));
    let awaited = harness
        .handler
        .handle(id.clone(), &request("test:add", json!({ "a": 1, "b": 1 })))
        .await;

    // THEN: Both reuses are refused and only the first request answers
    assert!(second.is_none());
    assert!(matches!(awaited, Err(IpcError::DuplicateCorrelation { .. })));
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.correlation_id, id);
    assert_eq!(response.result, Some(json!(100)));
    assert!(
        timeout(Duration::from_millis(200), harness.scripts.recv())
            .await
            .is_err(),
        "No second response expected"
    );
}

/// **VALUE**: Cancelling an in-flight request lets a cooperative handler return early.
#[tokio::test]
async fn given_invoking_request_when_cancelled_then_handler_returns_early() {
    // GIVEN: A long request that has reached its handler
    let mut harness = harness(test_registry());
    let id = CorrelationId::from("long");
    harness
        .handler
        .receive(id.clone(), request("test:sleep", json!({ "ms": 10_000 })))
        .expect("Request should be accepted");
    timeout(Duration::from_secs(2), async {
        while harness.handler.phase(&id) != Some(RequestPhase::Invoking) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Request never reached its handler");

    // WHEN: The request is cancelled
    assert!(harness.handler.cancel(&id));

    // THEN: It still completes exactly once, with the handler's early answer
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.correlation_id, id);
    assert_eq!(response.error.as_deref(), Some("cancelled"));
    assert!(!harness.handler.cancel(&id), "Nothing left to cancel");
}

// ============================================
// BRIDGE WIRING
// ============================================

/// **VALUE**: Requests triggered through the bound hook reach the dispatch loop end to end.
#[tokio::test]
async fn given_attached_loop_when_hook_triggered_then_response_is_evaluated() {
    // GIVEN: Dispatch loop bound to the bridge
    let mut harness = harness(test_registry());
    harness.handler.attach().expect("Attach");

    // WHEN: The UI side triggers the invoke hook with a numeric id
    let delivered = harness
        .bridge
        .trigger(INVOKE_HOOK, 7_u64, request("bridge:ping", json!(null)));

    // THEN: The built-in ping answers under that id
    assert!(delivered);
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.correlation_id, CorrelationId::from("7"));
    assert_eq!(response.result.expect("result")["pong"], json!(true));
}

/// **VALUE**: A loop can only be attached once per bridge.
#[tokio::test]
async fn given_attached_loop_when_attached_again_then_bridge_error() {
    // GIVEN: Dispatch loop already bound
    let harness = harness(test_registry());
    harness.handler.attach().expect("First attach");

    // WHEN / THEN: Binding the hook again fails
    assert!(matches!(
        harness.handler.attach(),
        Err(IpcError::Bridge(_))
    ));
}

/// **VALUE**: `bridge:commands` lists every registered command with its parameter plan.
#[tokio::test]
async fn given_registered_commands_when_listing_then_plans_are_returned() {
    // GIVEN: Dispatch loop with the test commands
    let harness = harness(test_registry());

    // WHEN: Listing commands
    let response = harness
        .handler
        .handle(CorrelationId::from(1_u64), &request("bridge:commands", json!({})))
        .await
        .expect("Dispatch");

    // THEN: Test and built-in commands are present
    let listed = response.result.expect("result");
    let names: Vec<&str> = listed
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|spec| spec["name"].as_str())
        .collect();
    assert!(names.contains(&"test:add"));
    assert!(names.contains(&"bridge:ping"));
    assert!(names.contains(&"bridge:commands"));
}
