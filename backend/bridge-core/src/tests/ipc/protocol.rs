use crate::error::DispatchError;
use crate::event::Event;
use crate::ipc::protocol::{
    CorrelationId, ErrorKind, Request, Response, event_script, parse_event_script,
    parse_response_script, response_script,
};

use serde_json::{Value, json};

fn protocol_message(raw: &str) -> String {
    match Request::parse(raw) {
        Err(DispatchError::Protocol { message, .. }) => message,
        other => panic!("Expected a protocol error for {raw}, got {other:?}"),
    }
}

// ============================================
// REQUEST PARSING
// ============================================

/// **VALUE**: A well-formed request yields its command and arguments.
#[test]
fn given_valid_request_when_parsed_then_command_and_args_extracted() {
    let request = Request::parse(r#"{"cmd":"math:add","args":{"a":1,"b":2}}"#)
        .expect("valid request parses");

    assert_eq!(request.command, "math:add");
    assert_eq!(request.args, json!({ "a": 1, "b": 2 }));
}

/// **VALUE**: Missing or null `args` both mean "no arguments".
#[test]
fn given_request_without_args_when_parsed_then_args_are_null() {
    let missing = Request::parse(r#"{"cmd":"bridge:ping"}"#).expect("parses");
    let null = Request::parse(r#"{"cmd":"bridge:ping","args":null}"#).expect("parses");

    assert_eq!(missing.args, Value::Null);
    assert_eq!(null.args, Value::Null);
}

/// **VALUE**: Every malformed shape is a protocol error and nothing else.
///
/// **WHY THIS MATTERS**: The dispatch loop must answer malformed input with a
/// structured failure rather than guessing at a command.
///
/// **BUG THIS CATCHES**: Would catch a request with a numeric `cmd` being
/// coerced to a string and dispatched.
#[test]
fn given_malformed_requests_when_parsed_then_protocol_errors() {
    assert!(protocol_message("{not json").starts_with("malformed request:"));
    assert_eq!(
        protocol_message("[1,2]"),
        "malformed request: expected a JSON object"
    );
    assert_eq!(
        protocol_message(r#"{"args":{}}"#),
        "malformed request: missing 'cmd'"
    );
    assert_eq!(
        protocol_message(r#"{"cmd":42}"#),
        "malformed request: 'cmd' must be a string"
    );
    assert_eq!(
        protocol_message(r#"{"cmd":"  "}"#),
        "malformed request: 'cmd' is empty"
    );
    assert_eq!(
        protocol_message(r#"{"cmd":"math:add","args":5}"#),
        "malformed request: 'args' must be an object, an array or null"
    );
}

/// **VALUE**: A request rendered with `to_json` parses back to itself.
#[test]
fn given_request_when_rendered_then_parses_back() {
    let request = Request {
        command: String::from("notes:add"),
        args: json!(["hello"]),
    };

    assert_eq!(Request::parse(&request.to_json()).expect("parses"), request);
}

// ============================================
// RESPONSES AND EVENTS
// ============================================

/// **VALUE**: Responses use camelCase keys and omit the side that does not apply.
///
/// **BUG THIS CATCHES**: Would catch snake_case `correlation_id` leaking onto
/// the wire, which the UI would never match.
#[test]
fn given_success_response_when_scripted_then_camel_case_envelope_is_called() {
    let response = Response::success(CorrelationId::from("req-7"), json!(42));

    let script = response_script(&response).expect("renders");

    assert_eq!(
        script,
        r#"window.__BRIDGE__.resolve({"correlationId":"req-7","success":true,"result":42})"#
    );
    assert_eq!(parse_response_script(&script), Some(response));
}

/// **VALUE**: A failure response carries the wire message and the error kind name.
#[test]
fn given_handler_failure_when_scripted_then_error_and_kind_are_present() {
    let error = DispatchError::Handler {
        command: String::from("math:divide"),
        message: String::from("division by zero"),
        location: common::ErrorLocation::caller(),
    };

    let response = Response::failure(CorrelationId::from(9_u64), &error);
    let script = response_script(&response).expect("renders");
    let parsed = parse_response_script(&script).expect("parses back");

    assert!(!parsed.success);
    assert_eq!(parsed.correlation_id.as_str(), "9");
    assert_eq!(parsed.error.as_deref(), Some("division by zero"));
    assert_eq!(parsed.error_kind, Some(ErrorKind::Handler));
    assert!(script.contains(r#""errorKind":"HandlerError""#));
    assert!(parsed.result.is_none());
}

/// **VALUE**: Event scripts carry the JSON-quoted name and the payload envelope.
#[test]
fn given_event_when_scripted_then_name_is_quoted_and_envelope_follows() {
    let event = Event::new("say \"hi\"", json!({ "n": 1 }));

    let script = event_script(&event).expect("renders");
    let (name, envelope) = parse_event_script(&script).expect("parses back");

    assert!(script.starts_with(r#"window.__BRIDGE__.emit("say \"hi\"", {"payload""#));
    assert_eq!(name, "say \"hi\"");
    assert_eq!(envelope.payload, json!({ "n": 1 }));
    assert_eq!(envelope.timestamp, event.timestamp());
}

/// **VALUE**: Scripts for other callbacks are not mistaken for responses.
#[test]
fn given_event_script_when_parsed_as_response_then_none() {
    let script = event_script(&Event::new("x", json!(null))).expect("renders");

    assert_eq!(parse_response_script(&script), None);
}
