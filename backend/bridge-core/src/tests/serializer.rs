use crate::error::InvokeError;
use crate::serializer::{CommandSpec, ValueKind};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i64,
    y: i64,
}

fn add_spec() -> CommandSpec {
    CommandSpec::new("math:add")
        .param("a", ValueKind::Integer)
        .param("b", ValueKind::Integer)
        .returns(ValueKind::Integer)
}

fn decoding_parameter(error: &InvokeError) -> &str {
    match error {
        InvokeError::Decoding { parameter, .. } => parameter,
        other => panic!("Expected a decoding error, got {other:?}"),
    }
}

// ============================================
// DECODING
// ============================================

/// **VALUE**: Named arguments decode into the declared Rust types.
///
/// **BUG THIS CATCHES**: Would catch if decoding dropped declared keys or
/// handed handlers the wrong value for a name.
#[test]
fn given_object_args_when_decoded_then_values_are_available_by_name() {
    let args = add_spec()
        .decode(&json!({ "a": 2, "b": 40, "ignored": true }))
        .expect("valid args should decode");

    assert_eq!(args.get::<i64>("a").expect("a"), 2);
    assert_eq!(args.get::<i64>("b").expect("b"), 40);
    assert!(!args.contains("ignored"), "Undeclared keys are not carried");
    assert_eq!(args.len(), 2);
}

/// **VALUE**: A missing required value is reported against the parameter's name.
///
/// **WHY THIS MATTERS**: The UI gets "invalid parameter 'b'" instead of a
/// generic failure, and the handler never runs with half its inputs.
#[test]
fn given_missing_required_param_when_decoded_then_error_names_parameter() {
    let error = add_spec()
        .decode(&json!({ "a": 2 }))
        .expect_err("missing b must fail");

    assert_eq!(decoding_parameter(&error), "b");
    assert_eq!(error.message(), "missing required value");
}

/// **VALUE**: A value of the wrong JSON type is a decoding failure, not a handler failure.
///
/// **BUG THIS CATCHES**: Would catch if shape checks were skipped and the
/// handler's own cast produced the error instead.
#[test]
fn given_wrong_type_when_decoded_then_decoding_error_describes_mismatch() {
    let error = add_spec()
        .decode(&json!({ "a": "two", "b": 1 }))
        .expect_err("string for integer must fail");

    assert_eq!(decoding_parameter(&error), "a");
    assert_eq!(error.message(), "expected integer, got string");
}

/// **VALUE**: A float is not accepted where an integer is declared.
#[test]
fn given_float_for_integer_when_decoded_then_rejected() {
    let error = add_spec()
        .decode(&json!({ "a": 1.5, "b": 1 }))
        .expect_err("1.5 is not an integer");

    assert_eq!(error.message(), "expected integer, got float");
}

/// **VALUE**: A JSON array binds to the declared parameters by position.
#[test]
fn given_positional_args_when_decoded_then_bound_in_declaration_order() {
    let args = add_spec()
        .decode(&json!([7, 8]))
        .expect("positional args should decode");

    assert_eq!(args.get::<i64>("a").expect("a"), 7);
    assert_eq!(args.get::<i64>("b").expect("b"), 8);
}

/// **VALUE**: Surplus positional arguments are rejected instead of silently dropped.
#[test]
fn given_too_many_positional_args_when_decoded_then_first_surplus_position_is_named() {
    let error = add_spec()
        .decode(&json!([1, 2, 3]))
        .expect_err("three args for two params");

    assert_eq!(decoding_parameter(&error), "#2");
}

/// **VALUE**: Optional parameters accept both absence and `null`.
#[test]
fn given_optional_param_absent_or_null_when_decoded_then_none() {
    let spec = CommandSpec::new("notes:list").optional("limit", ValueKind::Integer);

    let absent = spec.decode(&json!({})).expect("absent optional is fine");
    let null = spec.decode(&json!({ "limit": null })).expect("null optional is fine");
    let nothing = spec.decode(&Value::Null).expect("null args are fine");

    assert_eq!(absent.get_optional::<i64>("limit").expect("decode"), None);
    assert_eq!(null.get_optional::<i64>("limit").expect("decode"), None);
    assert!(nothing.is_empty());
}

/// **VALUE**: Arguments that are neither object, array nor null are refused as a whole.
#[test]
fn given_scalar_args_when_decoded_then_args_parameter_is_blamed() {
    let error = add_spec()
        .decode(&json!("1,2"))
        .expect_err("a string is not an argument list");

    assert_eq!(decoding_parameter(&error), "args");
}

/// **VALUE**: `map` parameters come back as an untyped key-value object.
#[test]
fn given_map_param_when_read_then_returns_raw_object() {
    let spec = CommandSpec::new("settings:apply").param("values", ValueKind::Map);
    let args = spec
        .decode(&json!({ "values": { "theme": "dark", "size": 3 } }))
        .expect("object accepted for map");

    let values = args.map("values").expect("map present");
    assert_eq!(values.get("theme"), Some(&json!("dark")));
    assert_eq!(values.len(), 2);
}

// ============================================
// ENCODING
// ============================================

/// **VALUE**: decode(encode(x)) == x for a structured record.
///
/// **WHY THIS MATTERS**: Results and arguments travel through the same JSON
/// representation; a lossy encoding would corrupt values on their way to the UI.
#[test]
fn given_record_result_when_encoded_and_decoded_then_value_is_preserved() {
    let spec = CommandSpec::new("geo:mirror")
        .param("point", ValueKind::Record)
        .returns(ValueKind::Record);
    let point = Point { x: -3, y: 9 };

    let encoded = spec.encode(&point).expect("record encodes");
    let args = spec
        .decode(&json!({ "point": encoded }))
        .expect("encoded record decodes");

    assert_eq!(args.get::<Point>("point").expect("point"), point);
}

/// **VALUE**: A result that does not match the declared kind is an encoding failure.
///
/// **BUG THIS CATCHES**: Would catch a handler returning a string where the
/// UI was promised a number, before the UI ever sees it.
#[test]
fn given_result_of_wrong_kind_when_encoded_then_encoding_error() {
    let error = add_spec()
        .encode("forty-two")
        .expect_err("string for integer result");

    match error {
        InvokeError::Encoding { message, .. } => {
            assert_eq!(message, "declared integer result but handler produced string");
        }
        other => panic!("Expected an encoding error, got {other:?}"),
    }
}

/// **VALUE**: `Any` accepts every JSON value, including null.
#[test]
fn given_any_kind_when_checking_values_then_everything_is_accepted() {
    for value in [json!(null), json!(1), json!("s"), json!([1]), json!({ "k": 1 })] {
        assert!(ValueKind::Any.accepts(&value), "{value} should be accepted");
    }
    assert!(ValueKind::Float.accepts(&json!(3)), "integers are valid floats");
    assert!(!ValueKind::Integer.accepts(&json!(3.5)));
}
