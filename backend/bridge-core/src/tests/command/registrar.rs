use crate::command::{CommandHandler, CommandMap, Registrar};
use crate::error::{InvokeError, RegistrarError};
use crate::serializer::{CommandSpec, ValueKind};
use crate::tests::fixtures::MathCommands;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

struct Greeter {
    greeting: String,
    calls: AtomicUsize,
}

impl Greeter {
    fn new(greeting: &str) -> Arc<Self> {
        Arc::new(Self {
            greeting: greeting.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl CommandHandler for Greeter {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(
                CommandSpec::new("greeter:greet")
                    .param("name", ValueKind::String)
                    .returns(ValueKind::String),
                |greeter, args| {
                    greeter.calls.fetch_add(1, Ordering::SeqCst);
                    let name: String = args.get("name")?;
                    Ok(format!("{}, {name}", greeter.greeting))
                },
            )
            .command(
                CommandSpec::new("greeter:later")
                    .param("name", ValueKind::String)
                    .returns(ValueKind::String),
                |greeter, args| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    let name: String = args.get("name")?;
                    Ok::<_, InvokeError>(format!("{} later, {name}", greeter.greeting))
                },
            )
            .finish()
    }
}

/// Handler whose single declaration is supplied by the test.
struct Declares(CommandSpec);

impl CommandHandler for Declares {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        let spec = self.0.clone();
        Registrar::new(self)
            .command_sync(spec, |_declares, _args| Ok::<_, InvokeError>(json!(null)))
            .finish()
    }
}

fn declare(spec: CommandSpec) -> Result<CommandMap, RegistrarError> {
    Arc::new(Declares(spec)).create_invokers()
}

// ============================================
// NAMING RULES
// ============================================

/// **VALUE**: Plugin and host handlers cannot claim the bridge's own namespace.
///
/// **WHY THIS MATTERS**: `bridge:` commands are what the UI uses to discover
/// everything else; a plugin shadowing them would break introspection.
///
/// **BUG THIS CATCHES**: Would catch if the reserved-prefix check ran after
/// insertion or only at registry merge time.
#[test]
fn given_reserved_prefix_when_creating_invokers_then_fails_at_construction() {
    let bridge = declare(CommandSpec::new("bridge:commands")).expect_err("bridge: is reserved");
    let hidden = declare(CommandSpec::new("__internal:run")).expect_err("__ is reserved");

    assert!(matches!(
        bridge,
        RegistrarError::ReservedName { prefix: "bridge:", .. }
    ));
    assert!(matches!(
        hidden,
        RegistrarError::ReservedName { prefix: "__", .. }
    ));
}

/// **VALUE**: Names must be `namespace:action`.
#[test]
fn given_malformed_names_when_creating_invokers_then_invalid_name() {
    for name in ["add", ":add", "math:", "math add:x", ""] {
        let error = declare(CommandSpec::new(name)).expect_err("malformed name");
        assert!(
            matches!(error, RegistrarError::InvalidName { .. }),
            "'{name}' should be rejected, got {error:?}"
        );
    }
}

/// **VALUE**: Declaring the same command twice on one type is caught by the registrar.
#[test]
fn given_same_command_declared_twice_when_finishing_then_duplicate_declaration() {
    let error = Registrar::new(Arc::new(MathCommands))
        .command_sync(CommandSpec::new("math:one"), |_m, _a| Ok::<_, InvokeError>(1))
        .command_sync(CommandSpec::new("math:one"), |_m, _a| Ok::<_, InvokeError>(2))
        .finish()
        .expect_err("duplicate declaration");

    match error {
        RegistrarError::DuplicateDeclaration { name, handler, .. } => {
            assert_eq!(name, "math:one");
            assert!(handler.ends_with("MathCommands"));
        }
        other => panic!("Expected DuplicateDeclaration, got {other:?}"),
    }
}

/// **VALUE**: A required parameter after an optional one is rejected.
///
/// **BUG THIS CATCHES**: Positional calls would otherwise bind a value to the
/// optional slot and leave the required one missing.
#[test]
fn given_required_after_optional_when_declaring_then_invalid_parameter() {
    let spec = CommandSpec::new("notes:find")
        .optional("limit", ValueKind::Integer)
        .param("query", ValueKind::String);

    let error = declare(spec).expect_err("ambiguous positional plan");
    assert!(matches!(error, RegistrarError::InvalidParameter { .. }));
}

// ============================================
// INVOKERS
// ============================================

/// **VALUE**: Two instances produce independent invoker sets, each bound to its own instance.
///
/// **WHY THIS MATTERS**: Plugins may register several instances of one
/// handler type; calls must never leak into the wrong instance's state.
#[tokio::test]
async fn given_two_instances_when_creating_invokers_then_each_is_bound_to_its_instance() {
    let hello = Greeter::new("Hello");
    let hola = Greeter::new("Hola");

    let hello_map = Arc::clone(&hello).create_invokers().expect("hello invokers");
    let hola_map = Arc::clone(&hola).create_invokers().expect("hola invokers");

    let english = hello_map["greeter:greet"]
        .invoke(&json!({ "name": "Ada" }))
        .await
        .expect("greet succeeds");
    let spanish = hola_map["greeter:greet"]
        .invoke(&json!({ "name": "Ada" }))
        .await
        .expect("greet succeeds");

    assert_eq!(english, json!("Hello, Ada"));
    assert_eq!(spanish, json!("Hola, Ada"));
    assert_eq!(hello.calls.load(Ordering::SeqCst), 1);
    assert_eq!(hola.calls.load(Ordering::SeqCst), 1);
}

/// **VALUE**: Asynchronous handlers complete later and their result is encoded like sync ones.
#[tokio::test]
async fn given_async_command_when_invoked_then_result_arrives_after_await() {
    let invokers = Greeter::new("Hi").create_invokers().expect("invokers");

    let result = invokers["greeter:later"]
        .invoke(&json!(["Grace"]))
        .await
        .expect("async greet succeeds");

    assert_eq!(result, json!("Hi later, Grace"));
}

/// **VALUE**: A decoding failure resolves without touching the handler.
///
/// **BUG THIS CATCHES**: Would catch if decoding happened inside the handler
/// closure, letting side effects run on bad input.
#[tokio::test]
async fn given_invalid_args_when_invoked_then_handler_is_not_called() {
    let greeter = Greeter::new("Hello");
    let invokers = Arc::clone(&greeter).create_invokers().expect("invokers");

    let error = invokers["greeter:greet"]
        .invoke(&json!({ "name": 5 }))
        .await
        .expect_err("number for string");

    assert!(matches!(error, InvokeError::Decoding { .. }));
    assert_eq!(greeter.calls.load(Ordering::SeqCst), 0);
}

/// **VALUE**: A handler's own error keeps its original message.
#[tokio::test]
async fn given_handler_error_when_invoked_then_original_message_is_kept() {
    let invokers = Arc::new(MathCommands).create_invokers().expect("invokers");

    let error = invokers["math:divide"]
        .invoke(&json!({ "a": 10, "b": 0 }))
        .await
        .expect_err("division by zero");

    assert!(matches!(error, InvokeError::Handler { .. }));
    assert_eq!(error.message(), "division by zero");
}
