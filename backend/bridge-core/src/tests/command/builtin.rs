use crate::command::BridgeCommands;
use crate::command::builtin::{LIST_COMMANDS, PING};
use crate::error::InvokeError;
use crate::registry::CommandRegistry;
use crate::tests::fixtures::MathCommands;

use std::sync::Arc;

use serde_json::{Value, json};

fn registry_with_builtins() -> CommandRegistry {
    let registry = CommandRegistry::new();
    registry
        .register_handler(Arc::new(BridgeCommands::new(&registry)))
        .expect("built-ins register");
    registry
}

/// **VALUE**: `bridge:commands` lists every registered command with its parameter plan.
///
/// **WHY THIS MATTERS**: The UI uses this listing to check which commands the
/// backend it talks to actually offers.
#[tokio::test]
async fn given_registered_commands_when_listing_then_signatures_are_returned_sorted() {
    let registry = registry_with_builtins();
    registry
        .register_handler(Arc::new(MathCommands))
        .expect("math registers");

    let listing = registry
        .resolve(LIST_COMMANDS)
        .expect("built-in present")
        .invoke(&Value::Null)
        .await
        .expect("listing succeeds");

    let names: Vec<&str> = listing
        .as_array()
        .expect("array result")
        .iter()
        .filter_map(|spec| spec["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec!["bridge:commands", "bridge:ping", "math:add", "math:divide"]
    );

    let add = &listing[2];
    assert_eq!(add["params"][0], json!({ "name": "a", "kind": "integer", "required": true }));
    assert_eq!(add["returns"], json!("integer"));
}

/// **VALUE**: `bridge:ping` answers with the crate version.
#[tokio::test]
async fn given_builtins_when_pinged_then_pong_with_version() {
    let registry = registry_with_builtins();

    let pong = registry
        .resolve(PING)
        .expect("built-in present")
        .invoke(&json!({}))
        .await
        .expect("ping succeeds");

    assert_eq!(pong["pong"], json!(true));
    assert_eq!(pong["version"], json!(env!("CARGO_PKG_VERSION")));
}

/// **VALUE**: The listing command does not keep its registry alive.
///
/// **BUG THIS CATCHES**: Would catch a strong reference cycle between the
/// registry and its own built-in handler, and a panic when the registry is gone.
#[tokio::test]
async fn given_registry_dropped_when_listing_then_handler_error_instead_of_panic() {
    let registry = registry_with_builtins();
    let listing = registry.resolve(LIST_COMMANDS).expect("built-in present");
    drop(registry);

    let error = listing
        .invoke(&Value::Null)
        .await
        .expect_err("registry is gone");

    assert!(matches!(error, InvokeError::Handler { .. }));
    assert_eq!(error.message(), "command registry is gone");
}
