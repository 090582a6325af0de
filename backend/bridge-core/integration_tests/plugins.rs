use crate::helpers::{harness, next_response, next_script, request, test_registry};

use bridge_core::bridge::Bridge;
use bridge_core::command::{CommandHandler, CommandMap, Registrar};
use bridge_core::error::{PluginError, RegistrarError};
use bridge_core::event::EventEmitter;
use bridge_core::ipc::protocol::parse_event_script;
use bridge_core::ipc::{CorrelationId, ErrorKind};
use bridge_core::plugin::{Plugin, PluginContext, PluginLoader, PluginServices, PluginState};
use bridge_core::serializer::{CommandSpec, ValueKind};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tempfile::TempDir;

struct CounterCommands {
    emitter: EventEmitter,
    count: AtomicU64,
}

impl CommandHandler for CounterCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(
                CommandSpec::new("counter:increment")
                    .optional("by", ValueKind::Integer)
                    .returns(ValueKind::Integer),
                |counter, args| {
                    let by: u64 = args.get_optional("by")?.unwrap_or(1);
                    let value = counter.count.fetch_add(by, Ordering::SeqCst) + by;
                    counter
                        .emitter
                        .emit("counter:changed", json!({ "value": value }));
                    Ok(value)
                },
            )
            .finish()
    }
}

/// Counts increments and announces each new value as an event.
struct CounterPlugin {
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl Plugin for CounterPlugin {
    fn id(&self) -> &str {
        "counter"
    }

    fn name(&self) -> &str {
        "Counter"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn initialize(&mut self, context: &PluginContext) -> Result<(), PluginError> {
        let start = context.config().get_as::<u64>("start").unwrap_or(0);
        self.handlers = vec![Arc::new(CounterCommands {
            emitter: context.emitter().clone(),
            count: AtomicU64::new(start),
        })];
        Ok(())
    }

    fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        self.handlers.clone()
    }
}

/// **VALUE**: A plugin's commands are callable once merged, its events reach the
/// UI, and after unloading its commands are gone.
///
/// **WHY THIS MATTERS**: This is the whole plugin lifecycle as the host runs it.
///
/// **BUG THIS CATCHES**: Would catch events bypassing the bridge, or unloaded
/// plugins leaving callable commands behind.
#[tokio::test]
async fn given_loaded_plugin_when_dispatching_and_unloading_then_full_lifecycle_holds() {
    // GIVEN: Dispatch loop, an emitter pushing to the same bridge, and a loaded plugin
    let registry = test_registry();
    let mut harness = harness(registry.clone());
    let bridge: Arc<dyn Bridge> = harness.bridge.clone();
    let emitter = EventEmitter::with_bridge(bridge);
    let data_dir = TempDir::new().expect("temp dir");

    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(CounterPlugin {
            handlers: Vec::new(),
        }))
        .expect("register");
    let report = loader.initialize_all(&PluginServices::new(
        emitter.clone(),
        registry.clone(),
        data_dir.path().to_path_buf(),
    ));
    assert!(report.is_clean());
    assert_eq!(loader.register_commands(&registry).expect("merge"), 1);
    assert_eq!(loader.state("counter"), Some(PluginState::Initialized));

    // WHEN: The UI calls the plugin's command
    harness
        .handler
        .receive(
            CorrelationId::from("inc"),
            request("counter:increment", json!({ "by": 2 })),
        )
        .expect("Request should be accepted");

    // THEN: The event is pushed before the response
    let event_script = next_script(&mut harness.scripts).await;
    let (name, envelope) = parse_event_script(&event_script).expect("event script");
    assert_eq!(name, "counter:changed");
    assert_eq!(envelope.payload, json!({ "value": 2 }));
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.result, Some(json!(2)));

    // WHEN: The plugin is unloaded
    loader.unload("counter", &registry).expect("unload");

    // THEN: Its command is unknown, built-in and test commands remain
    harness
        .handler
        .receive(
            CorrelationId::from("gone"),
            request("counter:increment", json!({})),
        )
        .expect("Request should be accepted");
    let response = next_response(&mut harness.scripts).await;
    assert_eq!(response.error_kind, Some(ErrorKind::UnknownCommand));
    assert!(registry.contains("bridge:ping"));
    assert!(registry.contains("test:add"));
    assert!(loader.is_empty());
}

/// **VALUE**: A plugin cannot claim a name a host handler already registered.
#[tokio::test]
async fn given_host_command_when_plugin_claims_same_name_then_merge_fails() {
    struct Squatter;

    impl CommandHandler for Squatter {
        fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
            Registrar::new(self)
                .command_sync(CommandSpec::new("test:add"), |_s, _args| Ok(0))
                .finish()
        }
    }

    struct SquatterPlugin;

    impl Plugin for SquatterPlugin {
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
        fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
            vec![Arc::new(Squatter)]
        }
    }

    // GIVEN: A registry already holding `test:add`
    let registry = test_registry();
    let data_dir = TempDir::new().expect("temp dir");
    let mut loader = PluginLoader::new();
    loader.register(Box::new(SquatterPlugin)).expect("register");
    loader.initialize_all(&PluginServices::new(
        EventEmitter::new(),
        registry.clone(),
        data_dir.path().to_path_buf(),
    ));

    // WHEN: Merging the plugin's commands
    let error = loader.register_commands(&registry).expect_err("collision");

    // THEN: Registry error and the original command still answers
    assert!(matches!(error, PluginError::Registry(_)));
    let answer = registry
        .resolve("test:add")
        .expect("original kept")
        .invoke(&json!({ "a": 1, "b": 2 }))
        .await
        .expect("invoke");
    assert_eq!(answer, json!(3));
}
