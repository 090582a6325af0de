use crate::command::CommandHandler;
use crate::error::{PluginError, RegistryError};
use crate::event::EventEmitter;
use crate::plugin::{
    PermissionPolicy, Plugin, PluginContext, PluginLoader, PluginServices, PluginState,
};
use crate::registry::CommandRegistry;
use crate::tests::fixtures::{InitBehaviour, RecordingPlugin};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

fn services(registry: &CommandRegistry) -> PluginServices {
    PluginServices::new(
        EventEmitter::new(),
        registry.clone(),
        PathBuf::from("/tmp/bridge-core-tests"),
    )
}

fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================
// INITIALIZATION
// ============================================

/// **VALUE**: A plugin failing init is isolated; the next plugin still loads
/// and only its commands are merged.
///
/// **WHY THIS MATTERS**: One broken plugin must not take the whole host down.
///
/// **BUG THIS CATCHES**: Would catch an early return out of the init loop, or
/// a failed plugin's handlers being merged anyway.
#[test]
fn given_failing_plugin_when_initializing_all_then_others_load_and_its_commands_are_absent() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(
            RecordingPlugin::new("alpha", &journal).with_behaviour(InitBehaviour::Fail),
        ))
        .expect("register alpha");
    loader
        .register(Box::new(RecordingPlugin::new("beta", &journal)))
        .expect("register beta");

    let report = loader.initialize_all(&services(&registry));
    let merged = loader.register_commands(&registry).expect("merge");

    assert_eq!(report.initialized, vec![String::from("beta")]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(&report.failed[0], PluginError::Init { plugin, .. } if plugin == "alpha"));
    assert_eq!(loader.state("alpha"), Some(PluginState::Failed));
    assert_eq!(loader.state("beta"), Some(PluginState::Initialized));
    assert_eq!(merged, 1);
    assert!(registry.contains("beta:echo"));
    assert!(!registry.contains("alpha:echo"));
    assert_eq!(*journal.lock(), vec!["init:alpha", "init:beta"]);
}

/// **VALUE**: A plugin whose `initialize` panics is treated as a failed init.
#[test]
fn given_panicking_plugin_when_initializing_all_then_marked_failed() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(
            RecordingPlugin::new("boom", &journal).with_behaviour(InitBehaviour::Panic),
        ))
        .expect("register");
    loader
        .register(Box::new(RecordingPlugin::new("calm", &journal)))
        .expect("register");

    let report = loader.initialize_all(&services(&registry));

    assert_eq!(loader.state("boom"), Some(PluginState::Failed));
    assert_eq!(report.initialized, vec![String::from("calm")]);
    assert!(!report.is_clean());
}

/// **VALUE**: Plugin ids are unique within a loader.
#[test]
fn given_registered_id_when_registered_again_then_duplicate_plugin() {
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(RecordingPlugin::new("notes", &journal)))
        .expect("first");

    let error = loader
        .register(Box::new(RecordingPlugin::new("notes", &journal)))
        .expect_err("second");

    assert!(matches!(error, PluginError::DuplicatePlugin { .. }));
    assert_eq!(loader.len(), 1);
}

/// **VALUE**: Disabled plugins are skipped and stay `Registered`.
#[test]
fn given_disabled_plugin_when_initializing_all_then_skipped() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(RecordingPlugin::new("legacy", &journal)))
        .expect("register");

    let report = loader
        .initialize_all(&services(&registry).with_disabled(vec![String::from("legacy")]));

    assert_eq!(report.skipped, vec![String::from("legacy")]);
    assert_eq!(loader.state("legacy"), Some(PluginState::Registered));
    assert!(journal.lock().is_empty());
}

/// **VALUE**: Under the explicit policy an ungranted permission fails only that plugin.
///
/// **BUG THIS CATCHES**: Would catch `initialize` being called before the
/// permission check.
#[test]
fn given_explicit_policy_without_grant_when_initializing_then_plugin_fails_before_init() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(
            RecordingPlugin::new("files", &journal).with_permissions(&["fs:write"]),
        ))
        .expect("register");
    loader
        .register(Box::new(
            RecordingPlugin::new("reader", &journal).with_permissions(&["fs:read"]),
        ))
        .expect("register");

    let mut grants = BTreeMap::new();
    grants.insert(String::from("reader"), vec![String::from("fs:read")]);
    let report = loader.initialize_all(
        &services(&registry).with_policy(PermissionPolicy::Explicit, grants),
    );

    assert_eq!(loader.state("files"), Some(PluginState::Failed));
    assert_eq!(report.initialized, vec![String::from("reader")]);
    assert_eq!(*journal.lock(), vec!["init:reader"]);
}

// ============================================
// COMMAND MERGE
// ============================================

/// **VALUE**: Two plugins claiming the same command name abort the merge.
#[test]
fn given_two_plugins_with_same_command_when_merging_then_duplicate_command() {
    struct Twin(RecordingPlugin);

    impl Plugin for Twin {
        fn id(&self) -> &str {
            "twin"
        }
        fn name(&self) -> &str {
            self.0.name()
        }
        fn version(&self) -> &str {
            self.0.version()
        }
        fn initialize(&mut self, context: &PluginContext) -> Result<(), PluginError> {
            self.0.initialize(context)
        }
        fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
            self.0.command_handlers()
        }
    }

    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(RecordingPlugin::new("original", &journal)))
        .expect("register");
    // Registers under a different id but exposes `original:echo` again.
    loader
        .register(Box::new(Twin(RecordingPlugin::new("original", &journal))))
        .expect("register");
    loader.initialize_all(&services(&registry));

    let error = loader.register_commands(&registry).expect_err("collision");

    assert!(matches!(
        error,
        PluginError::Registry(RegistryError::DuplicateCommand { ref name, .. }) if name == "original:echo"
    ));
}

// ============================================
// SHUTDOWN AND UNLOAD
// ============================================

/// **VALUE**: Shutdown hooks run in reverse registration order.
///
/// **WHY THIS MATTERS**: Later plugins may depend on earlier ones; tearing
/// down in reverse keeps dependencies alive while dependents shut down.
#[test]
fn given_initialized_plugins_when_shutting_down_then_reverse_registration_order() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    for id in ["first", "second", "third"] {
        loader
            .register(Box::new(RecordingPlugin::new(id, &journal)))
            .expect("register");
    }
    loader.initialize_all(&services(&registry));
    journal.lock().clear();

    let order = loader.shutdown_all();

    assert_eq!(order, vec!["third", "second", "first"]);
    assert_eq!(
        *journal.lock(),
        vec!["shutdown:third", "shutdown:second", "shutdown:first"]
    );
    assert!(loader.is_empty());
}

/// **VALUE**: Shutdown skips plugins that never initialized.
#[test]
fn given_failed_plugin_when_shutting_down_then_its_hook_is_not_called() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(
            RecordingPlugin::new("broken", &journal).with_behaviour(InitBehaviour::Fail),
        ))
        .expect("register");
    loader.initialize_all(&services(&registry));

    let order = loader.shutdown_all();

    assert!(order.is_empty());
    assert_eq!(*journal.lock(), vec!["init:broken"]);
}

/// **VALUE**: Unloading removes exactly the plugin's own commands and runs its shutdown.
#[tokio::test]
async fn given_loaded_plugins_when_one_is_unloaded_then_only_its_commands_disappear() {
    let registry = CommandRegistry::new();
    let journal = journal();
    let mut loader = PluginLoader::new();
    loader
        .register(Box::new(RecordingPlugin::new("keep", &journal)))
        .expect("register");
    loader
        .register(Box::new(RecordingPlugin::new("drop", &journal)))
        .expect("register");
    loader.initialize_all(&services(&registry));
    loader.register_commands(&registry).expect("merge");
    assert_eq!(loader.commands_of("drop"), Some(&[String::from("drop:echo")][..]));

    loader.unload("drop", &registry).expect("unload");

    assert!(!registry.contains("drop:echo"));
    assert_eq!(loader.ids(), vec![String::from("keep")]);
    assert!(journal.lock().contains(&String::from("shutdown:drop")));
    let echoed = registry
        .resolve("keep:echo")
        .expect("kept")
        .invoke(&json!({ "value": "still here" }))
        .await
        .expect("echo");
    assert_eq!(echoed, json!("still here"));
}

/// **VALUE**: Unloading an unknown id is an error, not a silent no-op.
#[test]
fn given_unknown_id_when_unloading_then_not_found() {
    let mut loader = PluginLoader::new();

    let error = loader
        .unload("ghost", &CommandRegistry::new())
        .expect_err("unknown");

    assert!(matches!(error, PluginError::NotFound { .. }));
}

/// **VALUE**: The lifecycle only allows the documented transitions.
#[test]
fn given_plugin_states_when_checking_transitions_then_only_forward_moves_are_legal() {
    use PluginState::{Failed, Initialized, Registered, ShutDown};

    assert!(Registered.can_transition_to(Initialized));
    assert!(Registered.can_transition_to(Failed));
    assert!(Initialized.can_transition_to(ShutDown));

    assert!(!Registered.can_transition_to(ShutDown));
    assert!(!Initialized.can_transition_to(Registered));
    assert!(!ShutDown.can_transition_to(Initialized));
    assert!(!Failed.can_transition_to(Initialized));
    assert!(Failed.is_terminal() && ShutDown.is_terminal());
}
