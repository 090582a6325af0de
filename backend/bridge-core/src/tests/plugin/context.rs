use crate::config::PluginSettings;
use crate::error::PluginError;
use crate::event::EventEmitter;
use crate::plugin::{PluginContext, PluginServices};
use crate::registry::CommandRegistry;

use std::path::Path;

use tempfile::TempDir;

fn context_in(app_data_dir: &Path, declared: &[&str]) -> PluginContext {
    let settings = PluginSettings::parse("[notes]\nmax_notes = 5\n").expect("valid toml");
    let declared: Vec<String> = declared.iter().map(|p| p.to_string()).collect();
    PluginServices::new(
        EventEmitter::new(),
        CommandRegistry::new(),
        app_data_dir.to_path_buf(),
    )
    .with_settings(settings)
    .context_for("notes", &declared)
    .expect("declared policy grants everything")
}

/// **VALUE**: Plugin loggers log under `plugin::<id>::<name>`.
///
/// **WHY THIS MATTERS**: Log filtering and the log file rely on the target to
/// tell which plugin said what.
#[test]
fn given_context_when_creating_logger_then_target_names_plugin_and_logger() {
    let dir = TempDir::new().expect("temp dir");
    let context = context_in(dir.path(), &[]);

    let logger = context.logger("sync");

    assert_eq!(logger.target(), "plugin::notes::sync");
    logger.info("logger works without a global logger installed");
}

/// **VALUE**: The permission predicate reflects exactly what was granted.
#[test]
fn given_granted_permissions_when_checking_then_only_those_pass() {
    let dir = TempDir::new().expect("temp dir");
    let context = context_in(dir.path(), &["fs:write"]);

    assert!(context.has_permission("fs:write"));
    assert!(!context.has_permission("net:connect"));
    assert!(context.require_permission("fs:write").is_ok());

    let error = context
        .require_permission("net:connect")
        .expect_err("not granted");
    assert!(matches!(
        error,
        PluginError::PermissionDenied { ref plugin, ref permission, .. }
            if plugin == "notes" && permission == "net:connect"
    ));
}

/// **VALUE**: Each plugin gets its own data directory under the app data directory,
/// created only on request.
#[test]
fn given_context_when_ensuring_data_dir_then_directory_is_created_under_app_dir() {
    let dir = TempDir::new().expect("temp dir");
    let context = context_in(dir.path(), &[]);

    assert_eq!(context.app_data_dir(), dir.path());
    assert_eq!(context.plugin_data_dir(), dir.path().join("plugins").join("notes"));
    assert!(!context.plugin_data_dir().exists());

    let created = context.ensure_plugin_data_dir().expect("created");

    assert!(created.is_dir());
}

/// **VALUE**: The config view exposes this plugin's settings table only.
#[test]
fn given_plugin_settings_when_reading_context_config_then_own_table_is_visible() {
    let dir = TempDir::new().expect("temp dir");
    let context = context_in(dir.path(), &[]);

    assert_eq!(context.config().get_as::<u32>("max_notes"), Some(5));
    assert_eq!(context.plugin_id(), "notes");
}
