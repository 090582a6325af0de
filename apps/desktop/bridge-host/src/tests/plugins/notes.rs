use crate::plugins::NotesPlugin;
use crate::plugins::notes::{CHANGED_EVENT, NOTES_FILE_NAME, PERMISSION};
use crate::tests::fixtures::{load, load_with};

use bridge_core::error::PluginError;
use bridge_core::plugin::{PermissionPolicy, PluginState};

use std::collections::BTreeMap;
use std::fs;

use serde_json::json;
use tempfile::TempDir;

// ============================================
// COMMANDS
// ============================================

/// **VALUE**: Notes can be added, listed and removed; each change is persisted
/// and announced.
///
/// **WHY THIS MATTERS**: This is the plugin's whole contract with the UI.
#[tokio::test]
async fn given_notes_plugin_when_adding_and_removing_then_store_and_events_follow() {
    // GIVEN: Notes plugin with its default permission grant
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(Box::new(NotesPlugin::new()), "", dir.path());
    let events = loaded.record_events();

    // WHEN: Adding a note
    let note = loaded
        .call("notes:add", json!({ "title": "Groceries", "body": "milk" }))
        .await
        .expect("add");

    // THEN: It is listed, stored on disk and announced
    let id = note["id"].as_str().expect("id").to_string();
    assert_eq!(note["title"], json!("Groceries"));
    let listed = loaded.call("notes:list", json!({})).await.expect("list");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    let file = dir.path().join("plugins").join("notes").join(NOTES_FILE_NAME);
    assert!(fs::read_to_string(&file).expect("notes file").contains("Groceries"));

    // WHEN: Removing it, then removing it again
    let removed = loaded.call("notes:remove", json!({ "id": id })).await;
    let again = loaded.call("notes:remove", json!({ "id": id })).await;

    // THEN: First removal succeeds, the second reports nothing removed
    assert_eq!(removed, Ok(json!(true)));
    assert_eq!(again, Ok(json!(false)));
    let counts: Vec<_> = events
        .lock()
        .iter()
        .filter(|event| event.name() == CHANGED_EVENT)
        .map(|event| event.payload()["count"].clone())
        .collect();
    assert_eq!(counts, vec![json!(1), json!(0)]);
}

/// **VALUE**: Blank titles and a full store are refused.
#[tokio::test]
async fn given_limits_when_adding_then_blank_title_and_overflow_are_refused() {
    // GIVEN: A store capped at one note
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(
        Box::new(NotesPlugin::new()),
        "[notes]\nmax_notes = 1\n",
        dir.path(),
    );

    // WHEN / THEN: Blank title
    assert_eq!(
        loaded.call("notes:add", json!({ "title": "  " })).await,
        Err(String::from("title must not be empty"))
    );

    // WHEN / THEN: Second note over the limit
    loaded
        .call("notes:add", json!({ "title": "first" }))
        .await
        .expect("first note fits");
    assert_eq!(
        loaded.call("notes:add", json!({ "title": "second" })).await,
        Err(String::from("note limit of 1 reached"))
    );
}

// ============================================
// LIFECYCLE
// ============================================

/// **VALUE**: Notes survive a shutdown and reload.
#[tokio::test]
async fn given_saved_notes_when_plugin_reloaded_then_notes_are_restored() {
    // GIVEN: A note added, then the plugin shut down
    let dir = TempDir::new().expect("temp dir");
    let mut first = load(Box::new(NotesPlugin::new()), "", dir.path());
    first
        .call("notes:add", json!({ "title": "keep me" }))
        .await
        .expect("add");
    assert_eq!(first.loader.shutdown_all(), vec![String::from("notes")]);

    // WHEN: Loading again over the same directory
    let second = load(Box::new(NotesPlugin::new()), "", dir.path());

    // THEN: The note is back
    let listed = second.call("notes:list", json!({})).await.expect("list");
    assert_eq!(listed[0]["title"], json!("keep me"));
}

/// **VALUE**: Without the `fs:write` grant under the explicit policy, the plugin fails to load.
///
/// **BUG THIS CATCHES**: Would catch the plugin touching the disk before its
/// permission is checked.
#[test]
fn given_explicit_policy_without_grant_when_loading_then_plugin_fails() {
    // GIVEN / WHEN: Explicit policy with no grants
    let dir = TempDir::new().expect("temp dir");
    let loaded = load_with(Box::new(NotesPlugin::new()), "", dir.path(), |services| {
        services.with_policy(PermissionPolicy::Explicit, BTreeMap::new())
    });

    // THEN: Init failed, nothing written, no commands
    assert_eq!(loaded.loader.state("notes"), Some(PluginState::Failed));
    assert!(matches!(
        &loaded.report.failed[0],
        PluginError::Init { message, .. } if message.contains(PERMISSION)
    ));
    assert!(!dir.path().join("plugins").exists());
    assert!(!loaded.registry.contains("notes:add"));
}

/// **VALUE**: A corrupted notes file fails init with a readable message.
#[test]
fn given_corrupted_notes_file_when_loading_then_plugin_fails() {
    // GIVEN: Garbage where the notes file lives
    let dir = TempDir::new().expect("temp dir");
    let notes_dir = dir.path().join("plugins").join("notes");
    fs::create_dir_all(&notes_dir).expect("dir");
    fs::write(notes_dir.join(NOTES_FILE_NAME), "not json").expect("write");

    // WHEN: Loading
    let loaded = load(Box::new(NotesPlugin::new()), "", dir.path());

    // THEN: Failed init mentioning the parse problem
    assert!(matches!(
        &loaded.report.failed[0],
        PluginError::Init { message, .. } if message.starts_with("cannot parse")
    ));
}
