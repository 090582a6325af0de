//! Notes stored as JSON in the plugin's data directory.
//!
//! Requires the `fs:write` permission. Every change is written through to
//! `notes.json` and announced as a `notes:changed` event carrying the new
//! count. `max_notes` in the `[notes]` table caps the collection.

use crate::error::NotesError;

use bridge_core::command::{CommandHandler, CommandMap, Registrar};
use bridge_core::error::{InvokeError, PluginError, RegistrarError};
use bridge_core::event::EventEmitter;
use bridge_core::plugin::{Plugin, PluginContext, PluginLogger};
use bridge_core::serializer::{CommandSpec, ValueKind};

use common::ErrorLocation;

use std::fs;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

pub const PLUGIN_ID: &str = "notes";
pub const PERMISSION: &str = "fs:write";
pub const CHANGED_EVENT: &str = "notes:changed";
pub const NOTES_FILE_NAME: &str = "notes.json";

const DEFAULT_MAX_NOTES: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: u64,
}

pub struct NotesPlugin {
    store: Option<Arc<NoteStore>>,
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl NotesPlugin {
    pub fn new() -> Self {
        Self {
            store: None,
            handlers: Vec::new(),
        }
    }
}

impl Default for NotesPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for NotesPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Notes"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn required_permissions(&self) -> Vec<String> {
        vec![String::from(PERMISSION)]
    }

    fn initialize(&mut self, context: &PluginContext) -> Result<(), PluginError> {
        context.require_permission(PERMISSION)?;

        let dir = context
            .ensure_plugin_data_dir()
            .map_err(|e| PluginError::init(PLUGIN_ID, format!("cannot create data directory: {e}")))?;
        let max_notes = context
            .config()
            .get_as::<usize>("max_notes")
            .unwrap_or(DEFAULT_MAX_NOTES);

        let logger = context.logger("store");
        let store = NoteStore::open(dir, max_notes, logger)
            .map_err(|e| PluginError::init(PLUGIN_ID, e.reason()))?;
        let store = Arc::new(store);

        self.handlers = vec![Arc::new(NotesCommands {
            store: Arc::clone(&store),
            emitter: context.emitter().clone(),
        })];
        self.store = Some(store);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PluginError> {
        if let Some(store) = self.store.take() {
            store
                .flush()
                .map_err(|e| PluginError::shutdown(PLUGIN_ID, e.reason()))?;
        }
        self.handlers.clear();
        Ok(())
    }

    fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        self.handlers.clone()
    }
}

/// In-memory notes with write-through persistence.
pub struct NoteStore {
    path: PathBuf,
    max_notes: usize,
    notes: Mutex<Vec<Note>>,
    logger: PluginLogger,
}

impl NoteStore {
    /// Loads `notes.json` from `dir`; a missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`NotesError::Read`] or [`NotesError::Parse`] if the file
    /// exists but cannot be loaded.
    pub fn open(dir: &Path, max_notes: usize, logger: PluginLogger) -> Result<Self, NotesError> {
        let path = dir.join(NOTES_FILE_NAME);
        let notes = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| NotesError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;
            serde_json::from_str(&contents).map_err(|e| NotesError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?
        } else {
            Vec::new()
        };

        logger.debug(format!("loaded {} notes from {}", notes.len(), path.display()));
        Ok(Self {
            path,
            max_notes,
            notes: Mutex::new(notes),
            logger,
        })
    }

    pub fn list(&self) -> Vec<Note> {
        self.notes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.lock().is_empty()
    }

    /// # Errors
    ///
    /// Returns [`NotesError::LimitReached`] if the store is full, or
    /// [`NotesError::Write`] if it cannot be saved.
    pub fn add(&self, title: String, body: String) -> Result<Note, NotesError> {
        let mut notes = self.notes.lock();
        if notes.len() >= self.max_notes {
            return Err(NotesError::LimitReached {
                limit: self.max_notes,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let note = Note {
            id: Uuid::new_v4().to_string(),
            title,
            body,
            created_at: epoch_millis(),
        };
        notes.push(note.clone());
        if let Err(e) = write_notes(&self.path, &notes) {
            notes.pop();
            return Err(e);
        }
        Ok(note)
    }

    /// Returns whether a note with `id` existed.
    ///
    /// # Errors
    ///
    /// Returns [`NotesError::Write`] if the store cannot be saved.
    pub fn remove(&self, id: &str) -> Result<bool, NotesError> {
        let mut notes = self.notes.lock();
        let Some(index) = notes.iter().position(|note| note.id == id) else {
            return Ok(false);
        };

        let removed = notes.remove(index);
        if let Err(e) = write_notes(&self.path, &notes) {
            notes.insert(index, removed);
            return Err(e);
        }
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`NotesError::Write`] if the store cannot be saved.
    pub fn flush(&self) -> Result<(), NotesError> {
        let notes = self.notes.lock();
        write_notes(&self.path, &notes)?;
        self.logger
            .info(format!("saved {} notes to {}", notes.len(), self.path.display()));
        Ok(())
    }
}

/// Writes to a temp file first so a crash never leaves a truncated store.
fn write_notes(path: &Path, notes: &[Note]) -> Result<(), NotesError> {
    let write_error = |target: &Path, message: String| NotesError::Write {
        path: target.display().to_string(),
        message,
        location: ErrorLocation::from(Location::caller()),
    };

    let contents = serde_json::to_string_pretty(notes)
        .map_err(|e| write_error(path, format!("cannot serialize notes: {e}")))?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, contents).map_err(|e| write_error(&temp_path, e.to_string()))?;
    fs::rename(&temp_path, path).map_err(|e| write_error(path, format!("cannot replace: {e}")))
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

struct NotesCommands {
    store: Arc<NoteStore>,
    emitter: EventEmitter,
}

impl NotesCommands {
    fn announce(&self) {
        self.emitter
            .emit(CHANGED_EVENT, json!({ "count": self.store.len() }));
    }
}

impl CommandHandler for NotesCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(
                CommandSpec::new("notes:list").returns(ValueKind::Array),
                |notes, _args| Ok::<_, InvokeError>(notes.store.list()),
            )
            .command_sync(
                CommandSpec::new("notes:add")
                    .param("title", ValueKind::String)
                    .optional("body", ValueKind::String)
                    .returns(ValueKind::Record),
                |notes, args| {
                    let title: String = args.get("title")?;
                    if title.trim().is_empty() {
                        return Err(InvokeError::handler("title must not be empty"));
                    }
                    let body: String = args.get_optional("body")?.unwrap_or_default();
                    let note = notes
                        .store
                        .add(title, body)
                        .map_err(|e| InvokeError::handler(e.reason()))?;
                    notes.announce();
                    Ok(note)
                },
            )
            .command_sync(
                CommandSpec::new("notes:remove")
                    .param("id", ValueKind::String)
                    .returns(ValueKind::Boolean),
                |notes, args| {
                    let id: String = args.get("id")?;
                    let removed = notes
                        .store
                        .remove(&id)
                        .map_err(|e| InvokeError::handler(e.reason()))?;
                    if removed {
                        notes.announce();
                    }
                    Ok(removed)
                },
            )
            .finish()
    }
}
