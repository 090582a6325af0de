//! Process-wide command table.
//!
//! The registry merges the maps produced by every registrar (the host's own
//! handlers and each loaded plugin's) and answers name lookups for the
//! dispatch loop.
//!
//! # Thread Safety
//!
//! [`CommandRegistry`] is `Clone`; all clones share one map behind a
//! read-write lock. A `register` call inserts its whole map under a single
//! write lock, so concurrent `resolve` calls see either none or all of it.

use crate::command::invoker::Invoker;
use crate::command::registrar::{CommandHandler, CommandMap};
use crate::error::registry::RegistryError;
use crate::serializer::CommandSpec;

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Weak};

use log::{debug, info};
use parking_lot::RwLock;

#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Arc<RwLock<HashMap<String, Invoker>>>,
}

/// Non-owning handle, for handlers that need to read the registry they live in.
#[derive(Clone, Default)]
pub struct WeakCommandRegistry {
    commands: Weak<RwLock<HashMap<String, Invoker>>>,
}

impl WeakCommandRegistry {
    pub fn upgrade(&self) -> Option<CommandRegistry> {
        self.commands
            .upgrade()
            .map(|commands| CommandRegistry { commands })
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts every entry of `commands`.
    ///
    /// The map is inserted all-or-nothing: if any name is already present
    /// nothing is inserted and the existing registration is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCommand`] naming the first
    /// colliding command.
    #[track_caller]
    pub fn register(&self, commands: CommandMap) -> Result<Vec<String>, RegistryError> {
        let location = ErrorLocation::from(Location::caller());
        let mut table = self.commands.write();

        if let Some(name) = commands.keys().find(|name| table.contains_key(*name)) {
            return Err(RegistryError::DuplicateCommand {
                name: name.clone(),
                location,
            });
        }

        let names: Vec<String> = commands.keys().cloned().collect();
        for (name, invoker) in commands {
            debug!("Registered command '{name}'");
            table.insert(name, invoker);
        }

        Ok(names)
    }

    /// Builds `handler`'s invokers through its registrar and registers them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Registrar`] if the handler's declarations are
    /// invalid, or [`RegistryError::DuplicateCommand`] on a collision.
    #[track_caller]
    pub fn register_handler(
        &self,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Vec<String>, RegistryError> {
        let commands = handler.create_invokers()?;
        self.register(commands)
    }

    /// Looks up a command. Never blocks on I/O.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownCommand`] if `name` is not registered.
    #[track_caller]
    pub fn resolve(&self, name: &str) -> Result<Invoker, RegistryError> {
        self.commands
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCommand {
                name: name.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    /// Removes the named commands, returning how many were present.
    pub fn unregister(&self, names: &[String]) -> usize {
        let mut table = self.commands.write();
        names
            .iter()
            .filter(|name| table.remove(name.as_str()).is_some())
            .count()
    }

    /// Drops every command. Used at shutdown.
    pub fn unregister_all(&self) -> usize {
        let mut table = self.commands.write();
        let count = table.len();
        table.clear();
        info!("Unregistered {count} commands");
        count
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Declarations of every registered command, sorted by name.
    pub fn specs(&self) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = self
            .commands
            .read()
            .values()
            .map(|invoker| invoker.spec().clone())
            .collect();
        specs.sort_by(|a, b| a.name().cmp(b.name()));
        specs
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    pub fn downgrade(&self) -> WeakCommandRegistry {
        WeakCommandRegistry {
            commands: Arc::downgrade(&self.commands),
        }
    }
}
