//! Per-type registration tables.
//!
//! A handler type lists its commands once, in code, through a [`Registrar`].
//! The registrar captures each command's parameter plan and a typed closure,
//! so the dispatch path is a hash lookup followed by a direct call, with no
//! runtime type introspection.
//!
//! ```
//! use std::sync::Arc;
//! use bridge_core::command::{CommandHandler, CommandMap, Registrar};
//! use bridge_core::error::{InvokeError, RegistrarError};
//! use bridge_core::serializer::{CommandSpec, ValueKind};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl CommandHandler for Greeter {
//!     fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
//!         Registrar::new(self)
//!             .command_sync(
//!                 CommandSpec::new("greeter:greet")
//!                     .param("name", ValueKind::String)
//!                     .returns(ValueKind::String),
//!                 |greeter, args| {
//!                     let name: String = args.get("name")?;
//!                     Ok::<_, InvokeError>(format!("{}, {name}", greeter.greeting))
//!                 },
//!             )
//!             .finish()
//!     }
//! }
//! ```

use crate::command::invoker::{InvokeFn, InvokeFuture, Invoker};
use crate::error::command::{InvokeError, RegistrarError};
use crate::serializer::{Args, CommandSpec, encode_as};

use common::ErrorLocation;

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use futures_util::future::{FutureExt, ready};
use serde::Serialize;

/// Prefixes reserved for commands the bridge itself provides.
pub const RESERVED_PREFIXES: &[&str] = &["bridge:", "__"];

/// Invokers produced by one registrar, keyed by command name.
pub type CommandMap = BTreeMap<String, Invoker>;

/// A type that exposes commands.
///
/// Implementations build their table with a [`Registrar`]. Calling
/// `create_invokers` on two instances yields two independent maps, each bound
/// to its own instance.
pub trait CommandHandler: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`RegistrarError`] when a declaration is invalid (reserved
    /// prefix, malformed name, duplicate declaration).
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError>;
}

/// Builder for the command table of one handler instance.
///
/// The first invalid declaration is remembered and reported by
/// [`Registrar::finish`]; later declarations are ignored.
pub struct Registrar<H: Send + Sync + 'static> {
    instance: Arc<H>,
    handler: &'static str,
    allow_reserved: bool,
    invokers: CommandMap,
    error: Option<RegistrarError>,
}

impl<H: Send + Sync + 'static> Registrar<H> {
    pub fn new(instance: Arc<H>) -> Self {
        Self {
            instance,
            handler: std::any::type_name::<H>(),
            allow_reserved: false,
            invokers: CommandMap::new(),
            error: None,
        }
    }

    /// Registrar for the bridge's own commands, which live under reserved prefixes.
    pub(crate) fn reserved(instance: Arc<H>) -> Self {
        Self {
            allow_reserved: true,
            ..Self::new(instance)
        }
    }

    /// Declares an asynchronous command.
    ///
    /// `handler` receives the bound instance and the decoded arguments. Its
    /// result is encoded against `spec`'s return kind.
    #[track_caller]
    pub fn command<F, Fut, R>(mut self, spec: CommandSpec, handler: F) -> Self
    where
        F: Fn(Arc<H>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, InvokeError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        if self.error.is_some() {
            return self;
        }

        let location = ErrorLocation::from(Location::caller());
        if let Err(error) = self.check(&spec, location) {
            self.error = Some(error);
            return self;
        }

        let instance = Arc::clone(&self.instance);
        let returns = spec.return_kind();
        let call: Arc<InvokeFn> = Arc::new(move |args: Args| -> InvokeFuture {
            let pending = handler(Arc::clone(&instance), args);
            async move {
                let result = pending.await?;
                encode_as(returns, result)
            }
            .boxed()
        });

        self.invokers
            .insert(spec.name().to_string(), Invoker::new(spec, call));
        self
    }

    /// Declares a command whose handler returns synchronously.
    #[track_caller]
    pub fn command_sync<F, R>(self, spec: CommandSpec, handler: F) -> Self
    where
        F: Fn(&H, Args) -> Result<R, InvokeError> + Send + Sync + 'static,
        R: Serialize + Send + 'static,
    {
        self.command(spec, move |instance, args| ready(handler(instance.as_ref(), args)))
    }

    /// # Errors
    ///
    /// Returns the first [`RegistrarError`] recorded while declaring commands.
    pub fn finish(self) -> Result<CommandMap, RegistrarError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.invokers),
        }
    }

    fn check(&self, spec: &CommandSpec, location: ErrorLocation) -> Result<(), RegistrarError> {
        let name = spec.name();

        if !self.allow_reserved {
            if let Some(prefix) = RESERVED_PREFIXES.iter().find(|p| name.starts_with(**p)) {
                return Err(RegistrarError::ReservedName {
                    name: name.to_string(),
                    prefix: *prefix,
                    location,
                });
            }
        }

        validate_name(name, location)?;

        if self.invokers.contains_key(name) {
            return Err(RegistrarError::DuplicateDeclaration {
                name: name.to_string(),
                handler: self.handler,
                location,
            });
        }

        let mut seen = HashSet::new();
        let mut optional_seen = false;
        for param in spec.params() {
            if param.name.is_empty() {
                return Err(RegistrarError::InvalidParameter {
                    name: name.to_string(),
                    message: String::from("parameter name is empty"),
                    location,
                });
            }
            if !seen.insert(param.name.as_str()) {
                return Err(RegistrarError::InvalidParameter {
                    name: name.to_string(),
                    message: format!("parameter '{}' declared twice", param.name),
                    location,
                });
            }
            // Positional binding would be ambiguous otherwise.
            if param.required && optional_seen {
                return Err(RegistrarError::InvalidParameter {
                    name: name.to_string(),
                    message: format!(
                        "required parameter '{}' follows an optional one",
                        param.name
                    ),
                    location,
                });
            }
            optional_seen |= !param.required;
        }

        Ok(())
    }
}

/// Command names are `namespace:action`; both halves non-empty, no whitespace.
fn validate_name(name: &str, location: ErrorLocation) -> Result<(), RegistrarError> {
    let invalid = |message: &str| RegistrarError::InvalidName {
        name: name.to_string(),
        message: message.to_string(),
        location,
    };

    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("contains whitespace or control characters"));
    }

    match name.trim_start_matches('_').split_once(':') {
        Some((namespace, action)) if !namespace.is_empty() && !action.is_empty() => Ok(()),
        _ => Err(invalid("expected 'namespace:action'")),
    }
}
