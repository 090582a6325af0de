//! Commands: the invokers the UI calls and the registrars that build them.

pub mod builtin;
pub mod cancellation;
pub mod invoker;
pub mod registrar;

pub use builtin::BridgeCommands;
pub use cancellation::CancellationFlag;
pub use invoker::{InvokeFuture, Invoker};
pub use registrar::{CommandHandler, CommandMap, RESERVED_PREFIXES, Registrar};
