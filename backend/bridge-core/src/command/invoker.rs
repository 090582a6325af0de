use crate::command::cancellation::CancellationFlag;
use crate::error::command::InvokeError;
use crate::serializer::{Args, CommandSpec};

use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, ready};
use serde_json::Value;

/// Future returned by an invoker: the encoded result or the failure.
pub type InvokeFuture = BoxFuture<'static, Result<Value, InvokeError>>;

pub(crate) type InvokeFn = dyn Fn(Args) -> InvokeFuture + Send + Sync;

/// One exposed command, bound to the handler instance that implements it.
///
/// Cloning is cheap. A clone keeps the bound instance alive, so an invoker
/// resolved for a dispatch stays valid until that dispatch finishes even if
/// the registry is cleared meanwhile.
#[derive(Clone)]
pub struct Invoker {
    spec: Arc<CommandSpec>,
    call: Arc<InvokeFn>,
}

impl Invoker {
    pub(crate) fn new(spec: CommandSpec, call: Arc<InvokeFn>) -> Self {
        Self {
            spec: Arc::new(spec),
            call,
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Decodes `raw` and runs the handler.
    ///
    /// Decoding happens before the handler is touched; a decoding failure
    /// resolves immediately without invoking anything.
    pub fn invoke(&self, raw: &Value) -> InvokeFuture {
        self.invoke_with(raw, CancellationFlag::default())
    }

    /// Like [`Invoker::invoke`], handing `cancellation` to the handler through its args.
    pub fn invoke_with(&self, raw: &Value, cancellation: CancellationFlag) -> InvokeFuture {
        match self.spec.decode(raw) {
            Ok(args) => (self.call)(args.with_cancellation(cancellation)),
            Err(error) => ready(Err(error)).boxed(),
        }
    }
}

impl Debug for Invoker {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter
            .debug_struct("Invoker")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
