use crate::bridge::{Bridge, HookCallback};
use crate::command::cancellation::CancellationFlag;
use crate::error::dispatch::DispatchError;
use crate::error::ipc::IpcError;
use crate::ipc::pending::{PendingRequests, RequestPhase};
use crate::ipc::protocol::{CorrelationId, INVOKE_HOOK, Request, Response, response_script};
use crate::registry::CommandRegistry;

use common::ErrorLocation;

use std::any::Any;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use log::{debug, error, warn};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct IpcInner {
    registry: CommandRegistry,
    bridge: Arc<dyn Bridge>,
    pending: PendingRequests,
    runtime: Handle,
}

/// The dispatch loop.
///
/// Each received request runs on its own task through
/// `Received -> Resolving -> Invoking -> Completed`, and its outcome is
/// delivered through the bridge exactly once, tagged with its correlation id.
/// Receipt returns immediately, so a slow command never holds up unrelated
/// requests.
#[derive(Clone)]
pub struct IpcHandler {
    inner: Arc<IpcInner>,
}

impl IpcHandler {
    /// Handler that spawns dispatch tasks on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Runtime`] when called outside a tokio runtime.
    #[track_caller]
    pub fn new(registry: CommandRegistry, bridge: Arc<dyn Bridge>) -> Result<Self, IpcError> {
        let location = ErrorLocation::from(Location::caller());
        let runtime = Handle::try_current().map_err(|e| IpcError::Runtime {
            message: e.to_string(),
            location,
        })?;
        Ok(Self::with_runtime(registry, bridge, runtime))
    }

    pub fn with_runtime(registry: CommandRegistry, bridge: Arc<dyn Bridge>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(IpcInner {
                registry,
                bridge,
                pending: PendingRequests::new(),
                runtime,
            }),
        }
    }

    /// Binds the invoke hook on the bridge so UI requests reach [`IpcHandler::receive`].
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Bridge`] if the hook is already bound.
    pub fn attach(&self) -> Result<(), IpcError> {
        // Weak: the bridge is owned by this handler.
        let handler: Weak<IpcInner> = Arc::downgrade(&self.inner);
        let callback: HookCallback = Arc::new(move |id, raw| match handler.upgrade() {
            Some(inner) => {
                IpcHandler { inner }.receive(id, raw);
            }
            None => warn!("Request '{id}' arrived after the dispatch loop was dropped"),
        });

        self.inner.bridge.bind(INVOKE_HOOK, callback)?;
        debug!("Dispatch loop bound to hook '{INVOKE_HOOK}'");
        Ok(())
    }

    /// Accepts a request and dispatches it in the background.
    ///
    /// Returns `None` if the request was rejected at receipt because its
    /// correlation id is already in flight; the earlier request is unaffected.
    pub fn receive(&self, id: CorrelationId, raw: String) -> Option<JoinHandle<()>> {
        let cancellation = match self.inner.pending.begin(&id) {
            Ok(cancellation) => cancellation,
            Err(e) => {
                error!("Request dropped: {e}");
                return None;
            }
        };

        let handler = self.clone();
        Some(self.inner.runtime.spawn(async move {
            let outcome = handler.run(&id, &raw, cancellation).await;
            if let Err(e) = handler.complete(&id, &outcome) {
                error!("Failed to complete request '{id}': {e}");
            }
        }))
    }

    /// Dispatches a request and waits for it, returning the response that was delivered.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::DuplicateCorrelation`] if `id` is already in flight,
    /// or the error raised while delivering the response.
    pub async fn handle(&self, id: CorrelationId, raw: &str) -> Result<Response, IpcError> {
        let cancellation = self.inner.pending.begin(&id)?;
        let outcome = self.run(&id, raw, cancellation).await;
        self.complete(&id, &outcome)
    }

    /// Delivers the outcome of `id` through the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::CompletionRejected`] if `id` is not pending, which
    /// includes every attempt after the first successful completion.
    #[track_caller]
    pub fn complete(
        &self,
        id: &CorrelationId,
        outcome: &Result<Value, DispatchError>,
    ) -> Result<Response, IpcError> {
        self.inner.pending.complete(id)?;

        let response = Response::from_outcome(id.clone(), outcome);
        let script = response_script(&response)?;
        self.inner.bridge.eval(&script)?;

        match outcome {
            Ok(_) => debug!("Request '{id}' completed"),
            Err(e) => warn!("Request '{id}' failed: {e}"),
        }
        Ok(response)
    }

    /// Raises the cancellation flag of a pending request.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.inner.pending.cancel(id)
    }

    pub fn cancellation_flag(&self, id: &CorrelationId) -> Option<CancellationFlag> {
        self.inner.pending.cancellation_flag(id)
    }

    pub fn phase(&self, id: &CorrelationId) -> Option<RequestPhase> {
        self.inner.pending.phase(id)
    }

    /// Number of requests received but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.inner.registry
    }

    async fn run(
        &self,
        id: &CorrelationId,
        raw: &str,
        cancellation: CancellationFlag,
    ) -> Result<Value, DispatchError> {
        let pending = &self.inner.pending;

        let request = Request::parse(raw)?;
        debug!("Request '{id}' -> {}", request.command);

        pending.advance(id, RequestPhase::Resolving);
        let invoker = self
            .inner
            .registry
            .resolve(&request.command)
            .map_err(|_| DispatchError::UnknownCommand {
                name: request.command.clone(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        pending.advance(id, RequestPhase::Invoking);
        let args = request.args;
        let call = async move { invoker.invoke_with(&args, cancellation).await };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result.map_err(|e| DispatchError::from_invoke(&request.command, e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Command '{}' panicked: {message}", request.command);
                Err(DispatchError::Handler {
                    command: request.command,
                    message: format!("handler panicked: {message}"),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
