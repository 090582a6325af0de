use bridge_core::command::{CommandHandler, CommandMap, Registrar};
use bridge_core::error::{InvokeError, PluginError, RegistrarError};
use bridge_core::event::EventEmitter;
use bridge_core::plugin::{Plugin, PluginContext, PluginLogger};
use bridge_core::serializer::{CommandSpec, ValueKind};

use std::sync::Arc;

use serde::Serialize;
use tokio::time::{Duration, Instant, sleep};

pub const PLUGIN_ID: &str = "timer";
pub const ELAPSED_EVENT: &str = "timer:elapsed";

/// Upper bound for one `timer:sleep`, unless `max_ms` is set in `[timer]`.
const DEFAULT_MAX_MS: u64 = 60_000;

/// How often a sleeping timer checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Long-running command that honours cancellation and announces completion.
pub struct TimerPlugin {
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl TimerPlugin {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl Default for TimerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for TimerPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Timer"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn initialize(&mut self, context: &PluginContext) -> Result<(), PluginError> {
        let max_ms = context
            .config()
            .get_as::<u64>("max_ms")
            .unwrap_or(DEFAULT_MAX_MS);
        if max_ms == 0 {
            return Err(PluginError::init(PLUGIN_ID, "'max_ms' must be positive"));
        }

        self.handlers = vec![Arc::new(TimerCommands {
            emitter: context.emitter().clone(),
            logger: context.logger("sleep"),
            max_ms,
        })];
        Ok(())
    }

    fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        self.handlers.clone()
    }
}

#[derive(Debug, Clone, Serialize)]
struct Elapsed {
    label: Option<String>,
    ms: u64,
}

struct TimerCommands {
    emitter: EventEmitter,
    logger: PluginLogger,
    max_ms: u64,
}

impl CommandHandler for TimerCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command(
                CommandSpec::new("timer:sleep")
                    .param("ms", ValueKind::Integer)
                    .optional("label", ValueKind::String)
                    .returns(ValueKind::Integer),
                |timer, args| async move {
                    let ms: u64 = args.get("ms")?;
                    let label: Option<String> = args.get_optional("label")?;
                    if ms > timer.max_ms {
                        return Err(InvokeError::handler(format!(
                            "{ms} ms exceeds the {} ms limit",
                            timer.max_ms
                        )));
                    }

                    let deadline = Instant::now() + Duration::from_millis(ms);
                    while Instant::now() < deadline {
                        if args.cancellation().is_cancelled() {
                            timer.logger.info(format!("timer {label:?} cancelled"));
                            return Err(InvokeError::handler("timer cancelled"));
                        }
                        sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
                    }

                    timer
                        .emitter
                        .emit_serialized(ELAPSED_EVENT, &Elapsed { label, ms });
                    Ok(ms)
                },
            )
            .finish()
    }
}
