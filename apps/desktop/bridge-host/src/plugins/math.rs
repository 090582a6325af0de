use bridge_core::command::{CommandHandler, CommandMap, Registrar};
use bridge_core::error::{InvokeError, PluginError, RegistrarError};
use bridge_core::plugin::{Plugin, PluginContext};
use bridge_core::serializer::{Args, CommandSpec, ValueKind};

use std::sync::Arc;

pub const PLUGIN_ID: &str = "math";

/// Arithmetic commands. Results are rounded to the optional `precision`
/// setting of the `[math]` table.
pub struct MathPlugin {
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl MathPlugin {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl Default for MathPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MathPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        "Math"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn initialize(&mut self, context: &PluginContext) -> Result<(), PluginError> {
        let precision = context.config().get_as::<u32>("precision");
        if let Some(digits) = precision {
            context
                .logger("init")
                .debug(format!("rounding results to {digits} digits"));
        }
        self.handlers = vec![Arc::new(MathCommands { precision })];
        Ok(())
    }

    fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        self.handlers.clone()
    }
}

struct MathCommands {
    precision: Option<u32>,
}

impl MathCommands {
    fn round(&self, value: f64) -> f64 {
        match self.precision {
            Some(digits) => {
                let scale = 10_f64.powi(i32::try_from(digits).unwrap_or(i32::MAX).min(15));
                (value * scale).round() / scale
            }
            None => value,
        }
    }
}

fn operands(args: &Args) -> Result<(f64, f64), InvokeError> {
    Ok((args.get("a")?, args.get("b")?))
}

fn binary(name: &str) -> CommandSpec {
    CommandSpec::new(name)
        .param("a", ValueKind::Float)
        .param("b", ValueKind::Float)
        .returns(ValueKind::Float)
}

impl CommandHandler for MathCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(binary("math:add"), |math, args| {
                let (a, b) = operands(&args)?;
                Ok(math.round(a + b))
            })
            .command_sync(binary("math:multiply"), |math, args| {
                let (a, b) = operands(&args)?;
                Ok(math.round(a * b))
            })
            .command_sync(binary("math:divide"), |math, args| {
                let (a, b) = operands(&args)?;
                if b == 0.0 {
                    return Err(InvokeError::handler("division by zero"));
                }
                Ok(math.round(a / b))
            })
            .command_sync(
                CommandSpec::new("math:sum")
                    .param("values", ValueKind::Array)
                    .returns(ValueKind::Float),
                |math, args| {
                    let values: Vec<f64> = args.get("values")?;
                    Ok(math.round(values.iter().sum()))
                },
            )
            .finish()
    }
}
