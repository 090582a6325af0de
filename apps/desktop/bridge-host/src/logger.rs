//! Logging for the bridge host.
//!
//! Provides dual output (stdout with colors + file) with thread-safe initialization.
//! Every line carries the record target, so plugin output shows up under
//! `plugin::<id>::<name>`. Set `BRIDGE_LOG` (`error`..`trace`) to override the
//! build's default level.

use crate::error::HostError;

use common::ErrorLocation;

use std::env;
use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, info, warn};

/// Thread-safe initialization guard.
static INIT_LOGGER_ONCE: Once = Once::new();

/// Tracks if logger initialization was already attempted.
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

/// Log file name, created inside the log directory.
pub const LOG_FILE_NAME: &str = "bridge-host.log";

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "BRIDGE_LOG";

/// Message logged when logger is successfully initialized.
const LOGGER_INITIALIZED_MESSAGE_PREFIX: &str = "Logger initialized with level: ";

/// Warning message when logger is called multiple times.
const LOGGER_ALREADY_INITIALIZED_MESSAGE: &str = "Logger already initialized";

/// Transport crates that log every frame at debug level.
const QUIET_TARGETS: &[&str] = &["tungstenite", "tokio_tungstenite"];

/// Default log level for debug builds.
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// Default log level for release builds.
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Initialize the logger with dual output (stdout + `bridge-host.log`).
///
/// Safe to call more than once: later calls log a warning and return `Ok`.
/// The actual initialization runs exactly once.
///
/// # Arguments
///
/// * `log_dir` - Directory where the log file will be created
///
/// # Errors
///
/// Returns [`HostError::Logger`] if the log file cannot be created or a
/// global logger is already installed by someone else.
pub fn initialize(log_dir: &Path) -> Result<(), HostError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("{LOGGER_ALREADY_INITIALIZED_MESSAGE}");
        return Ok(());
    }

    let level = log_level(env::var(LOG_LEVEL_ENV).ok().as_deref());
    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_dir, level);
        if result.is_ok() {
            info!("{LOGGER_INITIALIZED_MESSAGE_PREFIX}{level:?}");
        }
    });

    result
}

/// Level from the `BRIDGE_LOG` value, falling back to the build default
/// when unset or unparseable.
pub(crate) fn log_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_LOG_LEVEL)
}

/// Builds and installs the stdout and file dispatches.
#[track_caller]
pub(crate) fn initialize_internal(log_dir: &Path, level: LevelFilter) -> Result<(), HostError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    let color_configuration = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let quiet_level = level.min(LevelFilter::Info);
    let base_dispatch = QUIET_TARGETS
        .iter()
        .fold(Dispatch::new().level(level), |dispatch, target| {
            dispatch.level_for(*target, quiet_level)
        });

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {target}: {message}",
                date = format_rfc3339(SystemTime::now()),
                level = color_configuration.color(record.level()),
                target = record.target(),
                message = message,
            ))
        })
        .chain(stdout());

    // Plain text, no colors
    let file_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {target}: {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = record.level(),
                target = record.target(),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0)
            ))
        })
        .chain(
            fern::log_file(&log_file_path).map_err(|e| HostError::Logger {
                message: format!("Failed to create log file {}: {e}", log_file_path.display()),
                location: ErrorLocation::from(Location::caller()),
            })?,
        );

    base_dispatch
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()
        .map_err(|e| HostError::Logger {
            message: format!("Failed to initialize logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(())
}
