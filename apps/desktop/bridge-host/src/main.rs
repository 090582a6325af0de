use bridge_host::app::HostApp;
use bridge_host::error::HostError;
use bridge_host::logger::initialize as LoggerInitialize;
use bridge_host::plugins::builtin_plugins;

use bridge_core::config::{BridgeConfig, DEFAULT_APP_NAME, PluginSettings, default_config_dir};

use common::ErrorLocation;

use std::env::args_os;
use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info, warn};
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// `bridge-host [config-dir]`
async fn run() -> Result<(), HostError> {
    let config_dir = match args_os().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => default_config_dir(DEFAULT_APP_NAME).map_err(config_error)?,
    };

    let config = BridgeConfig::load(&config_dir).map_err(config_error)?;
    let settings = PluginSettings::load(&config_dir).map_err(config_error)?;

    let log_dir = config.app_data_dir().map_err(config_error)?.join("logs");
    create_dir_all(&log_dir).map_err(|e| HostError::Host {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST, before anything that logs
    LoggerInitialize(&log_dir)?;

    info!("Bridge host starting");
    info!("Config directory: {}", config_dir.display());
    info!("Log directory: {}", log_dir.display());

    let app = HostApp::start(config, settings, builtin_plugins()).await?;

    if let Some(ws_bridge) = app.ws_bridge() {
        info!("UI bridge: ws://{}", ws_bridge.local_addr());
        info!("UI bridge auth token: {}", ws_bridge.auth_token());
    }

    tokio::select! {
        signal = ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for interrupt: {e}");
            }
            info!("Interrupt received");
        }
        () = app.wait_for_quit() => info!("Quit requested by the UI"),
    }

    let order = app.shutdown();
    info!("Shut down plugins in order: {}", order.join(", "));
    Ok(())
}

#[track_caller]
fn config_error(error: impl std::fmt::Display) -> HostError {
    HostError::Config {
        message: error.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}
