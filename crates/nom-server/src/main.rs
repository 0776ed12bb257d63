//! nomctrl server
//!
//! Usage: `nomctrl [config.yaml]`. Without an argument the configuration is
//! read from `$NOMCTRL_CONFIG`, then `nomctrl.yaml`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use nom_command::Controller;
use nom_config::Config;
use nom_devices::DriverRegistry;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, reload, EnvFilter, Registry};

const DEFAULT_CONFIG: &str = "nomctrl.yaml";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the subscriber; `RUST_LOG` wins over the configured level
fn init_logging() -> FilterHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
    handle
}

fn apply_log_level(handle: &FilterHandle, level: Option<&str>) {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return;
    }
    let Some(level) = level else { return };
    match EnvFilter::try_new(level) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                warn!("Could not apply log level {}: {}", level, e);
            }
        }
        Err(e) => warn!("Invalid log level {}: {}", level, e),
    }
}

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NOMCTRL_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
        .into()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_filter = init_logging();

    let path = config_path();
    info!("Starting nomctrl with {}", path.display());
    let config =
        Config::load(&path).with_context(|| format!("Invalid configuration {}", path.display()))?;
    apply_log_level(&log_filter, config.app.log_level.as_deref());

    let controller = Arc::new(
        Controller::from_config(&config, &DriverRegistry::with_builtin())
            .context("Invalid topology")?,
    );
    controller.start()?;
    info!("nomctrl is running");

    nom_server::start_server(controller.clone(), config.app.port, shutdown_signal()).await?;

    controller.stop();
    Ok(())
}
