mod config;
mod service;

use anyhow::Context;
use common::{TelemetryGuard, setup_logging};
use config::ControllerConfig;
use service::ControllerService;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::from_env()?;

    // The OTLP batch exporters need a Tokio runtime that outlives the guard.
    let (_telemetry, _runtime) = if let Some(endpoint) = config.otel_endpoint.as_ref() {
        let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let guard =
            rt.block_on(async { TelemetryGuard::init("controller", endpoint, config.environment) })?;
        (Some(guard), Some(rt))
    } else {
        setup_logging(config.environment);
        (None, None)
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    tracing::info!(environment = config.environment.as_str(), "Controller starting with config: {:?}", config);

    let service = ControllerService::new(config, shutdown)?;
    match service.run() {
        Ok(()) => {
            tracing::info!("Controller stopped gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Controller failed: {:#}", e);
            Err(e)
        }
    }
}
