use crate::config::Environment;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber without trace export.
///
/// Filtering comes from `RUST_LOG` and defaults to `info`. Development gets
/// pretty, coloured output; production gets one JSON object per line.
/// Use [`crate::TelemetryGuard::init`] instead when an OTLP collector is
/// available, it installs the same formatting plus the OpenTelemetry layer.
pub fn setup_logging(environment: Environment) {
    let registry = tracing_subscriber::registry().with(default_filter());

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(true)
                        .with_target(false),
                )
                .init();
        }
    }
}

pub(crate) fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
