use anyhow::{Result, bail};
use bridge::{DEFAULT_MAP_NAME, PollConfig};
use common::Environment;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Simulator to launch. When unset, attach to one that is already running.
    pub executable: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub config_path: PathBuf,
    pub map_name: String,
    pub batch_mode: bool,
    pub turbo: Option<bool>,
    pub ticks: usize,
    pub log_every: usize,
    pub launch_attempts: u32,
    pub launch_retry_delay: Duration,
    pub terminate_grace: Duration,
    pub otel_endpoint: Option<String>,
    pub environment: Environment,
    pub poll: PollConfig,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        let executable = env::var("COL_EXECUTABLE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let log_dir = env::var("COL_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let config_path = env::var("COL_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("col_config.json"));

        let map_name = env::var("COL_MAP_NAME").unwrap_or_else(|_| DEFAULT_MAP_NAME.to_string());

        let batch_mode = bool_var("COL_BATCH_MODE")?.unwrap_or(false);
        let turbo = bool_var("COL_TURBO")?;

        let ticks = env::var("COL_TICKS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let log_every = env::var("COL_LOG_EVERY")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .unwrap_or(10)
            .max(1);

        let launch_attempts = env::var("COL_LAUNCH_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let launch_retry_delay = Duration::from_millis(
            env::var("COL_LAUNCH_RETRY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        );

        let terminate_grace = Duration::from_millis(
            env::var("COL_TERMINATE_GRACE_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
        );

        let otel_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        Ok(Self {
            executable,
            log_dir,
            config_path,
            map_name,
            batch_mode,
            turbo,
            ticks,
            log_every,
            launch_attempts,
            launch_retry_delay,
            terminate_grace,
            otel_endpoint,
            environment: Environment::from_env(),
            poll: PollConfig::from_env(),
        })
    }
}

/// Unset means `None`; anything other than a recognised boolean is an error.
fn bool_var(name: &str) -> Result<Option<bool>> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };

    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => bail!("{} must be a boolean, got {:?}", name, other),
    }
}
