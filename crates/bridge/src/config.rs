use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Every interval and deadline the protocol polls with.
///
/// A `None` timeout waits until cancelled. Completion and tick waits have no
/// timeout at all; they end on completion, cancellation or a dead peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// How long to wait for the peer's shared object to appear.
    pub open_timeout: Option<Duration>,
    pub open_interval: Duration,
    /// How long to wait for the peer to signal it is ready for parameters.
    pub readiness_timeout: Option<Duration>,
    pub readiness_interval: Duration,
    /// How long to wait for the peer to acknowledge parameters.
    pub ack_timeout: Option<Duration>,
    /// Parameters are rewritten at this cadence until acknowledged.
    pub resend_interval: Duration,
    /// Sleep between completion/tick polls; zero yields the thread instead.
    pub completion_interval: Duration,
    /// How often waits ask the peer probe whether the process is alive.
    pub liveness_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            open_timeout: Some(Duration::from_secs(30)),
            open_interval: Duration::from_millis(100),
            readiness_timeout: Some(Duration::from_secs(30)),
            readiness_interval: Duration::from_millis(10),
            ack_timeout: Some(Duration::from_secs(30)),
            resend_interval: Duration::from_millis(100),
            completion_interval: Duration::ZERO,
            liveness_interval: Duration::from_millis(250),
        }
    }
}

impl PollConfig {
    /// Defaults overridden by `COL_*` variables. Timeouts of `0` disable the deadline.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            open_timeout: timeout_var("COL_OPEN_TIMEOUT_MS", defaults.open_timeout),
            open_interval: millis_var("COL_OPEN_POLL_MS", defaults.open_interval),
            readiness_timeout: timeout_var("COL_READY_TIMEOUT_MS", defaults.readiness_timeout),
            readiness_interval: millis_var("COL_READY_POLL_MS", defaults.readiness_interval),
            ack_timeout: timeout_var("COL_ACK_TIMEOUT_MS", defaults.ack_timeout),
            resend_interval: millis_var("COL_RESEND_MS", defaults.resend_interval),
            completion_interval: env::var("COL_COMPLETION_POLL_US")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_micros)
                .unwrap_or(defaults.completion_interval),
            liveness_interval: millis_var("COL_LIVENESS_MS", defaults.liveness_interval),
        }
    }
}

fn millis_var(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn timeout_var(name: &str, default: Option<Duration>) -> Option<Duration> {
    match env::var(name).ok().and_then(|s| s.parse::<u64>().ok()) {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => default,
    }
}

/// Simulation settings supplied by the user.
///
/// Field names follow the simulator's configuration file. Every field is
/// required; a missing one fails deserialization with its name in the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub speed_factor: f32,
    pub spawn_pedestrians: bool,
    pub spawn_cars: bool,
    pub move_speed: f32,
    pub turn_speed: f32,
    pub vertical_speed: f32,
    pub momentum: f32,
    #[serde(rename = "fixedDeltaTime")]
    pub fixed_delta_time: f32,
    pub number_of_steps: u32,
    pub rgb_camera: bool,
    pub depth_camera: bool,
    pub normals_camera: bool,
    pub semantic_camera: bool,
    /// Square image side shared by every camera.
    #[serde(rename = "IMG_SIZE")]
    pub img_size: u32,
    pub vertical_fov: f32,
    pub start_x: f32,
    pub start_y: f32,
    pub start_z: f32,
    pub launch_streaming: bool,
    pub render: bool,
}

impl SimulatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid simulator configuration")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read simulator config {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("Failed to load simulator config {}", path.display()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;

    pub(crate) const SAMPLE_CONFIG: &str = r#"{
        "speed_factor": 1.0,
        "spawn_pedestrians": true,
        "spawn_cars": false,
        "move_speed": 5.0,
        "turn_speed": 90.0,
        "vertical_speed": 2.0,
        "momentum": 0.5,
        "fixedDeltaTime": 0.02,
        "number_of_steps": 1000,
        "rgb_camera": true,
        "depth_camera": true,
        "normals_camera": false,
        "semantic_camera": false,
        "IMG_SIZE": 128,
        "vertical_fov": 60.0,
        "start_x": 10.0,
        "start_y": 2.0,
        "start_z": -4.0,
        "launch_streaming": false,
        "render": true,
        "unity_exe": "ignored by the bridge"
    }"#;

    #[test]
    fn test_parses_simulator_config() {
        let config = SimulatorConfig::from_json_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.img_size, 128);
        assert_eq!(config.fixed_delta_time, 0.02);
        assert!(config.rgb_camera && config.depth_camera);
        assert!(!config.normals_camera && !config.semantic_camera);
    }

    #[test]
    fn test_missing_field_is_named() {
        let json = SAMPLE_CONFIG.replace("\"vertical_fov\": 60.0,", "");
        let err = SimulatorConfig::from_json_str(&json).unwrap_err();
        let message = format!("{:#}", err);
        assert!(
            message.contains("missing field `vertical_fov`"),
            "error should name the field: {}",
            message
        );
    }

    #[test]
    fn test_from_path_reports_file() {
        let err = SimulatorConfig::from_path("/nonexistent/col.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/col.json"));
    }

    #[test]
    fn test_default_poll_config_matches_protocol_constants() {
        let poll = PollConfig::default();
        assert_eq!(poll.readiness_interval, Duration::from_millis(10));
        assert_eq!(poll.resend_interval, Duration::from_millis(100));
        assert_eq!(poll.open_interval, Duration::from_millis(100));
        assert!(poll.completion_interval.is_zero());
    }

    #[test]
    #[serial]
    fn test_poll_config_from_env() {
        unsafe {
            env::set_var("COL_READY_TIMEOUT_MS", "1500");
            env::set_var("COL_ACK_TIMEOUT_MS", "0");
            env::set_var("COL_RESEND_MS", "not a number");
            env::set_var("COL_COMPLETION_POLL_US", "250");
        }

        let poll = PollConfig::from_env();
        assert_eq!(poll.readiness_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(poll.ack_timeout, None, "0 disables the deadline");
        assert_eq!(poll.resend_interval, Duration::from_millis(100));
        assert_eq!(poll.completion_interval, Duration::from_micros(250));

        unsafe {
            env::remove_var("COL_READY_TIMEOUT_MS");
            env::remove_var("COL_ACK_TIMEOUT_MS");
            env::remove_var("COL_RESEND_MS");
            env::remove_var("COL_COMPLETION_POLL_US");
        }
    }
}
