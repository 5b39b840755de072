use crate::config::ControllerConfig;
use anyhow::{Context, Result};
use bridge::{
    Action, BridgeError, CameraRole, DepthRange, HyperParams, Session, SegmentLayout,
    SimulatorConfig, decode_depth_rgba,
};
use common::retry::retry_with_backoff;
use launcher::{LaunchOptions, PeerProcess, spawn_with_cleanup};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A live simulator and the session talking to it.
struct Connection {
    session: Session,
    peer: Option<Arc<PeerProcess>>,
}

pub struct ControllerService {
    config: ControllerConfig,
    simulator: SimulatorConfig,
    shutdown: Arc<AtomicBool>,
}

impl ControllerService {
    pub fn new(config: ControllerConfig, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let simulator = SimulatorConfig::from_path(&config.config_path)?;
        tracing::info!(
            path = %config.config_path.display(),
            img_size = simulator.img_size,
            "Simulator configuration loaded"
        );

        Ok(Self {
            config,
            simulator,
            shutdown,
        })
    }

    fn launch_options(&self, executable: &std::path::Path) -> LaunchOptions {
        LaunchOptions {
            batch_mode: self.config.batch_mode,
            turbo: self.config.turbo,
            ..LaunchOptions::new(executable, &self.config.log_dir)
        }
    }

    /// Spawn (when configured), open the segment and run the handshake.
    fn launch_once(&self, attempt: u32) -> Result<Connection> {
        tracing::info!(attempt, "Launching simulator session");

        let peer = match &self.config.executable {
            Some(executable) => Some(Arc::new(
                spawn_with_cleanup(&self.launch_options(executable))
                    .context("Failed to start simulator")?,
            )),
            None => {
                tracing::info!(map = %self.config.map_name, "No executable configured, attaching");
                None
            }
        };

        let mut builder = Session::builder(HyperParams::from(&self.simulator))
            .poll(self.config.poll.clone())
            .cancel(Arc::clone(&self.shutdown));
        if let Some(peer) = &peer {
            builder = builder.peer(peer.clone());
        }

        match builder.connect(&self.config.map_name, SegmentLayout::DEFAULT) {
            Ok(session) => Ok(Connection { session, peer }),
            Err(e) => {
                if let Some(peer) = peer {
                    self.stop_peer(&peer);
                }
                Err(e).context("Failed to establish shared-memory session")
            }
        }
    }

    fn stop_peer(&self, peer: &PeerProcess) {
        if let Err(e) = peer.terminate(self.config.terminate_grace) {
            tracing::error!(pid = peer.pid(), error = %e, "Failed to stop simulator");
        }
    }

    pub fn run(self) -> Result<()> {
        let mut connection = retry_with_backoff(
            |attempt| self.launch_once(attempt),
            self.config.launch_attempts,
            self.config.launch_retry_delay,
            is_retryable,
            "Simulator launch",
        )?;

        let result = self.drive(&mut connection.session);

        connection.session.close();
        if let Some(peer) = connection.peer.take() {
            self.stop_peer(&peer);
        }
        result
    }

    fn drive(&self, session: &mut Session) -> Result<()> {
        for camera in session.cameras() {
            tracing::info!(
                camera = %camera.label(),
                width = camera.header.width,
                height = camera.header.height,
                channels = camera.header.channels,
                "Camera available"
            );
        }

        if !session.cameras().is_empty() {
            session.force_camera_read()?;
        }

        tracing::info!(ticks = self.config.ticks, "Running simulation");

        for tick in 0..self.config.ticks {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!(tick, "Shutdown requested");
                break;
            }

            let index = match session.step(Action::BLANK) {
                Ok(index) => index,
                Err(BridgeError::Cancelled) => {
                    tracing::info!(tick, "Shutdown requested during tick");
                    break;
                }
                Err(e) => return Err(e).context("Simulation step failed"),
            };

            if tick % self.config.log_every == 0 {
                report(session, tick, index)?;
            }
        }

        let log = session.peer_log()?;
        if !log.is_empty() {
            tracing::info!(peer_log = %log, "Simulator log region");
        }
        Ok(())
    }
}

fn is_retryable(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<BridgeError>()
        .is_some_and(BridgeError::is_retryable)
}

fn report(session: &Session, tick: usize, index: u32) -> Result<()> {
    let header = session.global_header()?;
    let collisions: Vec<usize> = header.active_collisions().collect();

    let centre_depth = session.frame(CameraRole::Depth).and_then(|frame| {
        if frame.width() == 0 || frame.height() == 0 {
            return None;
        }
        let px = frame.pixel(frame.width() / 2, frame.height() / 2);
        let rgba: [u8; 4] = px.get(..4)?.try_into().ok()?;
        Some(decode_depth_rgba(rgba, DepthRange::default()))
    });

    tracing::info!(
        tick,
        update_index = index,
        position = ?header.pose.position(),
        rotation = ?header.pose.rotation(),
        ?collisions,
        ?centre_depth,
        "Tick"
    );
    Ok(())
}
