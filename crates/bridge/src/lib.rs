pub mod camera;
pub mod command;
pub mod config;
pub mod depth;
pub mod errors;
pub mod handshake;
pub mod hyper_params;
pub mod layout;
pub mod metrics;
pub mod paths;
pub mod poller;
pub mod segment;
pub mod session;
#[cfg(windows)]
mod tagged;
pub mod types;

pub use camera::{CameraBinding, CameraFrame, CameraHeader, CameraRole};
pub use command::{Action, Command, FunctionId};
pub use config::{PollConfig, SimulatorConfig};
pub use depth::{DepthRange, decode_depth_rgba};
pub use errors::{BridgeError, ProtocolViolation};
pub use handshake::HandshakeState;
pub use hyper_params::HyperParams;
pub use layout::SegmentLayout;
pub use paths::DEFAULT_MAP_NAME;
pub use poller::PeerStatus;
pub use segment::Segment;
pub use session::{Session, SessionBuilder};
pub use types::{GlobalHeader, Pose};
