use crate::command::FunctionId;
use crate::handshake::HandshakeState;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Shared segment {} did not appear within {waited:?}", path.display())]
    NotFound { path: PathBuf, waited: Duration },

    #[error("Handshake timed out in {phase} after {waited:?}")]
    HandshakeTimeout {
        phase: HandshakeState,
        waited: Duration,
    },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error("Invalid hyper-parameters: {0}")]
    InvalidParams(String),

    #[error("Wait cancelled")]
    Cancelled,

    #[error("Peer process is gone")]
    PeerGone,

    #[error("Session is closed")]
    Closed,
}

impl BridgeError {
    /// Failures that relaunching the peer can fix.
    ///
    /// Contract breaches and bad parameters are not retryable: the same
    /// request would fail the same way against a fresh peer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::NotFound { .. } | BridgeError::HandshakeTimeout { .. } | BridgeError::PeerGone
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BridgeError::NotFound { .. } | BridgeError::HandshakeTimeout { .. }
        )
    }
}

/// The peer and this side disagree on the wire contract, or the caller broke it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("function {pending} is still outstanding, refusing to issue {requested}")]
    CallOutstanding { pending: u32, requested: FunctionId },

    #[error("segment is {actual} bytes but the layout requires {expected}")]
    SegmentSize { expected: usize, actual: usize },

    #[error(
        "camera {index} declares {width}x{height}x{channels}, layout allows at most {max_resolution}x{max_resolution}x{bytes_per_pixel}"
    )]
    CameraTooLarge {
        index: usize,
        width: u32,
        height: u32,
        channels: u32,
        max_resolution: usize,
        bytes_per_pixel: usize,
    },

    #[error("peer declares {declared} cameras, layout holds at most {max}")]
    TooManyCameras { declared: u32, max: usize },

    #[error("action sequence counter exhausted")]
    SequenceExhausted,

    #[error("unknown function id {0}")]
    UnknownFunction(u32),
}

/// Log a contract breach loudly and turn it into an error.
pub(crate) fn violation(v: ProtocolViolation) -> BridgeError {
    tracing::error!(violation = %v, "Shared-memory protocol violation");
    BridgeError::ProtocolViolation(v)
}
