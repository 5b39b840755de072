use crate::errors::BridgeError;
use common::wait::{PollOutcome, poll_until};
use std::cell::Cell;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// Liveness of the process on the other side of the segment.
///
/// The protocol never detects a dead peer on its own; a process manager
/// supplies this so waits can stop early instead of spinning forever.
pub trait PeerStatus: Send + Sync {
    fn is_alive(&self) -> bool;
}

/// Why a wait ended without its condition holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFailure {
    TimedOut(Duration),
    Cancelled,
    PeerGone,
}

impl WaitFailure {
    /// Map to the error callers see; timeouts are mapped by the caller since
    /// only it knows which phase timed out.
    pub(crate) fn into_error(self, on_timeout: impl FnOnce(Duration) -> BridgeError) -> BridgeError {
        match self {
            WaitFailure::TimedOut(waited) => on_timeout(waited),
            WaitFailure::Cancelled => BridgeError::Cancelled,
            WaitFailure::PeerGone => BridgeError::PeerGone,
        }
    }
}

/// Read-only polling with cancellation and a throttled liveness check.
///
/// Abandoning a wait at any point is safe: probes only read peer-owned fields.
pub(crate) struct Poller<'a> {
    cancel: &'a AtomicBool,
    peer: Option<&'a dyn PeerStatus>,
    liveness_interval: Duration,
}

impl<'a> Poller<'a> {
    pub(crate) fn new(
        cancel: &'a AtomicBool,
        peer: Option<&'a dyn PeerStatus>,
        liveness_interval: Duration,
    ) -> Self {
        Self {
            cancel,
            peer,
            liveness_interval,
        }
    }

    pub(crate) fn wait<T, F>(
        &self,
        mut probe: F,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<T, WaitFailure>
    where
        F: FnMut() -> Option<T>,
    {
        let last_check = Cell::new(Instant::now());

        let outcome = poll_until(
            || {
                if let Some(value) = probe() {
                    return Some(Ok(value));
                }
                if self.peer_gone(&last_check) {
                    return Some(Err(WaitFailure::PeerGone));
                }
                None
            },
            interval,
            timeout,
            self.cancel,
        );

        match outcome {
            PollOutcome::Ready(result) => result,
            PollOutcome::TimedOut(waited) => Err(WaitFailure::TimedOut(waited)),
            PollOutcome::Cancelled => Err(WaitFailure::Cancelled),
        }
    }

    /// Wait with no deadline; only cancellation or a dead peer end it early.
    pub(crate) fn wait_unbounded<T, F>(&self, probe: F, interval: Duration) -> Result<T, BridgeError>
    where
        F: FnMut() -> Option<T>,
    {
        self.wait(probe, interval, None).map_err(|failure| match failure {
            WaitFailure::Cancelled => BridgeError::Cancelled,
            WaitFailure::PeerGone => BridgeError::PeerGone,
            WaitFailure::TimedOut(_) => unreachable!("wait without a deadline timed out"),
        })
    }

    fn peer_gone(&self, last_check: &Cell<Instant>) -> bool {
        let Some(peer) = self.peer else {
            return false;
        };
        if last_check.get().elapsed() < self.liveness_interval {
            return false;
        }
        last_check.set(Instant::now());

        let alive = peer.is_alive();
        if !alive {
            tracing::warn!("Peer process exited while waiting on the segment");
        }
        !alive
    }
}
