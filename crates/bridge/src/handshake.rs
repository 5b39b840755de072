use crate::config::PollConfig;
use crate::errors::BridgeError;
use crate::hyper_params::HyperParams;
use crate::metrics::BridgeMetrics;
use crate::poller::Poller;
use crate::segment::Segment;
use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

/// Values of the hyper-parameter state word.
pub mod hp_state {
    /// Peer is ready to receive parameters.
    pub const READY: u32 = 0;
    /// Controller has published a payload.
    pub const PENDING: u32 = 1;
    /// Peer has read the payload.
    pub const ACKNOWLEDGED: u32 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitPeer,
    SendParams,
    Acknowledged,
    Failed,
}

impl HandshakeState {
    pub const fn as_str(self) -> &'static str {
        match self {
            HandshakeState::AwaitPeer => "AWAIT_PEER",
            HandshakeState::SendParams => "SEND_PARAMS",
            HandshakeState::Acknowledged => "ACKNOWLEDGED",
            HandshakeState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Acknowledged | HandshakeState::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter exchange that must complete before any command traffic.
///
/// The controller owns the hyper-parameter block while its state word is 0
/// or 1. The payload is always written before the state word is raised to
/// 1, and the payload is rewritten every `resend_interval` until the peer
/// answers 2 or `ack_timeout` passes.
pub struct Handshake<'a> {
    segment: &'a Segment,
    poll: &'a PollConfig,
    poller: &'a Poller<'a>,
    metrics: &'a BridgeMetrics,
    state: HandshakeState,
    resends: u64,
}

impl<'a> Handshake<'a> {
    pub(crate) fn new(
        segment: &'a Segment,
        poll: &'a PollConfig,
        poller: &'a Poller<'a>,
        metrics: &'a BridgeMetrics,
    ) -> Self {
        Self {
            segment,
            poll,
            poller,
            metrics,
            state: HandshakeState::AwaitPeer,
            resends: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Payload rewrites after the first publish.
    pub fn resends(&self) -> u64 {
        self.resends
    }

    /// Drive the state machine to `Acknowledged` or `Failed`.
    pub fn run(&mut self, params: &HyperParams) -> Result<(), BridgeError> {
        let _span = common::span!("handshake");

        params.validate(self.segment.layout())?;

        let result = self.await_peer().and_then(|()| self.send_params(params));

        self.metrics.resends(self.resends);
        match &result {
            Ok(()) => {
                self.state = HandshakeState::Acknowledged;
                self.metrics.handshake_finished("acknowledged");
            }
            Err(e) => {
                tracing::warn!(phase = %self.state, error = %e, "Handshake failed");
                self.state = HandshakeState::Failed;
                self.metrics.handshake_finished("failed");
            }
        }
        result
    }

    fn await_peer(&mut self) -> Result<(), BridgeError> {
        self.state = HandshakeState::AwaitPeer;
        let hp = self.segment.layout().hp_offset();

        self.poller
            .wait(
                || (self.segment.load_u32(hp) == hp_state::READY).then_some(()),
                self.poll.readiness_interval,
                self.poll.readiness_timeout,
            )
            .map_err(|failure| {
                failure.into_error(|waited| BridgeError::HandshakeTimeout {
                    phase: HandshakeState::AwaitPeer,
                    waited,
                })
            })?;

        tracing::debug!("Peer ready to receive hyper-parameters");
        Ok(())
    }

    fn send_params(&mut self, params: &HyperParams) -> Result<(), BridgeError> {
        self.state = HandshakeState::SendParams;

        let segment = self.segment;
        let hp = segment.layout().hp_offset();
        let payload_offset = segment.layout().hp_payload_offset();
        let blob = params.encode();

        segment.write_bytes(payload_offset, &blob);
        segment.store_u32(hp, hp_state::PENDING);
        tracing::info!("Hyper-parameters sent, waiting for acknowledgement");

        let started = Instant::now();
        let last_send = Cell::new(started);
        let resends = Cell::new(0u64);

        let outcome = self.poller.wait(
            || {
                let observed = segment.load_u32(hp);
                if observed == hp_state::ACKNOWLEDGED {
                    return Some(());
                }
                if last_send.get().elapsed() < self.poll.resend_interval {
                    return None;
                }

                // Only move the word from the value just observed; an ack
                // that lands in between must not be overwritten.
                segment.write_bytes(payload_offset, &blob);
                match segment.compare_exchange_u32(hp, observed, hp_state::PENDING) {
                    Err(hp_state::ACKNOWLEDGED) => return Some(()),
                    Err(other) => {
                        tracing::debug!(state = other, "State word changed during resend");
                    }
                    Ok(_) => {}
                }
                last_send.set(Instant::now());
                resends.set(resends.get() + 1);
                None
            },
            self.poll.readiness_interval.min(self.poll.resend_interval),
            self.poll.ack_timeout,
        );
        self.resends = resends.get();

        outcome.map_err(|failure| {
            failure.into_error(|waited| BridgeError::HandshakeTimeout {
                phase: HandshakeState::SendParams,
                waited,
            })
        })?;

        tracing::info!(
            resends = self.resends,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Peer acknowledged hyper-parameters"
        );
        Ok(())
    }
}

/// How long a handshake may take at most, for log messages.
pub fn handshake_budget(poll: &PollConfig) -> Option<Duration> {
    Some(poll.readiness_timeout? + poll.ack_timeout?)
}
