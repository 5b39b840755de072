use crate::camera::{CameraBinding, CameraFrame, CameraRole, bind_cameras};
use crate::command::{Action, Command, FunctionId};
use crate::config::PollConfig;
use crate::errors::{BridgeError, ProtocolViolation, violation};
use crate::handshake::{Handshake, handshake_budget};
use crate::hyper_params::HyperParams;
use crate::layout::{self, SegmentLayout, global};
use crate::metrics::BridgeMetrics;
use crate::poller::{PeerStatus, Poller};
use crate::segment::Segment;
use crate::types::{GlobalHeader, Pose};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Configures and establishes a [`Session`].
pub struct SessionBuilder {
    params: HyperParams,
    poll: PollConfig,
    cancel: Arc<AtomicBool>,
    peer: Option<Arc<dyn PeerStatus>>,
}

impl SessionBuilder {
    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Raising this flag makes every wait of the session return `Cancelled`.
    pub fn cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn peer(mut self, peer: Arc<dyn PeerStatus>) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Open the named segment, then establish over it.
    pub fn connect(self, name: &str, layout: SegmentLayout) -> Result<Session, BridgeError> {
        let segment = Segment::open(name, layout, &self.poll, &self.cancel)?;
        self.establish(segment)
    }

    /// Run the handshake and bind cameras. On success the session owns the
    /// segment; on failure the segment is dropped and unmapped.
    pub fn establish(self, segment: Segment) -> Result<Session, BridgeError> {
        let metrics = BridgeMetrics::new();

        tracing::info!(
            segment_bytes = segment.len(),
            budget = ?handshake_budget(&self.poll),
            "Establishing session"
        );

        {
            let poller = Poller::new(
                &self.cancel,
                self.peer.as_deref(),
                self.poll.liveness_interval,
            );
            Handshake::new(&segment, &self.poll, &poller, &metrics).run(&self.params)?;
        }

        let cameras = {
            let _span = common::span!("bind_cameras");
            bind_cameras(&segment, &self.params)?
        };

        Ok(Session {
            segment: Some(segment),
            params: self.params,
            cameras,
            poll: self.poll,
            cancel: self.cancel,
            peer: self.peer,
            next_sequence: 1,
            metrics,
        })
    }
}

/// One established connection to the simulator.
///
/// Owns the mapping and every per-session counter. Camera frames borrow the
/// session, so none can outlive it; command methods take `&mut self`, so at
/// most one call is issued at a time from this side.
pub struct Session {
    segment: Option<Segment>,
    params: HyperParams,
    cameras: Vec<CameraBinding>,
    poll: PollConfig,
    cancel: Arc<AtomicBool>,
    peer: Option<Arc<dyn PeerStatus>>,
    next_sequence: u32,
    metrics: BridgeMetrics,
}

impl Session {
    pub fn builder(params: HyperParams) -> SessionBuilder {
        SessionBuilder {
            params,
            poll: PollConfig::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            peer: None,
        }
    }

    pub fn establish(
        segment: Segment,
        params: HyperParams,
        poll: PollConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, BridgeError> {
        Self::builder(params)
            .poll(poll)
            .cancel(cancel)
            .establish(segment)
    }

    /// Consult `peer` in every later wait; a dead peer ends the wait with `PeerGone`.
    pub fn attach_peer(&mut self, peer: Arc<dyn PeerStatus>) {
        self.peer = Some(peer);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn segment(&self) -> Result<&Segment, BridgeError> {
        self.segment.as_ref().ok_or(BridgeError::Closed)
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(
            &self.cancel,
            self.peer.as_deref(),
            self.poll.liveness_interval,
        )
    }

    pub fn hyper_params(&self) -> &HyperParams {
        &self.params
    }

    pub fn layout(&self) -> Result<SegmentLayout, BridgeError> {
        Ok(*self.segment()?.layout())
    }

    // ---- fire-and-track calls ----

    /// Issue `command`, optionally blocking until the peer clears the slot.
    ///
    /// Fails without writing anything if a previous call is still outstanding.
    pub fn call(&mut self, command: Command, wait: bool) -> Result<(), BridgeError> {
        let segment = self.segment()?;
        let layout = segment.layout();
        let id = command.function_id();

        let pending = segment.load_u32(layout.func_offset());
        if pending != 0 {
            return Err(violation(ProtocolViolation::CallOutstanding {
                pending,
                requested: id,
            }));
        }

        let args_offset = layout.args_offset();
        for (i, arg) in command.args().into_iter().enumerate() {
            segment.write_f32(args_offset + i * 4, arg);
        }
        segment.store_u32(layout.func_offset(), id.as_u32());

        self.metrics.command_issued(id);
        tracing::debug!(function = %id, args = ?command.args(), wait, "Issued call");

        if wait {
            let started = Instant::now();
            self.wait_for_completion()?;
            self.metrics.command_completed(id, started.elapsed());
            tracing::debug!(
                function = %id,
                elapsed_us = started.elapsed().as_micros() as u64,
                "Call completed"
            );
        }
        Ok(())
    }

    /// Block until no call is outstanding. There is no deadline; raise the
    /// cancel flag to abandon the wait.
    pub fn wait_for_completion(&self) -> Result<(), BridgeError> {
        let segment = self.segment()?;
        let func = segment.layout().func_offset();

        self.poller().wait_unbounded(
            || (segment.load_u32(func) == 0).then_some(()),
            self.poll.completion_interval,
        )
    }

    /// The call the peer has not finished yet, if any.
    pub fn pending_call(&self) -> Result<Option<FunctionId>, BridgeError> {
        let segment = self.segment()?;
        match segment.load_u32(segment.layout().func_offset()) {
            0 => Ok(None),
            raw => FunctionId::try_from(raw).map(Some).map_err(violation),
        }
    }

    /// Teleport the player. When waiting, chunks are rebuilt around the new
    /// position before returning.
    pub fn move_player(&mut self, x: f32, y: f32, z: f32, wait: bool) -> Result<(), BridgeError> {
        self.call(Command::MovePlayerTo { x, y, z }, wait)?;
        if wait {
            self.rebuild_chunks()?;
        }
        Ok(())
    }

    pub fn rotate_player(&mut self, x: f32, y: f32, z: f32, wait: bool) -> Result<(), BridgeError> {
        self.call(Command::RotatePlayerTo { x, y, z }, wait)
    }

    pub fn move_goal(&mut self, x: f32, y: f32, z: f32, wait: bool) -> Result<(), BridgeError> {
        self.call(Command::MoveGoalTo { x, y, z }, wait)
    }

    pub fn rebuild_chunks(&mut self) -> Result<(), BridgeError> {
        self.call(Command::RebuildChunks, true)
    }

    /// Ask the peer to render every camera now.
    pub fn force_camera_read(&mut self) -> Result<(), BridgeError> {
        self.call(Command::ForceCameraRead, true)
    }

    pub fn promote_chunk(&mut self, index: u32, wait: bool) -> Result<(), BridgeError> {
        self.call(Command::PromoteChunk { index }, wait)
    }

    // ---- stepped actions ----

    /// Sequence number the next action will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Publish one action record without waiting for the tick.
    ///
    /// The controls are written first and the sequence word last, so a peer
    /// that sees the new sequence also sees the matching controls.
    pub fn write_action(&mut self, action: Action) -> Result<u32, BridgeError> {
        let segment = self.segment()?;
        let sequence = self.next_sequence;
        let following = sequence
            .checked_add(1)
            .ok_or_else(|| violation(ProtocolViolation::SequenceExhausted))?;

        let base = segment.layout().action_offset();
        segment.write_i32(base + layout::action::FORWARD, action.forward);
        segment.write_i32(base + layout::action::TURN, action.turn);
        segment.write_i32(base + layout::action::VERTICAL, action.vertical);
        segment.write_i32(base + layout::action::GRAVITY, action.gravity);
        segment.store_u32(base + layout::action::SEQUENCE, sequence);

        self.next_sequence = following;
        tracing::trace!(sequence, ?action, "Wrote action");
        Ok(sequence)
    }

    /// Write `action` and block until the peer finishes a tick. Returns the
    /// new update index.
    pub fn step(&mut self, action: Action) -> Result<u32, BridgeError> {
        let before = self.segment()?.load_u32(global::UPDATE_INDEX);
        self.write_action(action)?;

        let segment = self.segment()?;
        let index = self.poller().wait_unbounded(
            || {
                let now = segment.load_u32(global::UPDATE_INDEX);
                (now != before).then_some(now)
            },
            self.poll.completion_interval,
        )?;

        self.metrics.tick_observed();
        Ok(index)
    }

    /// Advance `n` ticks with all controls released.
    pub fn run_blank_ticks(&mut self, n: usize) -> Result<(), BridgeError> {
        for _ in 0..n {
            self.step(Action::BLANK)?;
        }
        Ok(())
    }

    // ---- read-back ----

    pub fn update_index(&self) -> Result<u32, BridgeError> {
        Ok(self.segment()?.load_u32(global::UPDATE_INDEX))
    }

    pub fn pose(&self) -> Result<Pose, BridgeError> {
        let segment = self.segment()?;
        let field = |i: usize| segment.read_f32(global::POSE + i * 4);
        Ok(Pose {
            x: field(0),
            y: field(1),
            z: field(2),
            rx: field(3),
            ry: field(4),
            rz: field(5),
        })
    }

    pub fn collisions(&self) -> Result<[u8; global::COLLISION_SLOTS], BridgeError> {
        let mut flags = [0u8; global::COLLISION_SLOTS];
        self.segment()?.read_bytes(global::COLLISIONS, &mut flags);
        Ok(flags)
    }

    pub fn global_header(&self) -> Result<GlobalHeader, BridgeError> {
        let segment = self.segment()?;
        Ok(GlobalHeader {
            update_index: segment.load_u32(global::UPDATE_INDEX),
            camera_count: segment.read_u32(global::CAMERA_COUNT),
            pose: self.pose()?,
            collisions: self.collisions()?,
        })
    }

    /// Text the peer left in the log region, up to the first NUL.
    pub fn peer_log(&self) -> Result<String, BridgeError> {
        let segment = self.segment()?;
        let mut raw = [0u8; layout::LOG_BYTES];
        segment.read_bytes(segment.layout().log_offset(), &mut raw);

        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    // ---- cameras ----

    pub fn cameras(&self) -> &[CameraBinding] {
        &self.cameras
    }

    /// The view bound to `role`, if that role was enabled and declared.
    pub fn frame(&self, role: CameraRole) -> Option<CameraFrame<'_>> {
        let binding = self.cameras.iter().find(|b| b.role == Some(role))?;
        self.view(*binding)
    }

    /// The view of the `index`-th declared block, labelled or not.
    pub fn frame_at(&self, index: usize) -> Option<CameraFrame<'_>> {
        let binding = self.cameras.get(index)?;
        self.view(*binding)
    }

    /// Every bound view in block order. Empty once closed.
    pub fn frames(&self) -> impl Iterator<Item = CameraFrame<'_>> + '_ {
        self.cameras.iter().filter_map(|b| self.view(*b))
    }

    fn view(&self, binding: CameraBinding) -> Option<CameraFrame<'_>> {
        let segment = self.segment.as_ref()?;
        Some(CameraFrame::new(segment, binding))
    }

    // ---- lifecycle ----

    /// Unmap the segment. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(segment) = self.segment.take() {
            segment.close();
            tracing::info!(
                actions = self.next_sequence - 1,
                "Closed shared-memory session"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.segment.is_none()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("segment", &self.segment)
            .field("cameras", &self.cameras)
            .field("next_sequence", &self.next_sequence)
            .field("peer_attached", &self.peer.is_some())
            .finish_non_exhaustive()
    }
}
