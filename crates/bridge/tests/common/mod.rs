//! A thread standing in for the simulator on the other side of the segment.

#![allow(dead_code)]

use bridge::handshake::hp_state;
use bridge::layout::{self, global};
use bridge::{HyperParams, PeerStatus, PollConfig, Segment, SegmentLayout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const LAYOUT: SegmentLayout = SegmentLayout::new(16, 4, 4);

pub fn sample_params() -> HyperParams {
    HyperParams {
        speed_factor: 1.0,
        spawn_pedestrians: false,
        spawn_cars: true,
        move_speed: 3.0,
        turn_speed: 30.0,
        vertical_speed: 1.0,
        momentum: 0.25,
        fixed_delta_time: 0.02,
        n_actions: 100,
        rgb: true,
        depth: true,
        normals: false,
        semantic: false,
        launch_streaming: false,
        render: true,
        image_width: 8,
        image_height: 4,
        vertical_fov: 70.0,
        start_x: 1.0,
        start_y: 2.0,
        start_z: 3.0,
    }
}

/// Intervals short enough for tests, with finite deadlines.
pub fn fast_poll() -> PollConfig {
    PollConfig {
        open_timeout: Some(Duration::from_secs(2)),
        open_interval: Duration::from_millis(5),
        readiness_timeout: Some(Duration::from_millis(500)),
        readiness_interval: Duration::from_millis(1),
        ack_timeout: Some(Duration::from_secs(2)),
        resend_interval: Duration::from_millis(10),
        completion_interval: Duration::ZERO,
        liveness_interval: Duration::from_millis(5),
    }
}

pub struct PeerOptions {
    /// (width, height, channels) of each declared camera block.
    pub cameras: Vec<(u32, u32, u32)>,
    /// Leave the state word at "acknowledged" so the controller never sees readiness.
    pub never_ready: bool,
    pub acknowledge: bool,
    /// Reset the state word to 0 instead of acknowledging, this many times.
    pub drop_first_pending: u32,
    pub complete_functions: bool,
    pub function_delay: Duration,
    pub tick_on_action: bool,
    pub log_text: &'static str,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            cameras: vec![(8, 4, 4), (8, 4, 4)],
            never_ready: false,
            acknowledge: true,
            drop_first_pending: 0,
            complete_functions: true,
            function_delay: Duration::ZERO,
            tick_on_action: true,
            log_text: "peer online",
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerReport {
    /// Payload the peer decoded when it acknowledged.
    pub params: Option<HyperParams>,
    pub pendings_dropped: u32,
    /// (function id, args) in the order the peer picked them up.
    pub calls: Vec<(u32, [f32; 3])>,
    /// Action sequence numbers in the order observed.
    pub sequences: Vec<u32>,
    /// Controls of the last action observed.
    pub last_controls: [i32; 4],
}

pub struct SimulatedPeer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<PeerReport>>,
    path: PathBuf,
}

impl SimulatedPeer {
    /// Create the backing file synchronously, then serve it from a thread.
    pub fn spawn(path: &Path, options: PeerOptions) -> Self {
        let segment = Segment::create_path(path, LAYOUT).unwrap();
        prepare(&segment, &options);

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || serve(segment, options, thread_stop));

        Self {
            stop,
            handle: Some(handle),
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) -> PeerReport {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for SimulatedPeer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn prepare(segment: &Segment, options: &PeerOptions) {
    let layout = segment.layout();

    segment.write_u32(global::CAMERA_COUNT, options.cameras.len() as u32);
    for (i, &(width, height, channels)) in options.cameras.iter().enumerate() {
        let base = layout.camera_block_offset(i);
        segment.write_u32(base + layout::camera::ID, 100 + i as u32);
        segment.write_u32(base + layout::camera::WIDTH, width);
        segment.write_u32(base + layout::camera::HEIGHT, height);
        segment.write_u32(base + layout::camera::CHANNELS, channels);

        // Every byte of camera i reads i + 1 so views can be told apart.
        let len = (width * height * channels) as usize;
        if len <= layout.max_pixel_bytes() {
            segment.write_bytes(layout.camera_pixel_offset(i), &vec![i as u8 + 1; len]);
        }
    }

    segment.write_bytes(layout.log_offset(), options.log_text.as_bytes());

    let state = if options.never_ready {
        hp_state::ACKNOWLEDGED
    } else {
        hp_state::READY
    };
    segment.store_u32(layout.hp_offset(), state);
}

fn serve(segment: Segment, options: PeerOptions, stop: Arc<AtomicBool>) -> PeerReport {
    let layout = *segment.layout();
    let mut report = PeerReport::default();
    let mut last_sequence = 0u32;
    let mut last_call_seen = 0u32;

    while !stop.load(Ordering::Relaxed) {
        if options.acknowledge
            && !options.never_ready
            && segment.load_u32(layout.hp_offset()) == hp_state::PENDING
        {
            if report.pendings_dropped < options.drop_first_pending {
                segment.store_u32(layout.hp_offset(), hp_state::READY);
                report.pendings_dropped += 1;
            } else {
                let mut blob = [0u8; HyperParams::ENCODED_LEN];
                segment.read_bytes(layout.hp_payload_offset(), &mut blob);
                report.params = Some(HyperParams::decode(&blob));
                segment.store_u32(layout.hp_offset(), hp_state::ACKNOWLEDGED);
            }
        }

        let id = segment.load_u32(layout.func_offset());
        if id != 0 && id != last_call_seen {
            let args = [
                segment.read_f32(layout.args_offset()),
                segment.read_f32(layout.args_offset() + 4),
                segment.read_f32(layout.args_offset() + 8),
            ];
            report.calls.push((id, args));
            last_call_seen = id;

            if options.complete_functions {
                thread::sleep(options.function_delay);
                if id == 1 {
                    segment.write_f32(global::POSE, args[0]);
                    segment.write_f32(global::POSE + 4, args[1]);
                    segment.write_f32(global::POSE + 8, args[2]);
                }
                segment.store_u32(layout.func_offset(), 0);
                last_call_seen = 0;
            }
        }

        let action = layout.action_offset();
        let sequence = segment.load_u32(action + layout::action::SEQUENCE);
        if sequence != last_sequence {
            last_sequence = sequence;
            report.sequences.push(sequence);
            report.last_controls = [
                segment.read_i32(action + layout::action::FORWARD),
                segment.read_i32(action + layout::action::TURN),
                segment.read_i32(action + layout::action::VERTICAL),
                segment.read_i32(action + layout::action::GRAVITY),
            ];

            if report.last_controls[3] != 0 {
                segment.write_bytes(global::COLLISIONS + 3, &[1]);
            }
            if options.tick_on_action {
                segment.increment_u32(global::UPDATE_INDEX);
            }
        }

        thread::sleep(Duration::from_micros(50));
    }

    report
}

/// Liveness probe the test flips by hand.
#[derive(Default)]
pub struct ManualPeer {
    dead: AtomicBool,
}

impl ManualPeer {
    pub fn kill(&self) {
        self.dead.store(true, Ordering::Relaxed);
    }
}

impl PeerStatus for ManualPeer {
    fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::Relaxed)
    }
}

pub fn open(path: &Path, cancel: &AtomicBool) -> Segment {
    let poll = fast_poll();
    Segment::open_path(path, LAYOUT, poll.open_timeout, poll.open_interval, cancel).unwrap()
}
