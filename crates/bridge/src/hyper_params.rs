use crate::camera::CameraRole;
use crate::config::SimulatorConfig;
use crate::errors::BridgeError;
use crate::layout::{HP_PAYLOAD_BYTES, SegmentLayout};

/// Simulation parameters sent to the peer during the handshake.
///
/// Wire layout (little-endian, 84 bytes):
///
/// ```text
/// f32        speed_factor
/// u32 x 2    spawn_pedestrians, spawn_cars
/// f32 x 5    move_speed, turn_speed, vertical_speed, momentum, fixed_delta_time
/// u32 x 9    n_actions, rgb, depth, normals, semantic,
///            launch_streaming, render, image_width, image_height
/// f32 x 4    vertical_fov, start_x, start_y, start_z
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperParams {
    pub speed_factor: f32,
    pub spawn_pedestrians: bool,
    pub spawn_cars: bool,
    pub move_speed: f32,
    pub turn_speed: f32,
    pub vertical_speed: f32,
    pub momentum: f32,
    pub fixed_delta_time: f32,
    pub n_actions: u32,
    pub rgb: bool,
    pub depth: bool,
    pub normals: bool,
    pub semantic: bool,
    pub launch_streaming: bool,
    pub render: bool,
    pub image_width: u32,
    pub image_height: u32,
    pub vertical_fov: f32,
    pub start_x: f32,
    pub start_y: f32,
    pub start_z: f32,
}

struct Encoder {
    buf: [u8; HP_PAYLOAD_BYTES],
    pos: usize,
}

impl Encoder {
    fn put(&mut self, bytes: [u8; 4]) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&bytes);
        self.pos += 4;
    }

    fn f32(&mut self, v: f32) {
        self.put(v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.put(v.to_le_bytes());
    }

    fn flag(&mut self, v: bool) {
        self.u32(v as u32);
    }
}

struct Decoder<'a> {
    buf: &'a [u8; HP_PAYLOAD_BYTES],
    pos: usize,
}

impl Decoder<'_> {
    fn take(&mut self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        out
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn flag(&mut self) -> bool {
        self.u32() != 0
    }
}

impl HyperParams {
    pub const ENCODED_LEN: usize = HP_PAYLOAD_BYTES;

    pub fn encode(&self) -> [u8; HP_PAYLOAD_BYTES] {
        let mut enc = Encoder {
            buf: [0; HP_PAYLOAD_BYTES],
            pos: 0,
        };

        enc.f32(self.speed_factor);
        enc.flag(self.spawn_pedestrians);
        enc.flag(self.spawn_cars);

        enc.f32(self.move_speed);
        enc.f32(self.turn_speed);
        enc.f32(self.vertical_speed);
        enc.f32(self.momentum);
        enc.f32(self.fixed_delta_time);

        enc.u32(self.n_actions);
        enc.flag(self.rgb);
        enc.flag(self.depth);
        enc.flag(self.normals);
        enc.flag(self.semantic);
        enc.flag(self.launch_streaming);
        enc.flag(self.render);
        enc.u32(self.image_width);
        enc.u32(self.image_height);

        enc.f32(self.vertical_fov);
        enc.f32(self.start_x);
        enc.f32(self.start_y);
        enc.f32(self.start_z);

        debug_assert_eq!(enc.pos, HP_PAYLOAD_BYTES);
        enc.buf
    }

    pub fn decode(bytes: &[u8; HP_PAYLOAD_BYTES]) -> Self {
        let mut dec = Decoder { buf: bytes, pos: 0 };

        Self {
            speed_factor: dec.f32(),
            spawn_pedestrians: dec.flag(),
            spawn_cars: dec.flag(),
            move_speed: dec.f32(),
            turn_speed: dec.f32(),
            vertical_speed: dec.f32(),
            momentum: dec.f32(),
            fixed_delta_time: dec.f32(),
            n_actions: dec.u32(),
            rgb: dec.flag(),
            depth: dec.flag(),
            normals: dec.flag(),
            semantic: dec.flag(),
            launch_streaming: dec.flag(),
            render: dec.flag(),
            image_width: dec.u32(),
            image_height: dec.u32(),
            vertical_fov: dec.f32(),
            start_x: dec.f32(),
            start_y: dec.f32(),
            start_z: dec.f32(),
        }
    }

    /// Reject parameters the peer could not honour within `layout`.
    pub fn validate(&self, layout: &SegmentLayout) -> Result<(), BridgeError> {
        let max = layout.max_resolution() as u32;
        for (name, side) in [("width", self.image_width), ("height", self.image_height)] {
            if side == 0 || side > max {
                return Err(BridgeError::InvalidParams(format!(
                    "image {} {} outside 1..={}",
                    name, side, max
                )));
            }
        }

        if !(self.fixed_delta_time.is_finite() && self.fixed_delta_time > 0.0) {
            return Err(BridgeError::InvalidParams(format!(
                "fixed_delta_time must be positive, got {}",
                self.fixed_delta_time
            )));
        }

        if !(self.vertical_fov > 0.0 && self.vertical_fov < 180.0) {
            return Err(BridgeError::InvalidParams(format!(
                "vertical_fov must be within (0, 180), got {}",
                self.vertical_fov
            )));
        }

        let enabled = self.enabled_roles().count();
        if enabled > layout.max_cameras() {
            return Err(BridgeError::InvalidParams(format!(
                "{} cameras enabled, segment holds {}",
                enabled,
                layout.max_cameras()
            )));
        }

        Ok(())
    }

    pub fn role_enabled(&self, role: CameraRole) -> bool {
        match role {
            CameraRole::Color => self.rgb,
            CameraRole::Depth => self.depth,
            CameraRole::Normals => self.normals,
            CameraRole::Semantic => self.semantic,
        }
    }

    /// Enabled roles in camera declaration order.
    pub fn enabled_roles(&self) -> impl Iterator<Item = CameraRole> + '_ {
        CameraRole::ORDER
            .iter()
            .copied()
            .filter(|role| self.role_enabled(*role))
    }
}

impl From<&SimulatorConfig> for HyperParams {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            speed_factor: config.speed_factor,
            spawn_pedestrians: config.spawn_pedestrians,
            spawn_cars: config.spawn_cars,
            move_speed: config.move_speed,
            turn_speed: config.turn_speed,
            vertical_speed: config.vertical_speed,
            momentum: config.momentum,
            fixed_delta_time: config.fixed_delta_time,
            n_actions: config.number_of_steps,
            rgb: config.rgb_camera,
            depth: config.depth_camera,
            normals: config.normals_camera,
            semantic: config.semantic_camera,
            launch_streaming: config.launch_streaming,
            render: config.render,
            image_width: config.img_size,
            image_height: config.img_size,
            vertical_fov: config.vertical_fov,
            start_x: config.start_x,
            start_y: config.start_y,
            start_z: config.start_z,
        }
    }
}
