//! Byte layout of the shared segment.
//!
//! ```text
//! 0               global header      update index, camera count, pose, collisions
//! ACTION          action slot        sequence + four i32 controls
//! HYPER_PARAMS    hyper-parameters   u32 state + fixed-layout payload
//! LOG             log region         NUL-terminated text written by the peer
//! FUNCTION        function id        u32, nonzero while a call is outstanding
//! ARGS            function args      3 x f32
//! CAMERAS         camera blocks      max_cameras x (16-byte header + pixels)
//! ```
//!
//! Every fixed offset below must match the simulator binary byte for byte.
//! Only the camera region depends on the resolution/camera-count parameters.

use crate::camera::CameraRole;

pub const GLOBAL_HEADER_BYTES: usize = 48;
pub const ACTION_BYTES: usize = 20;
pub const HP_STATE_BYTES: usize = 4;
pub const HP_PAYLOAD_BYTES: usize = 84;
pub const HP_BYTES: usize = HP_STATE_BYTES + HP_PAYLOAD_BYTES;
pub const LOG_BYTES: usize = 256;
pub const FUNC_BYTES: usize = 4;
pub const ARGS_BYTES: usize = 12;
pub const CAMERA_HEADER_BYTES: usize = 16;

pub const MAX_RESOLUTION: usize = 512;
pub const BYTES_PER_PIXEL: usize = 4;
pub const MAX_CAMERAS: usize = 4;

/// Field offsets inside the global header.
pub mod global {
    pub const UPDATE_INDEX: usize = 0;
    pub const CAMERA_COUNT: usize = 4;
    /// x, y, z, rx, ry, rz as consecutive f32.
    pub const POSE: usize = 8;
    pub const COLLISIONS: usize = 32;
    pub const COLLISION_SLOTS: usize = 16;
}

/// Field offsets inside the action slot.
pub mod action {
    pub const SEQUENCE: usize = 0;
    pub const FORWARD: usize = 4;
    pub const TURN: usize = 8;
    pub const VERTICAL: usize = 12;
    pub const GRAVITY: usize = 16;
}

/// Field offsets inside a camera block header.
pub mod camera {
    pub const ID: usize = 0;
    pub const WIDTH: usize = 4;
    pub const HEIGHT: usize = 8;
    pub const CHANNELS: usize = 12;
}

const ACTION_OFFSET: usize = GLOBAL_HEADER_BYTES;
const HP_OFFSET: usize = ACTION_OFFSET + ACTION_BYTES;
const LOG_OFFSET: usize = HP_OFFSET + HP_BYTES;
const FUNC_OFFSET: usize = LOG_OFFSET + LOG_BYTES;
const ARGS_OFFSET: usize = FUNC_OFFSET + FUNC_BYTES;
const CAMERA_BASE_OFFSET: usize = ARGS_OFFSET + ARGS_BYTES;

// Flags are accessed atomically and need natural alignment.
const _: () = assert!(global::UPDATE_INDEX % 4 == 0);
const _: () = assert!((ACTION_OFFSET + action::SEQUENCE) % 4 == 0);
const _: () = assert!(HP_OFFSET % 4 == 0);
const _: () = assert!(FUNC_OFFSET % 4 == 0);
const _: () = assert!(global::COLLISIONS + global::COLLISION_SLOTS == GLOBAL_HEADER_BYTES);

/// Sizing parameters of the segment. Both sides must agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    max_resolution: usize,
    bytes_per_pixel: usize,
    max_cameras: usize,
}

impl Default for SegmentLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl SegmentLayout {
    pub const DEFAULT: Self = Self::new(MAX_RESOLUTION, BYTES_PER_PIXEL, MAX_CAMERAS);

    pub const fn new(max_resolution: usize, bytes_per_pixel: usize, max_cameras: usize) -> Self {
        assert!(max_resolution > 0, "max_resolution must be positive");
        assert!(bytes_per_pixel > 0, "bytes_per_pixel must be positive");
        Self {
            max_resolution,
            bytes_per_pixel,
            max_cameras,
        }
    }

    pub const fn max_resolution(&self) -> usize {
        self.max_resolution
    }

    pub const fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub const fn max_cameras(&self) -> usize {
        self.max_cameras
    }

    /// Roles in the order they are matched to camera blocks.
    pub const fn camera_order(&self) -> &'static [CameraRole] {
        &CameraRole::ORDER
    }

    pub const fn action_offset(&self) -> usize {
        ACTION_OFFSET
    }

    /// Offset of the hyper-parameter state word.
    pub const fn hp_offset(&self) -> usize {
        HP_OFFSET
    }

    pub const fn hp_payload_offset(&self) -> usize {
        HP_OFFSET + HP_STATE_BYTES
    }

    pub const fn log_offset(&self) -> usize {
        LOG_OFFSET
    }

    pub const fn func_offset(&self) -> usize {
        FUNC_OFFSET
    }

    pub const fn args_offset(&self) -> usize {
        ARGS_OFFSET
    }

    pub const fn camera_base_offset(&self) -> usize {
        CAMERA_BASE_OFFSET
    }

    /// Largest pixel region a single camera block can hold.
    pub const fn max_pixel_bytes(&self) -> usize {
        self.max_resolution * self.max_resolution * self.bytes_per_pixel
    }

    /// Distance between consecutive camera blocks.
    pub const fn block_stride(&self) -> usize {
        CAMERA_HEADER_BYTES + self.max_pixel_bytes()
    }

    pub const fn camera_block_offset(&self, index: usize) -> usize {
        CAMERA_BASE_OFFSET + index * self.block_stride()
    }

    pub const fn camera_pixel_offset(&self, index: usize) -> usize {
        self.camera_block_offset(index) + CAMERA_HEADER_BYTES
    }

    /// Exact size of the segment the peer allocates.
    pub const fn total_size(&self) -> usize {
        CAMERA_BASE_OFFSET + self.block_stride() * self.max_cameras
    }
}
