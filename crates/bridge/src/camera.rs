use crate::depth::{DepthRange, decode_depth_buffer};
use crate::errors::{BridgeError, ProtocolViolation, violation};
use crate::hyper_params::HyperParams;
use crate::layout::{self, global};
use crate::segment::Segment;
use serde::Serialize;
use std::fmt;

/// What a camera block is used for, as opposed to where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraRole {
    Color,
    Depth,
    Normals,
    Semantic,
}

impl CameraRole {
    /// Declaration order; enabled roles are assigned to blocks in this order.
    pub const ORDER: [CameraRole; 4] = [
        CameraRole::Color,
        CameraRole::Depth,
        CameraRole::Normals,
        CameraRole::Semantic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CameraRole::Color => "color",
            CameraRole::Depth => "depth",
            CameraRole::Normals => "normals",
            CameraRole::Semantic => "semantic",
        }
    }
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The 16-byte header the peer writes in front of each camera block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraHeader {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl CameraHeader {
    pub fn pixel_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    fn read(segment: &Segment, index: usize) -> Self {
        let base = segment.layout().camera_block_offset(index);
        Self {
            id: segment.read_u32(base + layout::camera::ID),
            width: segment.read_u32(base + layout::camera::WIDTH),
            height: segment.read_u32(base + layout::camera::HEIGHT),
            channels: segment.read_u32(base + layout::camera::CHANNELS),
        }
    }
}

/// Where one declared camera's pixels live, resolved once after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraBinding {
    pub index: usize,
    /// `None` for blocks beyond the enabled roles.
    pub role: Option<CameraRole>,
    pub header: CameraHeader,
    pub offset: usize,
}

impl CameraBinding {
    pub fn len(&self) -> usize {
        self.header.pixel_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display label; unlabelled blocks are named after their index.
    pub fn label(&self) -> String {
        match self.role {
            Some(role) => role.to_string(),
            None => format!("cam{}", self.index),
        }
    }
}

/// Read the declared cameras and assign roles.
///
/// Blocks are matched to the enabled roles positionally. Any declared
/// dimension beyond what the layout reserved is fatal: both sides disagree
/// on segment sizing.
pub fn bind_cameras(
    segment: &Segment,
    params: &HyperParams,
) -> Result<Vec<CameraBinding>, BridgeError> {
    let layout = *segment.layout();
    let declared = segment.read_u32(global::CAMERA_COUNT);

    if declared as usize > layout.max_cameras() {
        return Err(violation(ProtocolViolation::TooManyCameras {
            declared,
            max: layout.max_cameras(),
        }));
    }

    let mut roles = params.enabled_roles();
    let mut bindings = Vec::with_capacity(declared as usize);

    for index in 0..declared as usize {
        let header = CameraHeader::read(segment, index);

        let max_side = layout.max_resolution() as u32;
        if header.width > max_side
            || header.height > max_side
            || header.channels as usize > layout.bytes_per_pixel()
        {
            return Err(violation(ProtocolViolation::CameraTooLarge {
                index,
                width: header.width,
                height: header.height,
                channels: header.channels,
                max_resolution: layout.max_resolution(),
                bytes_per_pixel: layout.bytes_per_pixel(),
            }));
        }

        let binding = CameraBinding {
            index,
            role: roles.next(),
            header,
            offset: layout.camera_pixel_offset(index),
        };

        tracing::info!(
            camera = %binding.label(),
            id = header.id,
            width = header.width,
            height = header.height,
            channels = header.channels,
            offset = format_args!("0x{:X}", binding.offset),
            "Bound camera"
        );

        bindings.push(binding);
    }

    Ok(bindings)
}

/// Zero-copy view over one camera's pixels.
///
/// Borrows the session, so it cannot outlive the mapping. The peer rewrites
/// the pixels every render; copy them out if a stable snapshot is needed.
#[derive(Clone, Copy)]
pub struct CameraFrame<'a> {
    binding: CameraBinding,
    pixels: &'a [u8],
}

impl<'a> CameraFrame<'a> {
    pub(crate) fn new(segment: &'a Segment, binding: CameraBinding) -> Self {
        Self {
            binding,
            pixels: segment.slice(binding.offset, binding.len()),
        }
    }

    pub fn binding(&self) -> &CameraBinding {
        &self.binding
    }

    pub fn role(&self) -> Option<CameraRole> {
        self.binding.role
    }

    pub fn header(&self) -> &CameraHeader {
        &self.binding.header
    }

    pub fn width(&self) -> usize {
        self.binding.header.width as usize
    }

    pub fn height(&self) -> usize {
        self.binding.header.height as usize
    }

    pub fn channels(&self) -> usize {
        self.binding.header.channels as usize
    }

    /// Row-major, `height x width x channels` bytes.
    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn row(&self, y: usize) -> &'a [u8] {
        let stride = self.width() * self.channels();
        &self.pixels[y * stride..(y + 1) * stride]
    }

    /// The channels of one pixel. Panics outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> &'a [u8] {
        assert!(
            x < self.width() && y < self.height(),
            "pixel ({}, {}) outside {}x{} frame",
            x,
            y,
            self.width(),
            self.height()
        );
        let channels = self.channels();
        let start = (y * self.width() + x) * channels;
        &self.pixels[start..start + channels]
    }

    /// Decode a packed RGBA depth frame into one depth value per pixel.
    pub fn decode_depth(&self, range: DepthRange) -> Vec<f32> {
        decode_depth_buffer(self.pixels, self.channels(), range)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.pixels.to_vec()
    }
}

impl fmt::Debug for CameraFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraFrame")
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}
