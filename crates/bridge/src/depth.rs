/// Per-channel weights the peer's shader packs depth with, most significant first.
pub const DEPTH_WEIGHTS: [f32; 4] = [1.0, 1.0 / 255.0, 1.0 / 65025.0, 1.0 / 160581375.0];

/// Clip planes the normalized depth is remapped onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub near: f32,
    pub far: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            near: 0.01,
            far: 300.0,
        }
    }
}

impl DepthRange {
    pub fn new(near: f32, far: f32) -> Self {
        Self { near, far }
    }

    /// Map a normalized depth in `[0, 1]` onto `[near, far]`.
    #[inline]
    pub fn remap(&self, normalized: f32) -> f32 {
        self.near + normalized.clamp(0.0, 1.0) * (self.far - self.near)
    }
}

/// Decode one packed RGBA pixel to a depth value.
///
/// The weighted sum of the saturated pixel slightly exceeds 1 and is clamped,
/// so `(255, 255, 255, 255)` decodes to exactly `far`.
#[inline]
pub fn decode_depth_rgba(rgba: [u8; 4], range: DepthRange) -> f32 {
    let normalized: f32 = rgba
        .iter()
        .zip(DEPTH_WEIGHTS)
        .map(|(&c, w)| (c as f32 / 255.0) * w)
        .sum();
    range.remap(normalized)
}

/// Decode a row-major buffer of `channels`-wide pixels. Only the first four
/// channels carry depth; missing ones count as zero.
pub fn decode_depth_buffer(pixels: &[u8], channels: usize, range: DepthRange) -> Vec<f32> {
    if channels == 0 {
        return Vec::new();
    }

    pixels
        .chunks_exact(channels)
        .map(|px| {
            let mut rgba = [0u8; 4];
            let n = px.len().min(4);
            rgba[..n].copy_from_slice(&px[..n]);
            decode_depth_rgba(rgba, range)
        })
        .collect()
}
