use serde::Serialize;

/// Player position and rotation as reported by the peer each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
}

impl Pose {
    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn rotation(&self) -> [f32; 3] {
        [self.rx, self.ry, self.rz]
    }
}

/// Snapshot of the peer-owned global header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalHeader {
    pub update_index: u32,
    pub camera_count: u32,
    pub pose: Pose,
    pub collisions: [u8; 16],
}

impl GlobalHeader {
    /// Indices of the collision slots currently set.
    pub fn active_collisions(&self) -> impl Iterator<Item = usize> + '_ {
        self.collisions
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag != 0)
            .map(|(i, _)| i)
    }
}
