use crate::errors::ProtocolViolation;
use std::fmt;

/// Function ids understood by the simulator. The numbering is part of the
/// wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FunctionId {
    MovePlayerTo = 1,
    RebuildChunks = 2,
    ForceCameraRead = 3,
    RotatePlayerTo = 4,
    MoveGoalTo = 5,
    PromoteChunk = 6,
}

impl FunctionId {
    pub const ALL: [FunctionId; 6] = [
        FunctionId::MovePlayerTo,
        FunctionId::RebuildChunks,
        FunctionId::ForceCameraRead,
        FunctionId::RotatePlayerTo,
        FunctionId::MoveGoalTo,
        FunctionId::PromoteChunk,
    ];

    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FunctionId::MovePlayerTo => "MovePlayerTo",
            FunctionId::RebuildChunks => "RebuildChunks",
            FunctionId::ForceCameraRead => "ForceCameraRead",
            FunctionId::RotatePlayerTo => "RotatePlayerTo",
            FunctionId::MoveGoalTo => "MoveGoalTo",
            FunctionId::PromoteChunk => "PromoteChunk",
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for FunctionId {
    type Error = ProtocolViolation;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_u32() == value)
            .ok_or(ProtocolViolation::UnknownFunction(value))
    }
}

/// A fire-and-track call: function id plus up to three float arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    MovePlayerTo { x: f32, y: f32, z: f32 },
    RotatePlayerTo { x: f32, y: f32, z: f32 },
    MoveGoalTo { x: f32, y: f32, z: f32 },
    RebuildChunks,
    ForceCameraRead,
    /// The chunk index travels in the first float slot.
    PromoteChunk { index: u32 },
}

impl Command {
    pub fn function_id(&self) -> FunctionId {
        match self {
            Command::MovePlayerTo { .. } => FunctionId::MovePlayerTo,
            Command::RotatePlayerTo { .. } => FunctionId::RotatePlayerTo,
            Command::MoveGoalTo { .. } => FunctionId::MoveGoalTo,
            Command::RebuildChunks => FunctionId::RebuildChunks,
            Command::ForceCameraRead => FunctionId::ForceCameraRead,
            Command::PromoteChunk { .. } => FunctionId::PromoteChunk,
        }
    }

    /// Argument slots in wire order; unused slots are zero.
    pub fn args(&self) -> [f32; 3] {
        match *self {
            Command::MovePlayerTo { x, y, z }
            | Command::RotatePlayerTo { x, y, z }
            | Command::MoveGoalTo { x, y, z } => [x, y, z],
            Command::RebuildChunks | Command::ForceCameraRead => [0.0; 3],
            Command::PromoteChunk { index } => [index as f32, 0.0, 0.0],
        }
    }
}

/// One record of the per-tick action stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Action {
    pub forward: i32,
    pub turn: i32,
    pub vertical: i32,
    pub gravity: i32,
}

impl Action {
    /// All controls released; used for blank ticks.
    pub const BLANK: Action = Action::new(0, 0, 0, 0);

    pub const fn new(forward: i32, turn: i32, vertical: i32, gravity: i32) -> Self {
        Self {
            forward,
            turn,
            vertical,
            gravity,
        }
    }
}
