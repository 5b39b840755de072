use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Simulator executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Failed to tie the simulator to this process: {0}")]
    Cleanup(io::Error),

    #[error("Failed to signal simulator (pid {pid}): {reason}")]
    Signal { pid: u32, reason: String },
}
