pub mod errors;
pub mod options;
pub mod process;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use errors::LaunchError;
pub use options::LaunchOptions;
pub use process::{DEFAULT_GRACE, PeerProcess, spawn_with_cleanup};
