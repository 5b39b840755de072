//! Names of the shared object the simulator publishes.

use std::path::PathBuf;

/// Map name the simulator uses unless told otherwise.
pub const DEFAULT_MAP_NAME: &str = "paris3d_ipc";

/// Directory backing POSIX shared memory objects.
pub const SHM_DIR: &str = "/dev/shm";

/// Backing file of a named POSIX shared memory object.
pub fn shm_path(map_name: &str) -> PathBuf {
    PathBuf::from(SHM_DIR).join(map_name.trim_start_matches('/'))
}
