use crate::errors::LaunchError;
use crate::options::LaunchOptions;
use common::wait::{PollOutcome, poll_until};
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a terminated simulator gets to exit before it is killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running simulator started by [`spawn_with_cleanup`].
///
/// Dropping the handle terminates the process if it is still running.
pub struct PeerProcess {
    child: Mutex<Child>,
    pid: u32,
    #[cfg(windows)]
    _job: crate::windows::JobHandle,
}

/// Start the simulator so that it dies with this process.
///
/// On Linux the child gets `PR_SET_PDEATHSIG(SIGTERM)`; on Windows it is
/// placed in a kill-on-close job object owned by the returned handle.
pub fn spawn_with_cleanup(options: &LaunchOptions) -> Result<PeerProcess, LaunchError> {
    std::fs::create_dir_all(&options.log_dir)?;
    let command = options.command();

    #[cfg(unix)]
    let spawned = crate::unix::spawn_dying_with_parent(command);
    #[cfg(windows)]
    let spawned = crate::windows::spawn_dying_with_parent(command);

    let spawned = spawned.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LaunchError::ExecutableNotFound(options.executable.clone()),
        _ => LaunchError::Cleanup(e),
    })?;

    #[cfg(unix)]
    let child = spawned;
    #[cfg(windows)]
    let (child, job) = spawned;

    let pid = child.id();
    tracing::info!(
        pid,
        executable = %options.executable.display(),
        log_file = %options.log_file().display(),
        "Simulator started"
    );

    Ok(PeerProcess {
        child: Mutex::new(child),
        pid,
        #[cfg(windows)]
        _job: job,
    })
}

impl PeerProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Exit status if the process has already exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.child().try_wait() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "Failed to query simulator status");
                None
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Ask the simulator to stop, then kill it if it is still running after `grace`.
    pub fn terminate(&self, grace: Duration) -> Result<ExitStatus, LaunchError> {
        if let Some(status) = self.exit_status() {
            return Ok(status);
        }

        self.request_stop()?;

        let never = AtomicBool::new(false);
        match poll_until(|| self.exit_status(), EXIT_POLL_INTERVAL, Some(grace), &never) {
            PollOutcome::Ready(status) => {
                tracing::info!(pid = self.pid, %status, "Simulator exited");
                Ok(status)
            }
            _ => {
                tracing::warn!(pid = self.pid, ?grace, "Simulator ignored termination, killing it");
                let mut child = self.child();
                child.kill()?;
                Ok(child.wait()?)
            }
        }
    }

    #[cfg(unix)]
    fn request_stop(&self) -> Result<(), LaunchError> {
        crate::unix::request_stop(self.pid).map_err(|e| LaunchError::Signal {
            pid: self.pid,
            reason: e.to_string(),
        })
    }

    /// There is no polite stop on Windows; the grace period is skipped.
    #[cfg(windows)]
    fn request_stop(&self) -> Result<(), LaunchError> {
        self.child().kill()?;
        Ok(())
    }
}

impl bridge::PeerStatus for PeerProcess {
    fn is_alive(&self) -> bool {
        PeerProcess::is_alive(self)
    }
}

impl Drop for PeerProcess {
    fn drop(&mut self) {
        if self.is_alive()
            && let Err(e) = self.terminate(DEFAULT_GRACE)
        {
            tracing::error!(pid = self.pid, error = %e, "Failed to stop simulator");
        }
    }
}

impl std::fmt::Debug for PeerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
