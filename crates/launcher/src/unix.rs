use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io;
use std::process::{Child, Command};

/// Spawn `command` so the kernel sends it SIGTERM when this process dies.
///
/// The death signal is armed in the child before `exec`. If the parent is
/// already gone by then, the signal would never fire, so the child exits
/// instead of running unsupervised.
#[cfg(target_os = "linux")]
pub(crate) fn spawn_dying_with_parent(mut command: Command) -> io::Result<Child> {
    use std::os::unix::process::CommandExt;

    let parent = nix::unistd::getpid();

    // SAFETY: the hook only calls prctl, getppid and _exit, all of which are
    // async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).map_err(io::Error::from)?;
            if nix::unistd::getppid() != parent {
                libc::_exit(1);
            }
            Ok(())
        });
    }

    command.spawn()
}

/// No parent-death signal outside Linux; the child is still terminated
/// when its handle is dropped.
#[cfg(not(target_os = "linux"))]
pub(crate) fn spawn_dying_with_parent(mut command: Command) -> io::Result<Child> {
    command.spawn()
}

pub(crate) fn request_stop(pid: u32) -> nix::Result<()> {
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
}
