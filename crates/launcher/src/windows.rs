use std::io;
use std::os::windows::io::AsRawHandle;
use std::process::{Child, Command};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
    JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JobObjectExtendedLimitInformation,
    SetInformationJobObject,
};

/// A kill-on-close job object. Closing the last handle, including when this
/// process dies, terminates every process assigned to it.
pub(crate) struct JobHandle(HANDLE);

impl Drop for JobHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn create_kill_on_close_job() -> io::Result<JobHandle> {
    unsafe {
        let job = CreateJobObjectW(std::ptr::null(), std::ptr::null());
        if job == 0 {
            return Err(io::Error::last_os_error());
        }
        let job = JobHandle(job);

        let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
        info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;

        let result = SetInformationJobObject(
            job.0,
            JobObjectExtendedLimitInformation,
            &info as *const _ as *const _,
            std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
        );
        if result == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(job)
    }
}

/// Spawn `command` inside a fresh kill-on-close job.
///
/// The returned job handle must live as long as the child should.
pub(crate) fn spawn_dying_with_parent(mut command: Command) -> io::Result<(Child, JobHandle)> {
    let job = create_kill_on_close_job()?;
    let mut child = command.spawn()?;

    let child_handle = child.as_raw_handle() as HANDLE;
    let result = unsafe { AssignProcessToJobObject(job.0, child_handle) };
    if result == 0 {
        let err = io::Error::last_os_error();
        let _ = child.kill();
        let _ = child.wait();
        return Err(err);
    }

    Ok((child, job))
}
