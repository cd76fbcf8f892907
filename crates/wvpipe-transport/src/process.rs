use std::os::fd::RawFd;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Clear `FD_CLOEXEC` on a raw descriptor.
///
/// Only calls `fcntl`, so it is safe to use from a `pre_exec` hook between
/// `fork` and `exec`.
pub fn clear_cloexec_raw(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: fcntl on a descriptor number has no memory-safety requirements.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Send `SIGKILL` to `pid`.
///
/// Returns `Ok(false)` when the process no longer exists.
pub fn force_kill(pid: u32) -> Result<bool> {
    // SAFETY: kill(2) has no memory-safety requirements.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        debug!(pid, "sent SIGKILL");
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!(pid, "process already gone");
        return Ok(false);
    }
    Err(TransportError::Signal { pid, source: err })
}
