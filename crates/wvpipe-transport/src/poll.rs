use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Outcome of a readiness check on a readable descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Bytes are available to read.
    Readable,
    /// The write side is closed; the next read reports end-of-stream.
    Hangup,
    /// Nothing arrived within the timeout.
    Pending,
}

impl Readiness {
    /// Whether a read would return without blocking.
    pub fn is_ready(self) -> bool {
        !matches!(self, Readiness::Pending)
    }
}

/// Wait up to `timeout` for `fd` to become readable without consuming data.
///
/// A zero timeout is an instantaneous check. `POLLERR`/`POLLNVAL` are reported
/// as [`TransportError::Readiness`]; a hangup counts as ready so the caller's
/// next read observes end-of-stream.
pub fn poll_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<Readiness> {
    let raw = fd.as_raw_fd();
    let Some(revents) = poll_once(raw, libc::POLLIN, timeout)? else {
        return Ok(Readiness::Pending);
    };

    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(TransportError::Readiness { fd: raw, revents });
    }
    if revents & libc::POLLIN != 0 {
        return Ok(Readiness::Readable);
    }
    if revents & libc::POLLHUP != 0 {
        return Ok(Readiness::Hangup);
    }
    Ok(Readiness::Pending)
}

/// Wait up to `timeout` until a write to `fd` would not block.
///
/// Returns `false` when the pipe stayed full. A write end whose reader is
/// gone reports `POLLERR`; that counts as writable so the caller's write
/// observes the broken pipe.
pub fn poll_writable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let raw = fd.as_raw_fd();
    let Some(revents) = poll_once(raw, libc::POLLOUT, timeout)? else {
        return Ok(false);
    };
    if revents & libc::POLLNVAL != 0 {
        return Err(TransportError::Readiness { fd: raw, revents });
    }
    Ok(revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0)
}

/// One `poll(2)` call; `None` when nothing happened before the timeout or
/// the wait was interrupted.
fn poll_once(raw: libc::c_int, events: libc::c_short, timeout: Duration) -> Result<Option<i16>> {
    let mut pfd = libc::pollfd {
        fd: raw,
        events,
        revents: 0,
    };

    // SAFETY: `pfd` is a valid pollfd for the duration of the call and nfds is 1.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_millis(timeout)) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(None);
        }
        return Err(err.into());
    }
    if rc == 0 {
        return Ok(None);
    }
    Ok(Some(pfd.revents))
}

fn timeout_millis(timeout: Duration) -> libc::c_int {
    if timeout.is_zero() {
        return 0;
    }
    // Round sub-millisecond waits up so they still block briefly.
    let ms = timeout.as_millis().max(1);
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}
