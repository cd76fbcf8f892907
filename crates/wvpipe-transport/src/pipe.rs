use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Read end of an anonymous pipe.
#[derive(Debug)]
pub struct PipeReader {
    file: File,
}

/// Write end of an anonymous pipe.
#[derive(Debug)]
pub struct PipeWriter {
    file: File,
}

/// Create a unidirectional pipe.
///
/// Both ends are close-on-exec; use [`set_inheritable`] (or a `pre_exec`
/// hook with [`crate::clear_cloexec_raw`]) to hand one end to a child.
pub fn pipe() -> Result<(PipeReader, PipeWriter)> {
    let mut fds: [libc::c_int; 2] = [-1; 2];

    #[cfg(target_os = "linux")]
    // SAFETY: `fds` is a valid, writable array of two c_ints.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    #[cfg(not(target_os = "linux"))]
    // SAFETY: `fds` is a valid, writable array of two c_ints.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };

    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    // SAFETY: pipe(2) just returned these descriptors and nothing else owns them.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    #[cfg(not(target_os = "linux"))]
    {
        set_inheritable(read.as_fd(), false)?;
        set_inheritable(write.as_fd(), false)?;
    }

    debug!(read_fd = fds[0], write_fd = fds[1], "created pipe");

    Ok((
        PipeReader {
            file: File::from(read),
        },
        PipeWriter {
            file: File::from(write),
        },
    ))
}

/// Toggle whether a descriptor survives `exec` (clears or sets `FD_CLOEXEC`).
pub fn set_inheritable(fd: BorrowedFd<'_>, inheritable: bool) -> Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: `raw` is borrowed from a live descriptor for the duration of the call.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let new_flags = if inheritable {
        flags & !libc::FD_CLOEXEC
    } else {
        flags | libc::FD_CLOEXEC
    };
    if new_flags != flags {
        // SAFETY: as above; F_SETFD only touches descriptor flags.
        let rc = unsafe { libc::fcntl(raw, libc::F_SETFD, new_flags) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

/// Take ownership of an inherited descriptor number after checking it is open.
///
/// The adopted descriptor is switched back to close-on-exec so it does not leak
/// into processes spawned later.
///
/// # Safety
///
/// `fd` must not be owned by anything else in this process. Descriptor numbers
/// passed on the command line by the spawning parent satisfy this when adopted
/// once at startup.
unsafe fn adopt(fd: RawFd) -> Result<OwnedFd> {
    // SAFETY: F_GETFD on an arbitrary number is harmless; EBADF tells us it is closed.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(TransportError::InvalidDescriptor(fd));
    }
    // SAFETY: the caller guarantees exclusive ownership of `fd`.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    set_inheritable(owned.as_fd(), false)?;
    Ok(owned)
}

impl PipeReader {
    /// Adopt an inherited read descriptor.
    ///
    /// # Safety
    ///
    /// See [`PipeWriter::from_inherited`]; the same ownership rule applies.
    pub unsafe fn from_inherited(fd: RawFd) -> Result<Self> {
        // SAFETY: forwarded from the caller's contract.
        let owned = unsafe { adopt(fd)? };
        debug!(fd, "adopted inherited read descriptor");
        Ok(Self {
            file: File::from(owned),
        })
    }
}

impl PipeWriter {
    /// Adopt an inherited write descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must be open and must not be owned by any other object in this
    /// process.
    pub unsafe fn from_inherited(fd: RawFd) -> Result<Self> {
        // SAFETY: forwarded from the caller's contract.
        let owned = unsafe { adopt(fd)? };
        debug!(fd, "adopted inherited write descriptor");
        Ok(Self {
            file: File::from(owned),
        })
    }

    /// Switch `O_NONBLOCK` on or off. A write to a full pipe then fails with
    /// `WouldBlock` instead of waiting for the reader.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let raw = self.file.as_raw_fd();
        // SAFETY: `raw` belongs to `self.file`, which outlives the call.
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        if flags < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        let new_flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if new_flags != flags {
            // SAFETY: as above; F_SETFL only changes status flags.
            let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, new_flags) };
            if rc < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl AsFd for PipeReader {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsFd for PipeWriter {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for PipeReader {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsRawFd for PipeWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
