use std::os::raw::c_int;

/// Errors that can occur in pipe transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on a pipe or descriptor.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A readiness check reported an error condition on the descriptor.
    #[error("readiness check reported a stream fault on fd {fd} (revents={revents:#06x})")]
    Readiness { fd: c_int, revents: i16 },

    /// A descriptor number handed to this process is not open.
    #[error("descriptor {0} is not open in this process")]
    InvalidDescriptor(c_int),

    /// Sending a signal to a process failed.
    #[error("failed to signal pid {pid}: {source}")]
    Signal { pid: u32, source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, TransportError>;
