/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The bytes before the delimiter are not a decimal length.
    #[error("invalid frame length prefix {prefix:?}")]
    InvalidLength { prefix: String },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying stream accepted zero bytes of a frame.
    #[error("write returned zero bytes ({written} of {total} written)")]
    WriteZero { written: usize, total: usize },

    /// End-of-stream arrived before a complete frame was assembled.
    ///
    /// Expected when the other process has exited.
    #[error("peer closed the stream before a complete frame arrived (did the other process exit?)")]
    PeerClosed,
}

impl FrameError {
    /// Whether this error means the peer went away rather than a local fault.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, FrameError::PeerClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
