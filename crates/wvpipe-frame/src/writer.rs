use std::io::{self, ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Frames payloads onto a `Write` stream.
///
/// Every [`send`](Self::send) leaves the stream flushed, so a frame is never
/// stranded in a userspace buffer while the peer waits for it.
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame `payload` and hand every byte of it to the stream.
    ///
    /// Short writes are continued where they stopped. A write that accepts
    /// zero bytes is [`FrameError::WriteZero`]. On a non-blocking stream a full
    /// buffer surfaces as an `Io` error of kind `WouldBlock`.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let max = self.config.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        self.scratch.clear();
        encode_frame(payload, &mut self.scratch);
        write_whole(&mut self.inner, &self.scratch)?;
        flush_retrying(&mut self.inner)?;
        trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn retryable(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted
}

fn write_whole<W: Write>(out: &mut W, wire: &[u8]) -> Result<()> {
    let mut written = 0;
    while let Some(rest) = wire.get(written..).filter(|rest| !rest.is_empty()) {
        match out.write(rest) {
            Ok(0) => {
                return Err(FrameError::WriteZero {
                    written,
                    total: wire.len(),
                })
            }
            Ok(n) => written += n,
            Err(err) if retryable(&err) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn flush_retrying<W: Write>(out: &mut W) -> Result<()> {
    loop {
        match out.flush() {
            Err(err) if retryable(&err) => {}
            other => return other.map_err(FrameError::from),
        }
    }
}
