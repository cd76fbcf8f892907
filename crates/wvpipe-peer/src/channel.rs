use std::fmt;
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{debug, trace};
use wvpipe_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use wvpipe_transport::poll_readable;

use crate::datagram::Datagram;
use crate::error::{PeerError, Result};

/// Which side of the parent/worker pair a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Parent,
    Worker,
}

impl Role {
    /// The role at the other end of the channel.
    pub fn peer(self) -> Role {
        match self {
            Role::Parent => Role::Worker,
            Role::Worker => Role::Parent,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Parent => f.write_str("parent"),
            Role::Worker => f.write_str("worker"),
        }
    }
}

/// Bidirectional datagram channel over a read stream and a write stream.
///
/// Each direction is strictly ordered. The channel does no multiplexing:
/// one reader, one writer, one owner.
pub struct Channel<R, W> {
    role: Role,
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    sent: u64,
    received: u64,
}

impl<R: Read, W: Write> Channel<R, W> {
    /// Create a channel with default frame configuration.
    pub fn new(role: Role, reader: R, writer: W) -> Self {
        Self::with_config(role, reader, writer, FrameConfig::default())
    }

    /// Create a channel with explicit frame configuration.
    pub fn with_config(role: Role, reader: R, writer: W, config: FrameConfig) -> Self {
        Self {
            role,
            reader: FrameReader::with_config(reader, config.clone()),
            writer: FrameWriter::with_config(writer, config),
            sent: 0,
            received: 0,
        }
    }

    /// Serialize and send one datagram, blocking until fully written.
    pub fn send(&mut self, datagram: &Datagram) -> Result<()> {
        let payload = datagram.encode()?;
        self.writer.send(&payload).map_err(|err| self.map_frame_error(err))?;
        self.sent += 1;
        trace!(role = %self.role, kind = datagram.kind(), bytes = payload.len(), "sent datagram");
        Ok(())
    }

    /// Block until one complete datagram has arrived and decode it.
    ///
    /// End-of-stream before a whole frame is [`PeerError::PeerClosed`].
    pub fn receive(&mut self) -> Result<Datagram> {
        let frame = self
            .reader
            .read_frame()
            .map_err(|err| self.map_frame_error(err))?;
        self.received += 1;
        let datagram = Datagram::decode(&frame.payload)?;
        trace!(role = %self.role, kind = datagram.kind(), bytes = frame.payload.len(), "received datagram");
        Ok(datagram)
    }

    /// Number of datagrams written so far.
    pub fn messages_sent(&self) -> u64 {
        self.sent
    }

    /// Number of frames read so far.
    pub fn messages_received(&self) -> u64 {
        self.received
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Borrow the underlying read stream.
    pub fn reader_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Borrow the underlying write stream.
    pub fn writer_ref(&self) -> &W {
        self.writer.get_ref()
    }

    fn map_frame_error(&self, err: FrameError) -> PeerError {
        if err.is_peer_closed() {
            debug!(role = %self.role, "peer closed the channel");
            PeerError::PeerClosed(self.role.peer())
        } else {
            PeerError::Frame(err)
        }
    }
}

impl<R: Read + AsFd, W: Write> Channel<R, W> {
    /// Wait up to `timeout` for a datagram without consuming it.
    ///
    /// A frame already sitting in the read-ahead buffer counts as ready. A
    /// zero timeout is an instantaneous check. A closed peer also reports
    /// ready so the following [`receive`](Self::receive) can surface it.
    pub fn ready(&self, timeout: Duration) -> Result<bool> {
        if self.reader.has_buffered_frame()? {
            return Ok(true);
        }
        Ok(poll_readable(self.reader.get_ref().as_fd(), timeout)?.is_ready())
    }
}

impl Channel<UnixStream, UnixStream> {
    /// Use both directions of one connected socket.
    pub fn from_socket(role: Role, socket: UnixStream) -> Result<Self> {
        let writer = socket.try_clone().map_err(wvpipe_transport::TransportError::from)?;
        Ok(Self::new(role, socket, writer))
    }
}
