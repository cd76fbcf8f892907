use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{decode_frame, has_complete_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Assembles frames from a `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Bytes of a following frame read in the same call stay buffered.
pub struct FrameReader<T> {
    inner: T,
    pending: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Block until one whole frame is available and return it.
    ///
    /// End of stream before the frame is complete, including before its
    /// first byte, is [`FrameError::PeerClosed`].
    pub fn read_frame(&mut self) -> Result<Frame> {
        let max = self.config.max_payload_size;
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, max)? {
                trace!(len = frame.payload.len(), "frame decoded");
                return Ok(frame);
            }
            if self.fill()? == 0 {
                debug!(buffered = self.pending.len(), "end of stream while reading frame");
                return Err(FrameError::PeerClosed);
            }
        }
    }

    /// Append one read's worth of bytes; zero means end of stream.
    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Whether a complete frame is already buffered, so the next
    /// [`read_frame`](Self::read_frame) will not touch the stream.
    pub fn has_buffered_frame(&self) -> Result<bool> {
        has_complete_frame(&self.pending, self.config.max_payload_size)
    }

    /// Bytes read ahead but not yet returned as frames.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
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

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::time::Duration;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut out);
        }
        out.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"one");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"two");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"three");
        assert!(matches!(reader.read_frame(), Err(FrameError::PeerClosed)));
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![b'a'; 64 * 1024];
        let mut reader = FrameReader::new(Cursor::new(wire(&[&payload])));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn frame_split_across_three_reads() {
        let payload = "{\"t\":\"call\",\"args\":[\"navigate\",\"about:blank\"]}".as_bytes();
        let bytes = wire(&[payload]);
        let cuts = [2, 20];

        let chunked = ChunkedReader {
            chunks: vec![
                bytes[..cuts[0]].to_vec(),
                bytes[cuts[0]..cuts[1]].to_vec(),
                bytes[cuts[1]..].to_vec(),
            ],
            reads: 0,
        };
        let mut split = FrameReader::new(chunked);
        let mut whole = FrameReader::new(Cursor::new(bytes.clone()));

        let from_split = split.read_frame().unwrap();
        let from_whole = whole.read_frame().unwrap();

        assert_eq!(from_split, from_whole);
        assert_eq!(split.get_ref().reads, 3);
    }

    #[test]
    fn buffered_frame_detection() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"first", b"second"])));
        assert!(!reader.has_buffered_frame().unwrap());

        // One read pulls both frames into the buffer.
        let _ = reader.read_frame().unwrap();
        assert!(reader.has_buffered_frame().unwrap());
        assert!(reader.buffered_len() > 0);

        let _ = reader.read_frame().unwrap();
        assert!(!reader.has_buffered_frame().unwrap());
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_peer_closed());
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut reader = FrameReader::new(Cursor::new(b"16aonly-part".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PeerClosed));
    }

    #[test]
    fn invalid_prefix_in_stream() {
        let mut reader = FrameReader::new(Cursor::new(b"xx".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { .. }));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let cfg = FrameConfig {
            max_payload_size: 16,
        };
        let mut reader = FrameReader::with_config(Cursor::new(b"1024a".to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[b"ok"])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap().payload.as_ref(), b"ok");
    }

    #[test]
    fn roundtrip_over_pipe_with_delayed_chunks() {
        let (read, mut write) = wvpipe_transport::pipe().unwrap();
        let bytes = wire(&["caf\u{00e9} a\u{00e0}".as_bytes()]);

        let writer = std::thread::spawn(move || {
            for chunk in bytes.chunks(4) {
                write.write_all(chunk).unwrap();
                std::thread::sleep(Duration::from_millis(5));
            }
        });

        let mut reader = FrameReader::new(read);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), "caf\u{00e9} a\u{00e0}".as_bytes());
        writer.join().unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().max_payload_size, crate::DEFAULT_MAX_PAYLOAD);
        let _inner = reader.into_inner();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct ChunkedReader {
        chunks: Vec<Vec<u8>>,
        reads: usize,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.reads >= self.chunks.len() {
                return Ok(0);
            }
            let chunk = &self.chunks[self.reads];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.reads += 1;
            Ok(chunk.len())
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
