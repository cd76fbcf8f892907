use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Byte separating the decimal length from the payload.
pub const DELIMITER: u8 = b'a';

/// Longest accepted length prefix; `usize::MAX` has 20 decimal digits.
pub const MAX_LENGTH_DIGITS: usize = 20;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (prefix + delimiter + payload).
    pub fn wire_size(&self) -> usize {
        decimal_len(self.payload.len()) + 1 + self.payload.len()
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬───────────┬─────────────────┐
/// │ Length           │ Delimiter │ Payload         │
/// │ ASCII decimal    │ 'a'       │ (Length bytes)  │
/// └──────────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    let prefix = payload.len().to_string();
    dst.reserve(prefix.len() + 1 + payload.len());
    dst.put_slice(prefix.as_bytes());
    dst.put_u8(DELIMITER);
    dst.put_slice(payload);
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some((header_len, payload_len)) = parse_header(src, max_payload)? else {
        return Ok(None);
    };

    if src.len() < header_len + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(header_len);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { payload }))
}

/// Whether `src` already holds at least one complete frame.
pub(crate) fn has_complete_frame(src: &[u8], max_payload: usize) -> Result<bool> {
    Ok(match parse_header(src, max_payload)? {
        Some((header_len, payload_len)) => src.len() >= header_len + payload_len,
        None => false,
    })
}

/// Parse the length prefix.
///
/// Returns `(prefix bytes including delimiter, payload length)` once the
/// delimiter has been seen, `None` while only digits are buffered.
fn parse_header(src: &[u8], max_payload: usize) -> Result<Option<(usize, usize)>> {
    let scan = &src[..src.len().min(MAX_LENGTH_DIGITS + 1)];
    let delim = scan.iter().position(|&b| b == DELIMITER);
    let digits = &scan[..delim.unwrap_or(scan.len())];

    if digits.len() > MAX_LENGTH_DIGITS || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid_prefix(digits));
    }

    let Some(delim) = delim else {
        return Ok(None); // Need more data
    };

    if digits.is_empty() {
        return Err(invalid_prefix(digits));
    }

    let payload_len = std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse::<usize>().ok())
        .ok_or_else(|| invalid_prefix(digits))?;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    Ok(Some((delim + 1, payload_len)))
}

fn invalid_prefix(bytes: &[u8]) -> FrameError {
    FrameError::InvalidLength {
        prefix: String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
