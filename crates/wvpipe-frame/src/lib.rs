//! Length-prefixed message framing for the wvpipe channel.
//!
//! Every message travels as:
//! - the payload length as ASCII decimal digits
//! - a single `a` delimiter byte
//! - exactly that many payload bytes
//!
//! The length is always parsed before any payload byte is consumed, so payload
//! content (including `a` bytes and multi-byte text) never affects frame
//! boundaries. Readers buffer partial frames across reads; writers retry
//! short writes until the whole frame is out.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, DELIMITER,
    MAX_LENGTH_DIGITS,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
