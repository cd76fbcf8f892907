//! Byte-stream transport for the wvpipe parent/worker channel.
//!
//! Provides the OS plumbing everything else builds on:
//! - anonymous unidirectional pipes whose ends can be handed to a child
//!   process by descriptor number
//! - readiness polling over pipe descriptors
//! - signalling and descriptor-inheritance helpers used around `spawn`
//!
//! This is the lowest layer of wvpipe. Only Unix targets are supported.

pub mod error;
#[cfg(unix)]
pub mod pipe;
#[cfg(unix)]
pub mod poll;
#[cfg(unix)]
pub mod process;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use pipe::{pipe, set_inheritable, PipeReader, PipeWriter};
#[cfg(unix)]
pub use poll::{poll_readable, poll_writable, Readiness};
#[cfg(unix)]
pub use process::{clear_cloexec_raw, force_kill};
