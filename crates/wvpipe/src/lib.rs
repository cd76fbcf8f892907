//! Drive a webview that lives in a separate worker process.
//!
//! The parent and the worker exchange JSON datagrams over two anonymous
//! pipes, each datagram framed as `<decimal length>a<payload>`.
//!
//! # Crate Structure
//!
//! - [`transport`]: pipes, descriptor inheritance, readiness polling
//! - [`frame`]: length-prefixed framing
//! - [`peer`]: datagrams, worker lifecycle, remote proxy, worker dispatcher
//!   (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use wvpipe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wvpipe_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use wvpipe_peer::*;
}

/// Exit codes shared by the bundled binaries (requires `cli` feature).
#[cfg(feature = "cli")]
pub mod exit;

/// Log setup shared by the bundled binaries (requires `cli` feature).
#[cfg(feature = "cli")]
pub mod logging;
