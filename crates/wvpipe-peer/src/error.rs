use crate::channel::Role;
use crate::view::ViewError;

/// Protocol-contract violations found while decoding a datagram.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DatagramError {
    /// The payload is valid JSON but not an object.
    #[error("datagram is not a JSON object")]
    NotAnObject,

    /// Neither `t` nor `type` names the datagram kind.
    #[error("datagram has no kind tag (`t` or `type`)")]
    MissingKind,

    /// The kind tag is not one this protocol defines.
    #[error("unrecognized datagram kind {0:?}")]
    UnknownKind(String),

    /// A `call` named an operation outside the fixed operation table.
    #[error("unknown call operation {0:?}")]
    UnknownOperation(String),

    /// A well-formed datagram travelled in a direction the protocol forbids.
    #[error("{kind} datagram is not accepted by the {receiver}")]
    Unexpected { kind: &'static str, receiver: Role },

    /// Required fields are missing or have the wrong shape.
    #[error("malformed {kind} datagram: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

impl DatagramError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        DatagramError::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (pipes, readiness polling, signals).
    #[error("transport error: {0}")]
    Transport(#[from] wvpipe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] wvpipe_frame::FrameError),

    /// The stream ended before a full frame arrived.
    #[error("unexpected end of stream reading datagram; did the {0} process exit?")]
    PeerClosed(Role),

    /// The peer sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(#[from] DatagramError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The native view rejected an operation.
    #[error("native view error: {0}")]
    View(#[from] ViewError),

    /// The worker announced an incompatible protocol.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The worker process could not be spawned.
    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Waiting on or reaping the worker failed.
    #[error("worker process error: {0}")]
    Process(std::io::Error),
}

impl PeerError {
    /// Whether this error means the other process has gone away.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, PeerError::PeerClosed(_))
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
