//! Parent/worker protocol for driving a webview from another process.
//!
//! The parent spawns a worker with [`WorkerProcess`], talks to it through a
//! [`RemoteProxy`], and receives bound-function calls and `eval_value`
//! results as callbacks. The worker runs a [`WorkerDispatcher`] that applies
//! each command to a [`NativeView`] and keeps the channel serviced from a
//! heartbeat while the view's event loop blocks.

pub mod channel;
pub mod datagram;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod headless;
pub mod lifecycle;
pub mod proxy;
pub mod script;
pub mod view;
pub mod worker;

pub use channel::{Channel, Role};
pub use datagram::{
    BindCall, Command, CreateOptions, Datagram, EvalStatus, Operation, ReadyInfo,
};
pub use dispatch::{drain_now, run_for, DatagramSource, Drained, PollConfig};
pub use error::{DatagramError, PeerError, Result};
pub use handshake::{ready_datagram, validate_ready, HandshakeConfig};
pub use headless::HeadlessView;
pub use lifecycle::{LifecycleConfig, LifecycleState, WorkerProcess, WorkerProxy};
pub use proxy::{EvalError, EvalResult, ProxyConfig, RemoteProxy};
pub use view::{Binding, NativeView, ResizeHint, ViewError, ViewFactory};
pub use worker::{ViewState, WorkerConfig, WorkerDispatcher};
