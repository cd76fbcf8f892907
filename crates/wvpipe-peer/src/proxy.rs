//! Parent-side handle for driving a worker's view.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::{Channel, Role};
use crate::datagram::{BindCall, Command, CreateOptions, Datagram, EvalStatus, ReadyInfo};
use crate::dispatch::{self, Drained, PollConfig};
use crate::error::{DatagramError, Result};
use crate::handshake::{validate_ready, HandshakeConfig};
use crate::view::ResizeHint;

/// Longest stretch [`RemoteProxy::run_for`] dispatches before checking for
/// expired evals.
const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Why an `eval_value` produced no value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// The script threw or its promise rejected.
    #[error("script error: {0}")]
    Script(String),

    /// No result arrived within the configured eval timeout.
    #[error("no result within {0:?}")]
    TimedOut(Duration),
}

/// What an `eval_value` callback receives.
pub type EvalResult = std::result::Result<Value, EvalError>;

type BindCallback = Box<dyn FnMut(&[Value])>;
type EvalCallback = Box<dyn FnOnce(EvalResult)>;

/// Proxy tuning.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// How long an `eval_value` may stay unanswered. `None` waits forever.
    pub eval_timeout: Option<Duration>,
    pub poll: PollConfig,
    pub handshake: HandshakeConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            eval_timeout: Some(Duration::from_secs(30)),
            poll: PollConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

struct PendingEval {
    callback: EvalCallback,
    issued: Instant,
}

/// Callback tables and handshake state, kept apart from the channel so the
/// dispatch loop can borrow both at once.
struct Callbacks {
    bindings: HashMap<String, BindCallback>,
    evals: HashMap<String, PendingEval>,
    eval_timeout: Option<Duration>,
    handshake: HandshakeConfig,
    worker: Option<ReadyInfo>,
}

impl Callbacks {
    fn handle(&mut self, datagram: Datagram) -> Result<ControlFlow<()>> {
        match datagram {
            Datagram::BindCall(BindCall::Invoke { name, args }) => {
                match self.bindings.get_mut(&name) {
                    Some(callback) => {
                        debug!(%name, args = args.len(), "bound function invoked");
                        callback(&args);
                    }
                    None => warn!(%name, "bind_call for unknown binding dropped"),
                }
            }
            Datagram::BindCall(BindCall::EvalResult { result, id, value }) => {
                match self.evals.remove(&id) {
                    Some(pending) => {
                        debug!(%id, result = result.as_str(), "eval_value resolved");
                        let outcome = match result {
                            EvalStatus::Success => Ok(value),
                            EvalStatus::Error => Err(EvalError::Script(error_message(value))),
                        };
                        (pending.callback)(outcome);
                    }
                    None => debug!(%id, "result for unknown or expired eval dropped"),
                }
            }
            Datagram::Ready(info) => {
                validate_ready(&self.handshake, &info)?;
                info!(pid = info.pid, version = %info.version, "worker ready");
                self.worker = Some(info);
            }
            other => {
                return Err(DatagramError::Unexpected {
                    kind: other.kind(),
                    receiver: Role::Parent,
                }
                .into())
            }
        }
        self.expire_evals();
        Ok(ControlFlow::Continue(()))
    }

    fn expire_evals(&mut self) {
        let Some(timeout) = self.eval_timeout else {
            return;
        };
        let mut expired: Vec<(String, Instant)> = self
            .evals
            .iter()
            .filter(|(_, pending)| pending.issued.elapsed() >= timeout)
            .map(|(id, pending)| (id.clone(), pending.issued))
            .collect();
        expired.sort_by_key(|(_, issued)| *issued);

        for (id, _) in expired {
            if let Some(pending) = self.evals.remove(&id) {
                warn!(%id, ?timeout, "eval_value timed out");
                (pending.callback)(Err(EvalError::TimedOut(timeout)));
            }
        }
    }
}

fn error_message(value: Value) -> String {
    match value {
        Value::String(message) => message,
        other => other.to_string(),
    }
}

/// Sends typed commands to a worker and routes its events to callbacks.
///
/// Commands are fire-and-forget: a method returning `Ok` means the datagram
/// was written, not that the view applied it. Callbacks only run while the
/// proxy is dispatching ([`run_for`](Self::run_for),
/// [`drain_now`](Self::drain_now)).
pub struct RemoteProxy<R, W> {
    channel: Channel<R, W>,
    callbacks: Callbacks,
    poll: PollConfig,
    next_eval: u64,
}

impl<R: Read, W: Write> RemoteProxy<R, W> {
    pub fn new(channel: Channel<R, W>) -> Self {
        Self::with_config(channel, ProxyConfig::default())
    }

    pub fn with_config(channel: Channel<R, W>, config: ProxyConfig) -> Self {
        Self {
            channel,
            callbacks: Callbacks {
                bindings: HashMap::new(),
                evals: HashMap::new(),
                eval_timeout: config.eval_timeout,
                handshake: config.handshake,
                worker: None,
            },
            poll: config.poll,
            next_eval: 0,
        }
    }

    /// Send any datagram as-is.
    pub fn send(&mut self, datagram: &Datagram) -> Result<()> {
        self.channel.send(datagram)
    }

    /// Send one `call` datagram.
    pub fn call(&mut self, command: Command) -> Result<()> {
        debug!(operation = %command.operation(), "sending call");
        self.channel.send(&Datagram::Call(command))
    }

    pub fn navigate(&mut self, url: &str) -> Result<()> {
        self.call(Command::Navigate {
            url: url.to_string(),
        })
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.call(Command::SetTitle {
            title: title.to_string(),
        })
    }

    pub fn set_size(&mut self, width: u32, height: u32, hint: ResizeHint) -> Result<()> {
        self.call(Command::SetSize {
            width,
            height,
            hint,
        })
    }

    /// Ask the worker to enter the view's event loop.
    pub fn run(&mut self) -> Result<()> {
        self.call(Command::Run)
    }

    /// Register a script to run before `window.onload` of every page.
    pub fn init(&mut self, source: &str) -> Result<()> {
        self.call(Command::Init {
            source: source.to_string(),
        })
    }

    /// Evaluate a script in the current page, ignoring its result.
    pub fn eval(&mut self, source: &str) -> Result<()> {
        self.call(Command::Eval {
            source: source.to_string(),
        })
    }

    /// Make the view's event loop return without stopping the worker.
    pub fn terminate(&mut self) -> Result<()> {
        self.call(Command::Terminate)
    }

    /// Create the view with `options` and enter its event loop.
    pub fn create(&mut self, options: CreateOptions) -> Result<()> {
        self.channel.send(&Datagram::Create(options))
    }

    /// Expose `window[name]` in the page; every invocation calls `callback`
    /// with the script-side arguments.
    ///
    /// The callback is registered before the request is sent, so it is in
    /// place for the first invocation however fast the worker is.
    pub fn bind<F>(&mut self, name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&[Value]) + 'static,
    {
        if self
            .callbacks
            .bindings
            .insert(name.to_string(), Box::new(callback))
            .is_some()
        {
            debug!(%name, "replaced existing binding callback");
        }
        self.call(Command::Bind {
            name: name.to_string(),
        })
    }

    /// Evaluate `source` and deliver its value (or error) to `callback` once.
    ///
    /// Returns the request id. When the send fails the callback is dropped
    /// without being called.
    pub fn eval_value<F>(&mut self, source: &str, callback: F) -> Result<String>
    where
        F: FnOnce(EvalResult) + 'static,
    {
        self.next_eval += 1;
        let id = format!("wvpipe-eval-{}", self.next_eval);
        self.callbacks.evals.insert(
            id.clone(),
            PendingEval {
                callback: Box::new(callback),
                issued: Instant::now(),
            },
        );

        let sent = self.call(Command::EvalValue {
            source: source.to_string(),
            id: id.clone(),
        });
        if let Err(err) = sent {
            self.callbacks.evals.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Route one worker datagram to its callback.
    pub fn handle(&mut self, datagram: Datagram) -> Result<ControlFlow<()>> {
        self.callbacks.handle(datagram)
    }

    /// Resolve every eval older than the eval timeout with
    /// [`EvalError::TimedOut`].
    pub fn expire_evals(&mut self) {
        self.callbacks.expire_evals();
    }

    /// The worker's `ready` announcement, once received.
    pub fn worker_info(&self) -> Option<&ReadyInfo> {
        self.callbacks.worker.as_ref()
    }

    /// Number of `eval_value` requests still waiting for a result.
    pub fn pending_evals(&self) -> usize {
        self.callbacks.evals.len()
    }

    pub fn channel(&self) -> &Channel<R, W> {
        &self.channel
    }

    pub fn messages_sent(&self) -> u64 {
        self.channel.messages_sent()
    }

    pub fn messages_received(&self) -> u64 {
        self.channel.messages_received()
    }
}

impl<R: Read + AsFd, W: Write> RemoteProxy<R, W> {
    /// Dispatch worker datagrams for up to `duration`, or forever when `None`.
    pub fn run_for(&mut self, duration: Option<Duration>) -> Result<ControlFlow<()>> {
        let deadline = duration.map(|d| Instant::now() + d);
        loop {
            self.callbacks.expire_evals();

            let slice = match deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(EXPIRY_CHECK_INTERVAL),
                None => EXPIRY_CHECK_INTERVAL,
            };

            let Self {
                channel,
                callbacks,
                poll,
                ..
            } = &mut *self;
            if dispatch::run_for(channel, Some(slice), poll, |d| callbacks.handle(d))?.is_break()
            {
                return Ok(ControlFlow::Break(()));
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.callbacks.expire_evals();
                return Ok(ControlFlow::Continue(()));
            }
        }
    }

    /// Dispatch whatever has already arrived, without blocking.
    pub fn drain_now(&mut self) -> Result<Drained> {
        self.callbacks.expire_evals();
        let Self {
            channel, callbacks, ..
        } = &mut *self;
        dispatch::drain_now(channel, |d| callbacks.handle(d))
    }
}
