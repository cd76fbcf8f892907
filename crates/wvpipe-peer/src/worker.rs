//! Worker-side dispatcher: applies parent datagrams to a native view.
//!
//! The view's event loop blocks, so while it runs the channel is serviced
//! from a heartbeat binding that performs one non-blocking drain per tick.
//! Channel state is shared between the top-level loop and that binding
//! through `Rc<RefCell<_>>`; no borrow of it is held across a view call,
//! because view calls may synchronously fire bindings that send.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::os::fd::AsFd;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::channel::{Channel, Role};
use crate::datagram::{BindCall, Command, CreateOptions, Datagram, EvalStatus};
use crate::dispatch::{self, DatagramSource, PollConfig};
use crate::error::{DatagramError, PeerError, Result};
use crate::handshake::{ready_datagram, HandshakeConfig};
use crate::script::{self, EVAL_RESULT_BINDING};
use crate::view::{NativeView, ResizeHint, ViewError, ViewFactory};

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Period of the heartbeat that drains the channel inside the event loop.
    pub heartbeat_interval: Duration,
    /// Polling used while the event loop is not running.
    pub poll: PollConfig,
    pub handshake: HandshakeConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(100),
            poll: PollConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

/// Lifecycle of the worker's native view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Uncreated,
    Live,
    Destroyed,
}

enum ViewSlot<V> {
    Uncreated,
    Live(V),
    Destroyed,
}

struct Core<R, W> {
    channel: Channel<R, W>,
    init_scripts: Vec<String>,
    running: bool,
    exit_requested: bool,
    fault: Option<PeerError>,
}

type Shared<R, W> = Rc<RefCell<Core<R, W>>>;

struct SharedSource<R, W>(Shared<R, W>);

impl<R: Read + AsFd, W: Write> DatagramSource for SharedSource<R, W> {
    fn next_ready(&mut self, timeout: Duration) -> Result<Option<Datagram>> {
        self.0.borrow_mut().channel.next_ready(timeout)
    }
}

/// Serves one parent over a channel, owning the native view it drives.
pub struct WorkerDispatcher<F: ViewFactory, R, W> {
    core: Shared<R, W>,
    factory: F,
    slot: ViewSlot<F::View>,
    config: WorkerConfig,
}

impl<F, R, W> WorkerDispatcher<F, R, W>
where
    F: ViewFactory,
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    pub fn new(channel: Channel<R, W>, factory: F, config: WorkerConfig) -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                channel,
                init_scripts: Vec::new(),
                running: false,
                exit_requested: false,
                fault: None,
            })),
            factory,
            slot: ViewSlot::Uncreated,
            config,
        }
    }

    /// Send the `ready` datagram.
    pub fn announce(&mut self) -> Result<()> {
        let ready = ready_datagram(&self.config.handshake, std::process::id());
        self.core.borrow_mut().channel.send(&ready)
    }

    /// Announce, then apply datagrams until `kill`.
    ///
    /// Returns `Ok` after a graceful `kill`; the view has been terminated and
    /// destroyed by then. A closed or faulty channel ends serving with an error.
    pub fn serve(&mut self) -> Result<()> {
        self.announce()?;
        info!("worker serving");

        let mut source = SharedSource(Rc::clone(&self.core));
        let poll = self.config.poll;
        let flow = dispatch::run_for(&mut source, None, &poll, |datagram| self.dispatch(datagram))?;
        debug_assert!(flow.is_break());
        info!("worker finished");
        Ok(())
    }

    /// Apply one datagram received outside the view's event loop.
    ///
    /// Returns `Break` once the worker should exit.
    pub fn dispatch(&mut self, datagram: Datagram) -> Result<ControlFlow<()>> {
        let core = Rc::clone(&self.core);
        let flow = match datagram {
            Datagram::Call(command) => {
                let view = self.ensure_view()?;
                apply_command(&core, view, command)?
            }
            Datagram::Create(options) => {
                let view = self.ensure_view()?;
                apply_create_options(&core, &mut *view, &options);
                run_view(&core, view)?
            }
            Datagram::Kill => {
                info!("kill received");
                core.borrow_mut().exit_requested = true;
                ControlFlow::Break(())
            }
            other => return Err(unexpected(&other)),
        };

        if let Some(fault) = core.borrow_mut().fault.take() {
            return Err(fault);
        }
        if flow.is_break() {
            self.shutdown_view();
        }
        Ok(flow)
    }

    /// Scripts registered with `init`, retained for the worker's lifetime.
    pub fn init_scripts(&self) -> Vec<String> {
        self.core.borrow().init_scripts.clone()
    }

    pub fn view_state(&self) -> ViewState {
        match self.slot {
            ViewSlot::Uncreated => ViewState::Uncreated,
            ViewSlot::Live(_) => ViewState::Live,
            ViewSlot::Destroyed => ViewState::Destroyed,
        }
    }

    /// The live view, if any.
    pub fn view(&self) -> Option<&F::View> {
        match &self.slot {
            ViewSlot::Live(view) => Some(view),
            _ => None,
        }
    }

    pub fn view_mut(&mut self) -> Option<&mut F::View> {
        match &mut self.slot {
            ViewSlot::Live(view) => Some(view),
            _ => None,
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.core.borrow().exit_requested
    }

    fn ensure_view(&mut self) -> Result<&mut F::View> {
        if matches!(self.slot, ViewSlot::Uncreated) {
            let mut view = self.factory.create()?;
            install_worker_bindings(&self.core, &mut view, self.config.heartbeat_interval)?;
            info!("native view created");
            self.slot = ViewSlot::Live(view);
        }
        match &mut self.slot {
            ViewSlot::Live(view) => Ok(view),
            ViewSlot::Destroyed => Err(ViewError::Destroyed.into()),
            ViewSlot::Uncreated => Err(PeerError::InvalidState("native view missing".into())),
        }
    }

    fn shutdown_view(&mut self) {
        let ViewSlot::Live(mut view) = std::mem::replace(&mut self.slot, ViewSlot::Destroyed) else {
            return;
        };
        if let Err(err) = view.terminate() {
            warn!(error = %err, "terminate failed during shutdown");
        }
        if let Err(err) = view.destroy() {
            warn!(error = %err, "destroy failed during shutdown");
        }
        info!("native view destroyed");
    }
}

fn unexpected(datagram: &Datagram) -> PeerError {
    DatagramError::Unexpected {
        kind: datagram.kind(),
        receiver: Role::Worker,
    }
    .into()
}

fn install_worker_bindings<R, W>(
    core: &Shared<R, W>,
    view: &mut dyn NativeView,
    heartbeat_interval: Duration,
) -> Result<()>
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    let results = Rc::clone(core);
    view.bind(
        EVAL_RESULT_BINDING,
        Box::new(move |view: &mut dyn NativeView, args: Vec<Value>| {
            relay_eval_result(&results, view, args)
        }),
    )?;

    let beat = Rc::clone(core);
    view.install_heartbeat(
        heartbeat_interval,
        Box::new(move |view: &mut dyn NativeView, _args: Vec<Value>| {
            heartbeat(&beat, view)
        }),
    )?;
    Ok(())
}

/// One non-blocking drain pass, run from inside the event loop.
fn heartbeat<R, W>(core: &Shared<R, W>, view: &mut dyn NativeView)
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    {
        let state = core.borrow();
        if state.exit_requested || state.fault.is_some() {
            return;
        }
    }

    let mut source = SharedSource(Rc::clone(core));
    let drained = dispatch::drain_now(&mut source, |datagram| {
        handle_live(core, &mut *view, datagram)
    });
    match drained {
        Ok(drained) if drained.dispatched > 0 => {
            trace!(
                dispatched = drained.dispatched,
                stopped = drained.stopped,
                "heartbeat drained"
            );
        }
        Ok(_) => {}
        Err(err) => record_fault(core, view, err),
    }
}

/// Apply one datagram while the event loop is running.
fn handle_live<R, W>(
    core: &Shared<R, W>,
    view: &mut dyn NativeView,
    datagram: Datagram,
) -> Result<ControlFlow<()>>
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    match datagram {
        Datagram::Call(command) => apply_command(core, view, command),
        Datagram::Create(options) => {
            debug!("create received while running; applying options to the live view");
            apply_create_options(core, view, &options);
            Ok(ControlFlow::Continue(()))
        }
        Datagram::Kill => {
            info!("kill received inside event loop");
            core.borrow_mut().exit_requested = true;
            if let Err(err) = view.terminate() {
                warn!(error = %err, "terminate failed");
            }
            Ok(ControlFlow::Break(()))
        }
        other => Err(unexpected(&other)),
    }
}

fn apply_command<R, W>(
    core: &Shared<R, W>,
    view: &mut dyn NativeView,
    command: Command,
) -> Result<ControlFlow<()>>
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    let operation = command.operation();
    debug!(%operation, "applying call");

    let outcome = match command {
        Command::Navigate { url } => view.navigate(&url),
        Command::SetTitle { title } => view.set_title(&title),
        Command::SetSize {
            width,
            height,
            hint,
        } => view.set_size(width, height, hint),
        Command::Init { source } => {
            core.borrow_mut().init_scripts.push(source.clone());
            view.init(&source)
        }
        Command::Eval { source } => view.eval(&source),
        Command::Bind { name } => {
            let sender = Rc::clone(core);
            let bound = name.clone();
            view.bind(
                &name,
                Box::new(move |view: &mut dyn NativeView, args: Vec<Value>| {
                    let datagram = Datagram::BindCall(BindCall::Invoke {
                        name: bound.clone(),
                        args,
                    });
                    send_from_binding(&sender, view, &datagram);
                }),
            )
        }
        Command::EvalValue { source, id } => {
            if let Err(err) = view.eval(&script::eval_value_script(&source, &id)) {
                warn!(%id, error = %err, "eval_value could not be started");
                let failed = Datagram::BindCall(BindCall::EvalResult {
                    result: EvalStatus::Error,
                    id,
                    value: Value::String(err.to_string()),
                });
                core.borrow_mut().channel.send(&failed)?;
            }
            Ok(())
        }
        Command::Terminate => view.terminate(),
        Command::Run => return run_view(core, view),
    };

    if let Err(err) = outcome {
        warn!(%operation, error = %err, "native operation failed");
    }
    Ok(ControlFlow::Continue(()))
}

/// Apply `create` options to a live view. A failing option is logged and the
/// rest are still applied, as for a failing `call`.
fn apply_create_options<R, W>(
    core: &Shared<R, W>,
    view: &mut dyn NativeView,
    options: &CreateOptions,
) where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    if let Some(source) = &options.init_code {
        core.borrow_mut().init_scripts.push(source.clone());
        warn_on_failure("init", view.init(source));
    }
    if let Some(title) = &options.title {
        warn_on_failure("set_title", view.set_title(title));
    }
    if let Some((width, height)) = options.size {
        let hint = ResizeHint::from_resizable(options.resizeable);
        warn_on_failure("set_size", view.set_size(width, height, hint));
    }
    if let Some(html) = &options.navigate_dom {
        let url = format!("data:text/html,{}", urlencoding::encode(html));
        warn_on_failure("navigate", view.navigate(&url));
    }
}

fn warn_on_failure(option: &'static str, outcome: std::result::Result<(), ViewError>) {
    if let Err(err) = outcome {
        warn!(option, error = %err, "create option failed");
    }
}

/// Enter the event loop unless it is already running.
///
/// Returns `Break` when a `kill` arrived while it ran.
fn run_view<R, W>(core: &Shared<R, W>, view: &mut dyn NativeView) -> Result<ControlFlow<()>>
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    if core.borrow().running {
        debug!("event loop already running");
        return Ok(ControlFlow::Continue(()));
    }

    core.borrow_mut().running = true;
    info!("entering view event loop");
    let ran = view.run();
    core.borrow_mut().running = false;

    if let Some(fault) = core.borrow_mut().fault.take() {
        return Err(fault);
    }
    if let Err(err) = ran {
        warn!(error = %err, "view event loop failed");
    }

    let exit = core.borrow().exit_requested;
    info!(exit, "view event loop returned");
    Ok(if exit {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    })
}

fn relay_eval_result<R, W>(core: &Shared<R, W>, view: &mut dyn NativeView, args: Vec<Value>)
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    let mut args = args.into_iter();
    let (Some(Value::String(status)), Some(Value::String(id))) = (args.next(), args.next()) else {
        warn!("eval result binding called without status and id");
        return;
    };
    let result = match status.as_str() {
        "success" => EvalStatus::Success,
        "error" => EvalStatus::Error,
        other => {
            warn!(%id, status = other, "eval result with unknown status dropped");
            return;
        }
    };
    let value = args.next().unwrap_or(Value::Null);
    let datagram = Datagram::BindCall(BindCall::EvalResult { result, id, value });
    send_from_binding(core, view, &datagram);
}

fn send_from_binding<R, W>(core: &Shared<R, W>, view: &mut dyn NativeView, datagram: &Datagram)
where
    R: Read + AsFd + 'static,
    W: Write + 'static,
{
    let sent = core.borrow_mut().channel.send(datagram);
    if let Err(err) = sent {
        record_fault(core, view, err);
    }
}

/// Remember the first transport fault and unwind the event loop so the
/// top-level loop can report it.
fn record_fault<R, W>(core: &Shared<R, W>, view: &mut dyn NativeView, err: PeerError) {
    warn!(error = %err, "channel fault inside view callback");
    {
        let mut state = core.borrow_mut();
        if state.fault.is_none() {
            state.fault = Some(err);
        }
    }
    if let Err(err) = view.terminate() {
        debug!(error = %err, "terminate after fault failed");
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::headless::HeadlessView;
    use crate::proxy::{EvalResult, RemoteProxy};
    use crate::view::{Binding, ViewError};

    type Sock = UnixStream;

    fn headless() -> std::result::Result<HeadlessView, ViewError> {
        Ok(HeadlessView::new())
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            heartbeat_interval: Duration::from_millis(5),
            poll: PollConfig {
                ready_timeout: Duration::from_millis(5),
                poll_interval: Duration::from_millis(5),
            },
            ..WorkerConfig::default()
        }
    }

    #[allow(clippy::type_complexity)]
    fn setup() -> (
        WorkerDispatcher<fn() -> std::result::Result<HeadlessView, ViewError>, Sock, Sock>,
        Channel<Sock, Sock>,
    ) {
        let (a, b) = UnixStream::pair().unwrap();
        let parent = Channel::from_socket(Role::Parent, a).unwrap();
        let worker = WorkerDispatcher::new(
            Channel::from_socket(Role::Worker, b).unwrap(),
            headless as fn() -> _,
            fast_config(),
        );
        (worker, parent)
    }

    #[test]
    fn navigate_reaches_view_verbatim_and_creates_lazily() {
        let (mut worker, _parent) = setup();
        assert_eq!(worker.view_state(), ViewState::Uncreated);

        let flow = worker
            .dispatch(Datagram::call(Command::Navigate {
                url: "about:blank".into(),
            }))
            .unwrap();

        assert!(flow.is_continue());
        assert_eq!(worker.view_state(), ViewState::Live);
        assert_eq!(worker.view().and_then(HeadlessView::url), Some("about:blank"));
    }

    #[test]
    fn init_scripts_are_retained() {
        let (mut worker, _parent) = setup();
        worker
            .dispatch(Datagram::call(Command::Init {
                source: "window.a = 1".into(),
            }))
            .unwrap();
        assert_eq!(worker.init_scripts(), vec!["window.a = 1".to_string()]);
        assert!(worker
            .view()
            .unwrap()
            .init_scripts()
            .contains(&"window.a = 1".to_string()));
    }

    #[test]
    fn bound_function_relays_each_invocation_in_order() {
        let (mut worker, mut parent) = setup();
        worker
            .dispatch(Datagram::call(Command::Bind { name: "foo".into() }))
            .unwrap();

        let view = worker.view_mut().unwrap();
        assert!(view.invoke("foo", vec![json!(1)]).unwrap());
        assert!(view.invoke("foo", vec![json!(2)]).unwrap());

        for n in [1, 2] {
            assert_eq!(
                parent.receive().unwrap(),
                Datagram::BindCall(BindCall::Invoke {
                    name: "foo".into(),
                    args: vec![json!(n)],
                })
            );
        }
    }

    #[test]
    fn eval_value_result_relayed() {
        let (mut worker, mut parent) = setup();
        worker
            .dispatch(Datagram::call(Command::EvalValue {
                source: "1+1".into(),
                id: "wvpipe-eval-1".into(),
            }))
            .unwrap();
        assert_eq!(
            parent.receive().unwrap(),
            Datagram::BindCall(BindCall::EvalResult {
                result: EvalStatus::Success,
                id: "wvpipe-eval-1".into(),
                value: json!(2),
            })
        );
    }

    #[test]
    fn eval_value_error_relayed_as_message() {
        let (mut worker, mut parent) = setup();
        worker
            .dispatch(Datagram::call(Command::EvalValue {
                source: "nope()".into(),
                id: "e".into(),
            }))
            .unwrap();
        let Datagram::BindCall(BindCall::EvalResult { result, id, value }) =
            parent.receive().unwrap()
        else {
            panic!("expected an eval result");
        };
        assert_eq!(result, EvalStatus::Error);
        assert_eq!(id, "e");
        assert!(value.is_string());
    }

    #[test]
    fn create_applies_options_and_runs_until_terminate() {
        let (mut worker, mut parent) = setup();
        // Queued before create, so the first heartbeat ends the event loop.
        parent.send(&Datagram::call(Command::Terminate)).unwrap();

        let flow = worker
            .dispatch(Datagram::Create(CreateOptions {
                init_code: Some("window.ready = true".into()),
                navigate_dom: Some("<div>hi</div>".into()),
                title: Some("Hello!".into()),
                size: Some((200, 100)),
                resizeable: false,
            }))
            .unwrap();

        assert!(flow.is_continue());
        let view = worker.view().unwrap();
        assert_eq!(view.title(), Some("Hello!"));
        assert_eq!(view.size(), Some((200, 100, ResizeHint::Fixed)));
        assert_eq!(view.url(), Some("data:text/html,%3Cdiv%3Ehi%3C%2Fdiv%3E"));
        assert_eq!(worker.init_scripts(), vec!["window.ready = true".to_string()]);
        assert!(!worker.exit_requested());
    }

    /// A headless view whose window refuses titles.
    struct Untitled(HeadlessView);

    impl NativeView for Untitled {
        fn navigate(&mut self, url: &str) -> std::result::Result<(), ViewError> {
            self.0.navigate(url)
        }

        fn set_title(&mut self, _title: &str) -> std::result::Result<(), ViewError> {
            Err(ViewError::Backend {
                operation: "set_title",
                message: "no window".into(),
            })
        }

        fn set_size(
            &mut self,
            width: u32,
            height: u32,
            hint: ResizeHint,
        ) -> std::result::Result<(), ViewError> {
            self.0.set_size(width, height, hint)
        }

        fn init(&mut self, source: &str) -> std::result::Result<(), ViewError> {
            self.0.init(source)
        }

        fn eval(&mut self, source: &str) -> std::result::Result<(), ViewError> {
            self.0.eval(source)
        }

        fn bind(&mut self, name: &str, binding: Binding) -> std::result::Result<(), ViewError> {
            self.0.bind(name, binding)
        }

        fn run(&mut self) -> std::result::Result<(), ViewError> {
            self.0.run()
        }

        fn terminate(&mut self) -> std::result::Result<(), ViewError> {
            self.0.terminate()
        }

        fn destroy(&mut self) -> std::result::Result<(), ViewError> {
            self.0.destroy()
        }

        fn install_heartbeat(
            &mut self,
            interval: Duration,
            binding: Binding,
        ) -> std::result::Result<(), ViewError> {
            self.0.install_heartbeat(interval, binding)
        }
    }

    #[test]
    fn failing_create_option_keeps_worker_serving() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut parent = Channel::from_socket(Role::Parent, a).unwrap();
        let mut worker = WorkerDispatcher::new(
            Channel::from_socket(Role::Worker, b).unwrap(),
            || Ok::<_, ViewError>(Untitled(HeadlessView::new())),
            fast_config(),
        );
        parent.send(&Datagram::call(Command::Terminate)).unwrap();

        let flow = worker
            .dispatch(Datagram::Create(CreateOptions {
                title: Some("Hello!".into()),
                size: Some((200, 100)),
                navigate_dom: Some("<p>x</p>".into()),
                ..CreateOptions::default()
            }))
            .unwrap();
        assert!(flow.is_continue());

        let view = &worker.view().unwrap().0;
        assert_eq!(view.title(), None);
        assert_eq!(view.size(), Some((200, 100, ResizeHint::None)));
        assert_eq!(view.url(), Some("data:text/html,%3Cp%3Ex%3C%2Fp%3E"));

        let flow = worker
            .dispatch(Datagram::call(Command::SetTitle { title: "again".into() }))
            .unwrap();
        assert!(flow.is_continue());
        let flow = worker
            .dispatch(Datagram::call(Command::Navigate {
                url: "about:blank".into(),
            }))
            .unwrap();
        assert!(flow.is_continue());
        assert_eq!(worker.view().unwrap().0.url(), Some("about:blank"));
    }

    #[test]
    fn kill_inside_event_loop_destroys_view() {
        let (mut worker, mut parent) = setup();
        parent
            .send(&Datagram::call(Command::Navigate { url: "about:blank".into() }))
            .unwrap();
        parent.send(&Datagram::Kill).unwrap();
        parent
            .send(&Datagram::call(Command::SetTitle { title: "late".into() }))
            .unwrap();

        let flow = worker.dispatch(Datagram::call(Command::Run)).unwrap();
        assert!(flow.is_break());
        assert!(worker.exit_requested());
        assert_eq!(worker.view_state(), ViewState::Destroyed);
    }

    #[test]
    fn call_after_destroy_is_rejected() {
        let (mut worker, _parent) = setup();
        assert!(worker.dispatch(Datagram::Kill).unwrap().is_break());
        let err = worker
            .dispatch(Datagram::call(Command::SetTitle { title: "x".into() }))
            .unwrap_err();
        assert!(matches!(err, PeerError::View(ViewError::Destroyed)));
    }

    #[test]
    fn events_from_parent_are_protocol_violations() {
        let (mut worker, _parent) = setup();
        let err = worker
            .dispatch(Datagram::BindCall(BindCall::Invoke {
                name: "foo".into(),
                args: vec![],
            }))
            .unwrap_err();
        assert!(matches!(
            err,
            PeerError::Protocol(DatagramError::Unexpected {
                receiver: Role::Worker,
                ..
            })
        ));
    }

    #[test]
    fn send_fault_in_binding_surfaces_from_dispatch() {
        let (mut worker, parent) = setup();
        drop(parent);
        let err = worker
            .dispatch(Datagram::call(Command::EvalValue {
                source: "1".into(),
                id: "x".into(),
            }))
            .unwrap_err();
        assert!(matches!(err, PeerError::Frame(_)), "{err}");
    }

    #[test]
    fn serve_end_to_end_with_proxy() {
        let (a, b) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let channel = Channel::from_socket(Role::Worker, b).unwrap();
            let mut worker = WorkerDispatcher::new(channel, headless, fast_config());
            worker.serve()
        });

        let mut proxy = RemoteProxy::new(Channel::from_socket(Role::Parent, a).unwrap());
        let flow = proxy.run_for(Some(Duration::from_millis(200))).unwrap();
        assert!(flow.is_continue());
        assert!(proxy.worker_info().is_some());

        let results: Rc<RefCell<Vec<EvalResult>>> = Rc::default();
        let sink = Rc::clone(&results);
        let calls: Rc<RefCell<Vec<Vec<Value>>>> = Rc::default();
        let seen = Rc::clone(&calls);

        proxy.navigate("about:blank").unwrap();
        proxy.run().unwrap();
        proxy
            .bind("foo", move |args| seen.borrow_mut().push(args.to_vec()))
            .unwrap();
        proxy
            .eval_value("1+1", move |result| sink.borrow_mut().push(result))
            .unwrap();
        let flow = proxy.run_for(Some(Duration::from_millis(300))).unwrap();
        assert!(flow.is_continue());

        assert_eq!(*results.borrow(), vec![Ok(json!(2))]);
        assert!(calls.borrow().is_empty());

        proxy.send(&Datagram::Kill).unwrap();
        handle.join().unwrap().unwrap();
    }
}
