//! Spawning, supervising and killing a worker process.

use std::ffi::OsString;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wvpipe_transport::{
    clear_cloexec_raw, force_kill, pipe, poll_writable, PipeReader, PipeWriter,
};

use crate::channel::{Channel, Role};
use crate::datagram::{Datagram, ReadyInfo};
use crate::dispatch::PollConfig;
use crate::error::{PeerError, Result};
use crate::handshake::HandshakeConfig;
use crate::proxy::{ProxyConfig, RemoteProxy};

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Proxy type a started [`WorkerProcess`] hands out.
pub type WorkerProxy = RemoteProxy<PipeReader, PipeWriter>;

/// Where a [`WorkerProcess`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Spawning,
    Running,
    Terminating,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Spawning => "spawning",
            LifecycleState::Running => "running",
            LifecycleState::Terminating => "terminating",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How to launch and supervise a worker.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Worker executable.
    pub program: PathBuf,
    /// Arguments placed before the two descriptor numbers.
    pub leading_args: Vec<OsString>,
    /// Dispatch slice used while waiting for startup.
    pub startup_increment: Duration,
    /// How long `kill` waits for a graceful exit before `SIGKILL`.
    pub kill_grace: Duration,
    /// See [`ProxyConfig::eval_timeout`].
    pub eval_timeout: Option<Duration>,
    pub poll: PollConfig,
    pub handshake: HandshakeConfig,
}

impl LifecycleConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("wvpipe-worker"),
            leading_args: Vec::new(),
            startup_increment: Duration::from_millis(100),
            kill_grace: Duration::from_millis(500),
            eval_timeout: ProxyConfig::default().eval_timeout,
            poll: PollConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

/// A worker child process and the parent end of its channel.
///
/// Dropping a running `WorkerProcess` kills the worker.
pub struct WorkerProcess {
    config: LifecycleConfig,
    state: LifecycleState,
    child: Option<Child>,
    proxy: Option<WorkerProxy>,
    exit_status: Option<ExitStatus>,
}

impl WorkerProcess {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            state: LifecycleState::Unstarted,
            child: None,
            proxy: None,
            exit_status: None,
        }
    }

    /// Spawn the worker with a fresh pipe pair.
    ///
    /// The worker receives the descriptor numbers of its read end and write
    /// end, in that order, as its final two arguments. Only those two
    /// descriptors survive `exec`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Unstarted {
            return Err(PeerError::InvalidState(format!(
                "cannot start worker in state {}",
                self.state
            )));
        }
        self.state = LifecycleState::Spawning;

        let spawned = self.spawn();
        let (child, proxy) = match spawned {
            Ok(parts) => parts,
            Err(err) => {
                self.state = LifecycleState::Unstarted;
                return Err(err);
            }
        };

        info!(pid = child.id(), program = %self.config.program.display(), "worker started");
        self.child = Some(child);
        self.proxy = Some(proxy);
        self.state = LifecycleState::Running;
        Ok(())
    }

    fn spawn(&self) -> Result<(Child, WorkerProxy)> {
        let (parent_read, child_write) = pipe()?;
        let (child_read, parent_write) = pipe()?;
        let child_read_fd = child_read.as_raw_fd();
        let child_write_fd = child_write.as_raw_fd();

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.leading_args)
            .arg(child_read_fd.to_string())
            .arg(child_write_fd.to_string())
            .stdin(Stdio::null());

        // SAFETY: the hook only calls fcntl, which is async-signal-safe.
        unsafe {
            command.pre_exec(move || {
                clear_cloexec_raw(child_read_fd)?;
                clear_cloexec_raw(child_write_fd)
            });
        }

        let child = command.spawn().map_err(|source| PeerError::Spawn {
            program: self.config.program.display().to_string(),
            source,
        })?;

        // The child holds its own copies now.
        drop(child_read);
        drop(child_write);

        let channel = Channel::new(Role::Parent, parent_read, parent_write);
        let proxy = RemoteProxy::with_config(
            channel,
            ProxyConfig {
                eval_timeout: self.config.eval_timeout,
                poll: self.config.poll,
                handshake: self.config.handshake.clone(),
            },
        );
        Ok((child, proxy))
    }

    /// Dispatch worker datagrams until the first one arrives or `timeout`
    /// elapses.
    ///
    /// Returns whether anything arrived. Running out of time is not an error.
    pub fn wait_for_startup(&mut self, timeout: Duration) -> Result<bool> {
        let increment = self.config.startup_increment;
        let proxy = self.proxy()?;
        let deadline = Instant::now() + timeout;

        loop {
            if proxy.messages_received() > 0 {
                debug!(received = proxy.messages_received(), "worker started up");
                return Ok(true);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                debug!(?timeout, "no datagram from worker before startup timeout");
                return Ok(false);
            }
            if proxy.run_for(Some(increment.min(left)))?.is_break() {
                return Ok(proxy.messages_received() > 0);
            }
        }
    }

    /// Stop the worker and reap it.
    ///
    /// Sends a `kill` datagram, gives the worker [`LifecycleConfig::kill_grace`]
    /// to exit on its own, then sends `SIGKILL` and waits. The datagram is
    /// written without blocking: when the pipe stays full for the whole grace
    /// period, or the worker already exited, it is skipped. Calling this
    /// without a live child does nothing.
    pub fn kill(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            debug!(state = %self.state, "kill: no worker to stop");
            return Ok(());
        };
        let pid = child.id();
        self.state = LifecycleState::Terminating;
        info!(pid, "stopping worker");

        let deadline = Instant::now() + self.config.kill_grace;
        if let Some(proxy) = self.proxy.as_mut() {
            match send_kill(proxy, self.config.kill_grace) {
                Ok(true) => debug!(pid, "kill datagram sent"),
                Ok(false) => debug!(pid, "worker pipe full, kill datagram skipped"),
                Err(err) => debug!(pid, error = %err, "kill datagram not delivered"),
            }
        }

        let result = self.reap(&mut child, deadline);
        self.proxy = None;
        self.state = LifecycleState::Terminated;

        let status = result?;
        info!(pid, %status, "worker stopped");
        self.exit_status = Some(status);
        Ok(())
    }

    fn reap(&self, child: &mut Child, grace_deadline: Instant) -> Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait().map_err(PeerError::Process)? {
                return Ok(status);
            }
            if Instant::now() >= grace_deadline {
                break;
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }

        warn!(pid = child.id(), grace = ?self.config.kill_grace, "worker ignored kill, sending SIGKILL");
        force_kill(child.id())?;
        child.wait().map_err(PeerError::Process)
    }

    /// The parent proxy of a running worker.
    pub fn proxy(&mut self) -> Result<&mut WorkerProxy> {
        let state = self.state;
        self.proxy
            .as_mut()
            .ok_or_else(|| PeerError::InvalidState(format!("no worker channel in state {state}")))
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Child pid while the worker is tracked.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// The worker's `ready` announcement, once received.
    pub fn worker_info(&self) -> Option<&ReadyInfo> {
        self.proxy.as_ref().and_then(RemoteProxy::worker_info)
    }

    pub fn messages_received(&self) -> u64 {
        self.proxy.as_ref().map_or(0, RemoteProxy::messages_received)
    }

    /// Exit status recorded by [`kill`](Self::kill).
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }
}

/// Write the `kill` datagram unless the pipe stays full for `wait`.
///
/// The frame is far below `PIPE_BUF`, so once the pipe reports room the
/// non-blocking write lands whole or not at all.
fn send_kill(proxy: &mut WorkerProxy, wait: Duration) -> Result<bool> {
    let writer = proxy.channel().writer_ref();
    if !poll_writable(writer.as_fd(), wait)? {
        return Ok(false);
    }
    writer.set_nonblocking(true)?;
    proxy.send(&Datagram::Kill)?;
    Ok(true)
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(err) = self.kill() {
                warn!(error = %err, "failed to stop worker on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    fn shell(script: &str) -> LifecycleConfig {
        LifecycleConfig {
            leading_args: vec!["-c".into(), script.into(), "sh".into()],
            kill_grace: Duration::from_millis(100),
            ..LifecycleConfig::new("/bin/sh")
        }
    }

    #[test]
    fn silent_worker_times_out_without_error() {
        let mut worker = WorkerProcess::new(shell("sleep 5"));
        worker.start().unwrap();
        assert_eq!(worker.state(), LifecycleState::Running);

        let started = worker.wait_for_startup(Duration::from_millis(300)).unwrap();
        assert!(!started);
        assert_eq!(worker.messages_received(), 0);

        worker.kill().unwrap();
        assert_eq!(worker.state(), LifecycleState::Terminated);
        // SIGKILL
        assert_eq!(worker.exit_status().and_then(|s| s.signal()), Some(9));
    }

    #[test]
    fn kill_twice_is_noop() {
        let mut worker = WorkerProcess::new(shell("sleep 5"));
        worker.start().unwrap();
        worker.kill().unwrap();
        worker.kill().unwrap();
        assert_eq!(worker.state(), LifecycleState::Terminated);
        assert!(worker.pid().is_none());
    }

    #[test]
    fn kill_before_start_is_noop() {
        let mut worker = WorkerProcess::new(LifecycleConfig::default());
        worker.kill().unwrap();
        assert_eq!(worker.state(), LifecycleState::Unstarted);
    }

    #[test]
    fn exited_worker_is_reaped_without_signal() {
        let mut worker = WorkerProcess::new(shell("exit 3"));
        worker.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        worker.kill().unwrap();
        assert_eq!(worker.exit_status().and_then(|s| s.code()), Some(3));
    }

    #[test]
    fn descriptors_passed_as_trailing_arguments() {
        // Echo a ready datagram on the inherited write descriptor.
        let ready = r#"{"t":"ready","protocol":"wvpipe","version":"1.0","pid":7}"#;
        let script = format!(
            "printf '%s' '{}a{ready}' >&\"$2\"; sleep 5",
            ready.len()
        );
        let mut worker = WorkerProcess::new(shell(&script));
        worker.start().unwrap();

        assert!(worker.wait_for_startup(Duration::from_secs(5)).unwrap());
        assert_eq!(worker.messages_received(), 1);
        assert_eq!(worker.worker_info().map(|info| info.pid), Some(7));
        worker.kill().unwrap();
    }

    #[test]
    fn startup_waits_for_a_late_first_datagram() {
        let ready = r#"{"t":"ready","protocol":"wvpipe","version":"1.0","pid":8}"#;
        let script = format!(
            "sleep 1; printf '%s' '{}a{ready}' >&\"$2\"; sleep 5",
            ready.len()
        );
        let mut worker = WorkerProcess::new(shell(&script));
        worker.start().unwrap();

        let began = Instant::now();
        assert!(worker.wait_for_startup(Duration::from_secs(5)).unwrap());
        let waited = began.elapsed();
        assert!(waited >= Duration::from_millis(900), "{waited:?}");
        assert!(waited < Duration::from_secs(4), "{waited:?}");
        assert_eq!(worker.worker_info().map(|info| info.pid), Some(8));
        worker.kill().unwrap();
    }

    #[test]
    fn kill_does_not_block_on_a_full_pipe() {
        let mut worker = WorkerProcess::new(shell("sleep 30"));
        worker.start().unwrap();

        // Fill the worker's inbound pipe; it never reads.
        let proxy = worker.proxy().unwrap();
        proxy.channel().writer_ref().set_nonblocking(true).unwrap();
        let url = "x".repeat(1024);
        let mut filled = false;
        for _ in 0..4096 {
            if proxy.navigate(&url).is_err() {
                filled = true;
                break;
            }
        }
        assert!(filled, "pipe never filled");

        let began = Instant::now();
        worker.kill().unwrap();
        assert!(began.elapsed() < Duration::from_secs(3), "{:?}", began.elapsed());
        assert_eq!(worker.state(), LifecycleState::Terminated);
        assert_eq!(worker.exit_status().and_then(|s| s.signal()), Some(9));
    }

    #[test]
    fn start_twice_rejected() {
        let mut worker = WorkerProcess::new(shell("sleep 5"));
        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(PeerError::InvalidState(_))));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let mut worker = WorkerProcess::new(LifecycleConfig::new("/nonexistent/wvpipe-worker"));
        let err = worker.start().unwrap_err();
        assert!(matches!(err, PeerError::Spawn { .. }));
        assert_eq!(worker.state(), LifecycleState::Unstarted);
    }

    #[test]
    fn proxy_unavailable_before_start() {
        let mut worker = WorkerProcess::new(LifecycleConfig::default());
        assert!(matches!(worker.proxy(), Err(PeerError::InvalidState(_))));
        assert!(matches!(
            worker.wait_for_startup(Duration::ZERO),
            Err(PeerError::InvalidState(_))
        ));
    }
}
