//! Bounded and non-blocking dispatch loops over a datagram source.
//!
//! Both loops hand each datagram to a handler that returns
//! [`ControlFlow::Break`] to stop early, which is how `kill` unwinds.

use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::os::fd::AsFd;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::channel::Channel;
use crate::datagram::Datagram;
use crate::error::Result;

/// Timing knobs for [`run_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Longest single readiness wait.
    pub ready_timeout: Duration,
    /// Sleep between readiness checks that found nothing.
    pub poll_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Something datagrams can be pulled from once they are ready.
pub trait DatagramSource {
    /// Wait up to `timeout` and return the next datagram if one arrived.
    fn next_ready(&mut self, timeout: Duration) -> Result<Option<Datagram>>;
}

impl<R: Read + AsFd, W: Write> DatagramSource for Channel<R, W> {
    fn next_ready(&mut self, timeout: Duration) -> Result<Option<Datagram>> {
        if self.ready(timeout)? {
            self.receive().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Outcome of one [`drain_now`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drained {
    /// Datagrams handed to the handler.
    pub dispatched: usize,
    /// Whether the handler asked to stop.
    pub stopped: bool,
}

/// Dispatch datagrams for up to `duration`, or forever when `None`.
///
/// Returns `Break` if the handler stopped the loop and `Continue` once the
/// duration ran out. Transport and decode errors end the loop immediately.
pub fn run_for<S, H>(
    source: &mut S,
    duration: Option<Duration>,
    config: &PollConfig,
    mut handler: H,
) -> Result<ControlFlow<()>>
where
    S: DatagramSource + ?Sized,
    H: FnMut(Datagram) -> Result<ControlFlow<()>>,
{
    let deadline = duration.map(|d| Instant::now() + d);
    let remaining = || deadline.map(|d| d.saturating_duration_since(Instant::now()));

    loop {
        let wait = match remaining() {
            Some(left) => config.ready_timeout.min(left),
            None => config.ready_timeout,
        };

        match source.next_ready(wait)? {
            Some(datagram) => {
                if handler(datagram)?.is_break() {
                    trace!("dispatch loop stopped by handler");
                    return Ok(ControlFlow::Break(()));
                }
            }
            None => {
                let nap = match remaining() {
                    Some(left) => config.poll_interval.min(left),
                    None => config.poll_interval,
                };
                if !nap.is_zero() {
                    thread::sleep(nap);
                }
            }
        }

        if remaining().is_some_and(|left| left.is_zero()) {
            return Ok(ControlFlow::Continue(()));
        }
    }
}

/// Dispatch every datagram that is available right now, then return.
pub fn drain_now<S, H>(source: &mut S, mut handler: H) -> Result<Drained>
where
    S: DatagramSource + ?Sized,
    H: FnMut(Datagram) -> Result<ControlFlow<()>>,
{
    let mut drained = Drained::default();
    while let Some(datagram) = source.next_ready(Duration::ZERO)? {
        drained.dispatched += 1;
        if handler(datagram)?.is_break() {
            drained.stopped = true;
            break;
        }
    }
    Ok(drained)
}
