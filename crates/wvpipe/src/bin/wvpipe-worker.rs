//! Worker process: serves one headless view over two inherited pipes.
//!
//! Usage: `wvpipe-worker <read-fd> <write-fd>`

use std::os::fd::RawFd;

use tracing::{error, info};
use wvpipe::exit::{peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use wvpipe::logging::{init_logging_from_env, LogLevel};
use wvpipe::peer::{Channel, HeadlessView, Role, ViewError, WorkerConfig, WorkerDispatcher};
use wvpipe::transport::{PipeReader, PipeWriter};

fn main() {
    init_logging_from_env(LogLevel::Warn);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(code = err.code, "{}", err.message);
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn run(args: &[String]) -> CliResult<i32> {
    let [read_fd, write_fd] = args else {
        return Err(CliError::new(
            USAGE,
            "usage: wvpipe-worker <read-fd> <write-fd>",
        ));
    };
    let read_fd = parse_fd(read_fd)?;
    let write_fd = parse_fd(write_fd)?;

    // SAFETY: the two descriptors were handed to this process by its parent
    // and nothing else in the process owns them.
    let reader = unsafe { PipeReader::from_inherited(read_fd) }
        .map_err(|err| transport_error("read descriptor", err))?;
    // SAFETY: as above.
    let writer = unsafe { PipeWriter::from_inherited(write_fd) }
        .map_err(|err| transport_error("write descriptor", err))?;

    info!(read_fd, write_fd, "worker starting");
    let channel = Channel::new(Role::Worker, reader, writer);
    let mut dispatcher = WorkerDispatcher::new(
        channel,
        || Ok::<_, ViewError>(HeadlessView::new()),
        WorkerConfig::default(),
    );
    dispatcher
        .serve()
        .map_err(|err| peer_error("worker", err))?;
    Ok(SUCCESS)
}

fn parse_fd(raw: &str) -> CliResult<RawFd> {
    match raw.parse::<RawFd>() {
        Ok(fd) if fd >= 0 => Ok(fd),
        _ => Err(CliError::new(USAGE, format!("invalid descriptor: {raw}"))),
    }
}
