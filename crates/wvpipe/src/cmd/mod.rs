use clap::{Args, Subcommand};
use std::path::PathBuf;

use wvpipe::exit::CliResult;

use crate::output::OutputFormat;

pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spawn a worker, drive it once and report what happened.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Worker executable. Defaults to `wvpipe-worker` next to this binary.
    #[arg(long, value_name = "PATH", env = "WVPIPE_WORKER_BIN")]
    pub worker_bin: Option<PathBuf>,
    /// How long to wait for the worker's first datagram (e.g. 15s, 500ms).
    #[arg(long, default_value = "15s")]
    pub startup_timeout: String,
    /// URL to navigate the view to.
    #[arg(long, default_value = "about:blank")]
    pub url: String,
    /// Script whose value is requested with eval_value.
    #[arg(long, default_value = "1+1")]
    pub eval: String,
    /// How long to wait for the eval result (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub eval_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
