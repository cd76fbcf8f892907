use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use wvpipe::exit::{peer_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT, USAGE};
use wvpipe::peer::{EvalError, EvalResult, LifecycleConfig, WorkerProcess};

use crate::cmd::ProbeArgs;
use crate::output::{print_fields, print_json, OutputFormat};

const WORKER_BIN_NAME: &str = "wvpipe-worker";
const SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct ProbeOutput {
    worker_bin: String,
    worker_pid: Option<u32>,
    protocol_version: Option<String>,
    startup_ms: f64,
    url: String,
    eval: String,
    eval_status: &'static str,
    eval_value: Value,
    eval_ms: Option<f64>,
    messages_sent: u64,
    messages_received: u64,
    exit_code: Option<i32>,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let startup_timeout = parse_duration(&args.startup_timeout)?;
    let eval_timeout = parse_duration(&args.eval_timeout)?;
    let program = resolve_worker_bin(args.worker_bin)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(interrupted.clone())?;

    let mut worker = WorkerProcess::new(LifecycleConfig {
        eval_timeout: Some(eval_timeout),
        ..LifecycleConfig::new(&program)
    });
    worker
        .start()
        .map_err(|err| peer_error("failed to start worker", err))?;

    let started_at = Instant::now();
    if !wait_for_startup(&mut worker, startup_timeout, &interrupted)? {
        worker
            .kill()
            .map_err(|err| peer_error("failed to stop worker", err))?;
        if interrupted.load(Ordering::SeqCst) {
            return Err(CliError::new(FAILURE, "interrupted"));
        }
        return Err(CliError::new(
            TIMEOUT,
            format!("worker sent nothing within {startup_timeout:?}"),
        ));
    }
    let startup_ms = millis(started_at.elapsed());
    info!(startup_ms, "worker is up");

    let outcome: Rc<RefCell<Option<(EvalResult, Duration)>>> = Rc::default();
    let eval_started = Instant::now();
    {
        let proxy = worker
            .proxy()
            .map_err(|err| peer_error("worker channel unavailable", err))?;
        proxy
            .navigate(&args.url)
            .map_err(|err| peer_error("navigate failed", err))?;
        proxy.run().map_err(|err| peer_error("run failed", err))?;

        let sink = Rc::clone(&outcome);
        proxy
            .eval_value(&args.eval, move |result| {
                *sink.borrow_mut() = Some((result, eval_started.elapsed()));
            })
            .map_err(|err| peer_error("eval_value failed", err))?;

        while outcome.borrow().is_none() && !interrupted.load(Ordering::SeqCst) {
            let flow = proxy
                .run_for(Some(SLICE))
                .map_err(|err| peer_error("worker channel failed", err))?;
            if flow.is_break() {
                break;
            }
        }
    }

    let worker_pid = worker.pid();
    let protocol_version = worker.worker_info().map(|info| info.version.clone());
    let (messages_sent, messages_received) = match worker.proxy() {
        Ok(proxy) => (proxy.messages_sent(), proxy.messages_received()),
        Err(_) => (0, 0),
    };

    worker
        .kill()
        .map_err(|err| peer_error("failed to stop worker", err))?;
    debug!(status = ?worker.exit_status(), "worker reaped");

    let (eval_status, eval_value, eval_ms, code) = match outcome.borrow_mut().take() {
        Some((Ok(value), took)) => ("success", value, Some(millis(took)), SUCCESS),
        Some((Err(EvalError::Script(message)), took)) => {
            ("error", Value::String(message), Some(millis(took)), FAILURE)
        }
        Some((Err(EvalError::TimedOut(_)), _)) => ("timeout", Value::Null, None, TIMEOUT),
        None => ("interrupted", Value::Null, None, FAILURE),
    };

    let out = ProbeOutput {
        worker_bin: program.display().to_string(),
        worker_pid,
        protocol_version,
        startup_ms,
        url: args.url,
        eval: args.eval,
        eval_status,
        eval_value,
        eval_ms,
        messages_sent,
        messages_received,
        exit_code: worker.exit_status().and_then(|status| status.code()),
    };
    print_probe(&out, format);
    Ok(code)
}

fn wait_for_startup(
    worker: &mut WorkerProcess,
    timeout: Duration,
    interrupted: &AtomicBool,
) -> CliResult<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(false);
        }
        let started = worker
            .wait_for_startup(left.min(SLICE))
            .map_err(|err| peer_error("worker startup failed", err))?;
        if started {
            return Ok(true);
        }
    }
}

fn resolve_worker_bin(explicit: Option<PathBuf>) -> CliResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let exe = std::env::current_exe()
        .map_err(|err| CliError::new(INTERNAL, format!("cannot locate current executable: {err}")))?;
    let dir = exe
        .parent()
        .ok_or_else(|| CliError::new(INTERNAL, "current executable has no parent directory"))?;
    Ok(dir.join(WORKER_BIN_NAME))
}

fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_fields(&[
            ("worker_bin", out.worker_bin.clone()),
            ("worker_pid", display_opt(out.worker_pid)),
            (
                "protocol_version",
                out.protocol_version.clone().unwrap_or_else(|| "-".into()),
            ),
            ("startup_ms", format!("{:.2}", out.startup_ms)),
            ("url", out.url.clone()),
            ("eval", out.eval.clone()),
            ("eval_status", out.eval_status.to_string()),
            ("eval_value", out.eval_value.to_string()),
            ("eval_ms", display_opt(out.eval_ms.map(|ms| format!("{ms:.2}")))),
            ("messages_sent", out.messages_sent.to_string()),
            ("messages_received", out.messages_received.to_string()),
            ("exit_code", display_opt(out.exit_code)),
        ]),
        OutputFormat::Pretty => {
            println!("Worker Probe:");
            println!("  Worker:           {}", out.worker_bin);
            println!("  PID:              {}", display_opt(out.worker_pid));
            println!(
                "  Protocol:         wvpipe {}",
                out.protocol_version.as_deref().unwrap_or("unknown")
            );
            println!("  Startup:          {:.2}ms", out.startup_ms);
            println!("  URL:              {}", out.url);
            println!(
                "  Eval:             {} => {} ({})",
                out.eval, out.eval_value, out.eval_status
            );
            println!(
                "  Datagrams:        sent={} received={}",
                out.messages_sent, out.messages_received
            );
            println!("  Exit code:        {}", display_opt(out.exit_code));
        }
        OutputFormat::Raw => println!("{}", out.eval_value),
    }
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn install_ctrlc_handler(interrupted: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
