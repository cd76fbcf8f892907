#![cfg(all(unix, feature = "cli"))]

use std::cell::RefCell;
use std::process::Command;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use wvpipe::peer::{EvalError, EvalResult, LifecycleConfig, LifecycleState, WorkerProcess};

fn worker_config() -> LifecycleConfig {
    LifecycleConfig::new(env!("CARGO_BIN_EXE_wvpipe-worker"))
}

fn started_worker() -> WorkerProcess {
    let mut worker = WorkerProcess::new(worker_config());
    worker.start().expect("worker should spawn");
    assert!(
        worker
            .wait_for_startup(Duration::from_secs(10))
            .expect("startup wait should not fail"),
        "worker should announce itself"
    );
    worker
}

fn eval_value(worker: &mut WorkerProcess, source: &str) -> EvalResult {
    let slot: Rc<RefCell<Option<EvalResult>>> = Rc::default();
    let proxy = worker.proxy().expect("proxy should exist after start");
    let sink = Rc::clone(&slot);
    proxy
        .eval_value(source, move |result| *sink.borrow_mut() = Some(result))
        .expect("eval_value should send");

    let deadline = Instant::now() + Duration::from_secs(10);
    while slot.borrow().is_none() {
        assert!(Instant::now() < deadline, "eval result should arrive");
        let flow = proxy
            .run_for(Some(Duration::from_millis(100)))
            .expect("dispatch should not fail");
        assert!(flow.is_continue(), "worker closed before answering");
    }
    let result = slot.borrow_mut().take().expect("result was checked above");
    result
}

#[test]
fn worker_announces_and_evaluates() {
    let mut worker = started_worker();
    assert_eq!(worker.state(), LifecycleState::Running);

    let info = worker.worker_info().expect("ready info should be recorded");
    assert_eq!(info.protocol, "wvpipe");
    assert_eq!(Some(info.pid), worker.pid());

    assert_eq!(eval_value(&mut worker, "1+1").unwrap(), json!(2));
    assert_eq!(
        eval_value(&mut worker, r#"{"a":[1,2]}"#).unwrap(),
        json!({"a": [1, 2]})
    );

    worker.kill().expect("kill should succeed");
    assert_eq!(worker.state(), LifecycleState::Terminated);
    let status = worker.exit_status().expect("worker should be reaped");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn worker_reports_script_errors() {
    let mut worker = started_worker();
    match eval_value(&mut worker, "document.title") {
        Err(EvalError::Script(message)) => assert!(!message.is_empty()),
        other => panic!("expected script error, got {other:?}"),
    }
    worker.kill().expect("kill should succeed");
}

#[test]
fn worker_keeps_serving_while_view_runs() {
    let mut worker = started_worker();
    {
        let proxy = worker.proxy().expect("proxy should exist");
        proxy.navigate("about:blank").expect("navigate should send");
        proxy.set_title("probe").expect("title should send");
        proxy.run().expect("run should send");
    }
    assert_eq!(eval_value(&mut worker, "40+2").unwrap(), Value::from(42));

    worker.kill().expect("kill should succeed");
    assert_eq!(worker.exit_status().and_then(|s| s.code()), Some(0));
}

#[test]
fn worker_without_descriptors_is_usage_error() {
    let status = Command::new(env!("CARGO_BIN_EXE_wvpipe-worker"))
        .status()
        .expect("worker should run");
    assert_eq!(status.code(), Some(64));
}

#[test]
fn worker_with_closed_descriptors_is_usage_error() {
    let status = Command::new(env!("CARGO_BIN_EXE_wvpipe-worker"))
        .args(["900", "901"])
        .status()
        .expect("worker should run");
    assert_eq!(status.code(), Some(64));

    let status = Command::new(env!("CARGO_BIN_EXE_wvpipe-worker"))
        .args(["read", "write"])
        .status()
        .expect("worker should run");
    assert_eq!(status.code(), Some(64));
}
