#![cfg(all(unix, feature = "cli"))]

use std::process::Command;

use serde_json::Value;

fn wvpipe() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wvpipe"));
    cmd.args(["--log-level", "error"]);
    cmd
}

#[test]
fn probe_reports_eval_result_as_json() {
    let output = wvpipe()
        .args(["--format", "json", "probe", "--worker-bin"])
        .arg(env!("CARGO_BIN_EXE_wvpipe-worker"))
        .args(["--startup-timeout", "10s", "--eval", "2+3"])
        .output()
        .expect("probe should run");

    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["eval_status"], "success");
    assert_eq!(report["eval_value"], 5);
    assert_eq!(report["protocol_version"], "1.0");
    assert_eq!(report["exit_code"], 0);
    assert!(report["worker_pid"].as_u64().is_some());
}

#[test]
fn probe_script_error_exits_with_failure() {
    let output = wvpipe()
        .args(["--format", "raw", "probe", "--worker-bin"])
        .arg(env!("CARGO_BIN_EXE_wvpipe-worker"))
        .args(["--eval", "window.missing()"])
        .output()
        .expect("probe should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stdout.is_empty());
}

#[test]
fn probe_missing_worker_fails() {
    let output = wvpipe()
        .args(["probe", "--worker-bin", "/nonexistent/wvpipe-worker"])
        .output()
        .expect("probe should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to start worker"), "stderr: {stderr}");
}

#[test]
fn probe_rejects_bad_duration() {
    let output = wvpipe()
        .args(["probe", "--startup-timeout", "soon"])
        .output()
        .expect("probe should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_protocol() {
    let output = wvpipe()
        .args(["version", "--extended"])
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(stdout.contains("wvpipe"));
}
