//! Process-fatal faults: each is logged to its own file, then the process
//! exits with status 1. Every case runs in a child process.
//!
//! The bind failure runs the real binary. The panic and background-failure
//! cases re-run this test binary, filtered to a single test, with
//! `WAYPOST_FATAL_DIR` set; the child branch of that test triggers the fault.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use waypost::{Mode, Settings, Telemetry, spawn_background};

const FATAL_DIR: &str = "WAYPOST_FATAL_DIR";

fn settings(log_dir: &Path) -> Settings {
    Settings {
        mode: Mode::Production,
        log_dir: log_dir.to_path_buf(),
        redact_stack: true,
        ..Settings::default()
    }
}

/// Re-run `test` alone in a child process that logs under `log_dir`.
fn rerun(test: &str, log_dir: &Path) -> Output {
    Command::new(std::env::current_exe().unwrap())
        .args([test, "--exact", "--test-threads=1"])
        .env(FATAL_DIR, log_dir)
        .output()
        .unwrap()
}

fn child_log_dir() -> Option<PathBuf> {
    std::env::var_os(FATAL_DIR).map(PathBuf::from)
}

fn json_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("{}: {e}", path.display()))
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// The day's file of a rotated log, e.g. `combined-2026-10-16.log`.
fn dated_log(dir: &Path, name: &str) -> PathBuf {
    let prefix = format!("{name}-");
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with(&prefix))
        .unwrap_or_else(|| panic!("no {name} log in {}", dir.display()))
}

#[test]
fn panic_outside_a_request_is_fatal() {
    if let Some(dir) = child_log_dir() {
        let _telemetry = Telemetry::init(&settings(&dir)).unwrap();
        panic!("worker gave up");
    }

    let dir = tempfile::tempdir().unwrap();
    let output = rerun("panic_outside_a_request_is_fatal", dir.path());
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let events = json_lines(&dir.path().join("exceptions.log"));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["message"], "Uncaught Exception");
    assert_eq!(events[0]["level"], "error");
    assert_eq!(events[0]["error"]["name"], "Panic");
    assert_eq!(events[0]["error"]["message"], "worker gave up");
    assert!(events[0]["error"]["stack"].as_str().unwrap().contains("tests/fatal.rs"));

    assert_eq!(fs::read_to_string(dir.path().join("rejections.log")).unwrap(), "");
}

#[test]
fn failed_background_task_is_fatal() {
    if let Some(dir) = child_log_dir() {
        let telemetry = Telemetry::init(&settings(&dir)).unwrap();
        let logger = telemetry.logger().clone();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let task = spawn_background(logger, async { Err::<(), _>("retention scan failed") });
            let _ = task.await;
        });
        unreachable!("the failed task exits the process");
    }

    let dir = tempfile::tempdir().unwrap();
    let output = rerun("failed_background_task_is_fatal", dir.path());
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let events = json_lines(&dir.path().join("rejections.log"));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["message"], "Unhandled Rejection");
    assert_eq!(events[0]["reason"], "retention scan failed");

    assert_eq!(fs::read_to_string(dir.path().join("exceptions.log")).unwrap(), "");
}

#[test]
fn bind_failure_logs_server_error_and_exits() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    let output = Command::new(env!("CARGO_BIN_EXE_waypost"))
        .current_dir(dir.path())
        .env_clear()
        .env("ENVIRONMENT_MODE", "production")
        .env("HOST", "127.0.0.1")
        .env("PORT", port.to_string())
        .env("LOG_DIR", &log_dir)
        .output()
        .unwrap();
    drop(taken);

    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let events = json_lines(&dated_log(&log_dir, "combined"));
    let error = events.iter().find(|e| e["message"] == "Server error").unwrap();
    assert_eq!(error["level"], "error");
    assert!(error["error"].as_str().unwrap().contains(&port.to_string()));

    let errors = json_lines(&dated_log(&log_dir, "error"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "Server error");
}
