//! Integration tests for the TCP control server.
//!
//! These tests run a real daemon on an ephemeral port against real `sleep`
//! processes and check replies byte for byte.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pm_protocol::{decode_list, decode_records, ListEntry, RecordKind, Response, Value};
use pmd::client::send_line;
use pmd::config::DaemonConfig;
use pmd::daemon::{Daemon, DaemonError};
use pmd::process::OsSpawner;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for the daemon to finish after `stop`
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for a killed process to leave the process table
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Time for a short-lived command to print and exit
const OUTPUT_SETTLE: Duration = Duration::from_millis(300);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test daemon context that manages daemon lifecycle and cleanup.
struct TestDaemon {
    address: String,
    port: u16,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<(), DaemonError>>,
    _log_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestDaemon {
    async fn spawn() -> Self {
        let log_dir = tempfile::tempdir().expect("create temp dir");
        let config = DaemonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_dir: log_dir.path().to_path_buf(),
            ..DaemonConfig::default()
        };
        let cancel_token = CancellationToken::new();

        let daemon = Daemon::bind(config, Arc::new(OsSpawner), cancel_token.clone())
            .await
            .expect("bind daemon");
        let port = daemon.local_addr().port();
        let task = tokio::spawn(daemon.run());

        TestDaemon {
            address: format!("127.0.0.1:{port}"),
            port,
            cancel_token,
            task,
            _log_dir: log_dir,
        }
    }

    async fn send(&self, line: &str) -> Response {
        send_line(&self.address, line).await.expect("send request")
    }

    async fn status(&self, line: &str) -> String {
        match self.send(line).await {
            Response::Status(text) => text,
            Response::Data(payload) => panic!("expected status for {line:?}, got data {payload:?}"),
        }
    }

    async fn data(&self, line: &str) -> Vec<u8> {
        match self.send(line).await {
            Response::Data(payload) => payload,
            Response::Status(text) => panic!("expected data for {line:?}, got status {text:?}"),
        }
    }

    async fn pid_of(&self, name: &str) -> i32 {
        let records = decode_records(&self.data(&format!("get_pid {name}")).await, RecordKind::Pid)
            .expect("decode pid");
        match records.as_slice() {
            [record] => match record.value {
                Value::Pid(pid) => pid,
                ref other => panic!("unexpected value {other:?}"),
            },
            other => panic!("expected one record, got {other:?}"),
        }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(SHUTDOWN_TIMEOUT, self.task)
            .await
            .expect("daemon stops in time")
            .expect("daemon task")
            .expect("daemon result");
    }
}

fn pid_alive(pid: i32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Waits until `pid` has no process table entry, zombie included.
async fn reaped_within(pid: i32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if !pid_alive(pid) {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    !pid_alive(pid)
}

/// Alive and not a zombie.
fn pid_running(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat.contains(") Z "),
        Err(_) => false,
    }
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_on_empty_registry_is_empty_data() {
    let daemon = TestDaemon::spawn().await;

    let reply = daemon.send("list").await;
    assert_eq!(reply, Response::Data(Vec::new()));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_list_preserves_insertion_order() {
    let daemon = TestDaemon::spawn().await;

    daemon.status("add zeta 'sleep 30'").await;
    daemon.status("add alpha 'sleep 31'").await;

    let payload = daemon.data("list").await;
    assert_eq!(payload, b"zeta\x00sleep 30\x00\x00alpha\x00sleep 31".to_vec());
    assert_eq!(
        decode_list(&payload).unwrap(),
        vec![ListEntry::new("zeta", "sleep 30"), ListEntry::new("alpha", "sleep 31")]
    );

    daemon.shutdown().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_add_start_get_pid_matches_live_process() {
    let daemon = TestDaemon::spawn().await;

    assert_eq!(daemon.status("add foo 'sleep 100'").await, "Successfully added process 'foo'");
    assert_eq!(daemon.pid_of("foo").await, -1);

    assert_eq!(daemon.status("start foo").await, "Successfully started process 'foo'");
    let pid = daemon.pid_of("foo").await;
    assert!(pid > 0);
    assert!(pid_alive(pid), "pid {pid} should be running");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_kill_inactive_then_active() {
    let daemon = TestDaemon::spawn().await;
    daemon.status("add foo 'sleep 100'").await;

    assert_eq!(daemon.status("kill foo").await, "Error: Process 'foo' is not active");

    daemon.status("start foo").await;
    let pid = daemon.pid_of("foo").await;
    assert_eq!(daemon.status("kill foo").await, "Successfully killed process 'foo'");
    assert_eq!(daemon.pid_of("foo").await, -1);
    assert!(reaped_within(pid, REAP_TIMEOUT).await, "killed pid {pid} still in process table");

    // Still registered after a kill
    assert_eq!(daemon.data("list").await, b"foo\x00sleep 100".to_vec());

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_remove_active_process() {
    let daemon = TestDaemon::spawn().await;
    daemon.status("add foo 'sleep 100'").await;
    daemon.status("start foo").await;
    let pid = daemon.pid_of("foo").await;
    assert!(pid > 0);

    assert_eq!(daemon.status("rem foo").await, "Successfully removed process 'foo'");
    assert!(reaped_within(pid, REAP_TIMEOUT).await, "removed pid {pid} still in process table");
    assert!(daemon.data("list").await.is_empty());
    assert_eq!(daemon.status("get_pid foo").await, "Error: Couldn't find process 'foo'");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_restart_changes_pid() {
    let daemon = TestDaemon::spawn().await;
    daemon.status("add foo 'sleep 100'").await;
    daemon.status("start foo").await;
    let first = daemon.pid_of("foo").await;

    assert_eq!(daemon.status("restart foo").await, "Successfully restarted process 'foo'");
    let second = daemon.pid_of("foo").await;
    assert!(second > 0);
    assert_ne!(first, second);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_bulk_start_and_restart_counts() {
    let daemon = TestDaemon::spawn().await;

    assert_eq!(daemon.status("start").await, "Warning: No processes to start");

    daemon.status("add a 'sleep 100'").await;
    daemon.status("add b 'sleep 100'").await;
    daemon.status("add c 'sleep 100'").await;
    daemon.status("start b").await;

    assert_eq!(daemon.status("start").await, "Started 2 out of 3 processes");
    assert_eq!(daemon.status("start").await, "Warning: No processes were started");
    assert_eq!(daemon.status("restart").await, "Restarted 3 out of 3 processes");

    daemon.shutdown().await;
}

// ============================================================================
// Metrics and Output
// ============================================================================

#[tokio::test]
async fn test_metric_records_cover_every_process() {
    let daemon = TestDaemon::spawn().await;
    daemon.status("add up 'sleep 100'").await;
    daemon.status("add down 'sleep 100'").await;
    daemon.status("start up").await;

    let cpu = decode_records(&daemon.data("get_cpu").await, RecordKind::Float).unwrap();
    assert_eq!(cpu.len(), 2);
    assert_eq!(cpu[0].name, "up");
    assert_eq!(cpu[1].value, Value::Float(0.0));

    let memory = decode_records(&daemon.data("get_memory up").await, RecordKind::Float).unwrap();
    assert_eq!(memory.len(), 1);
    match memory[0].value {
        Value::Float(bytes) => assert!(bytes >= 0.0),
        ref other => panic!("unexpected value {other:?}"),
    }

    let uptime = decode_records(&daemon.data("get_uptime").await, RecordKind::Text).unwrap();
    match &uptime[0].value {
        Value::Text(text) => assert!(text.starts_with("0:00:0"), "uptime {text}"),
        other => panic!("unexpected value {other:?}"),
    }
    assert_eq!(uptime[1].value, Value::Text("0:00:00".to_string()));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_captured_stdout_and_stderr() {
    let daemon = TestDaemon::spawn().await;
    daemon
        .status(r#"add chatty "echo hello; echo oops >&2""#)
        .await;
    daemon.status("start chatty").await;
    sleep(OUTPUT_SETTLE).await;

    assert_eq!(daemon.data("get_stdout chatty").await, b"hello\n".to_vec());
    assert_eq!(daemon.data("get_stderr chatty").await, b"oops\n".to_vec());
    // Output remains readable after the process exits
    assert_eq!(daemon.pid_of("chatty").await, -1);
    assert_eq!(daemon.data("get_stdout chatty").await, b"hello\n".to_vec());

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_add_honors_workdir() {
    let daemon = TestDaemon::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let canonical = dir.path().canonicalize().unwrap();

    daemon
        .status(&format!("add where pwd False False '{}'", canonical.display()))
        .await;
    daemon.status("start where").await;
    sleep(OUTPUT_SETTLE).await;

    let out = daemon.data("get_stdout where").await;
    assert_eq!(String::from_utf8(out).unwrap().trim_end(), canonical.display().to_string());

    daemon.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_stop_replies_then_shuts_down() {
    let daemon = TestDaemon::spawn().await;
    daemon.status("add foo 'sleep 100'").await;
    daemon.status("start foo").await;
    let pid = daemon.pid_of("foo").await;

    let reply = daemon.status("stop").await;
    assert_eq!(reply, format!("Stopped pmd running on 127.0.0.1:{}", daemon.port));

    timeout(SHUTDOWN_TIMEOUT, daemon.task)
        .await
        .expect("daemon stops in time")
        .expect("daemon task")
        .expect("daemon result");

    assert!(send_line(&daemon.address, "list").await.is_err());

    // Killed processes may linger briefly as zombies until reaped
    let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
    while pid_running(pid) && tokio::time::Instant::now() < deadline {
        sleep(Duration::from_millis(20)).await;
    }
    assert!(!pid_running(pid), "pid {pid} survived shutdown");
}
