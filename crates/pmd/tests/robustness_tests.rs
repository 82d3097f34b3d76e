//! Robustness tests for the daemon under misbehaving clients.
//!
//! Covers half-open connections, oversized and non-UTF-8 requests, and the
//! monitor loop writing logs while commands are served.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::sync::Arc;
use std::time::Duration;

use pm_core::ProcessName;
use pm_protocol::Response;
use pmd::client::{send_bytes, send_line};
use pmd::config::DaemonConfig;
use pmd::daemon::Daemon;
use pmd::monitor::{read_metric_log, MetricLog};
use pmd::process::OsSpawner;
use pmd::server::READ_BUFFER_SIZE;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct TestDaemon {
    address: String,
    cancel_token: CancellationToken,
    task: tokio::task::JoinHandle<Result<(), pmd::daemon::DaemonError>>,
    log_dir: TempDir,
}

impl TestDaemon {
    async fn spawn(log_frequency: u32) -> Self {
        let log_dir = tempfile::tempdir().expect("create temp dir");
        let config = DaemonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_dir: log_dir.path().to_path_buf(),
            log_frequency,
            ..DaemonConfig::default()
        };
        let cancel_token = CancellationToken::new();
        let daemon = Daemon::bind(config, Arc::new(OsSpawner), cancel_token.clone())
            .await
            .expect("bind daemon");
        let address = daemon.local_addr().to_string();

        TestDaemon {
            address,
            cancel_token,
            task: tokio::spawn(daemon.run()),
            log_dir,
        }
    }

    async fn status(&self, line: &str) -> String {
        match send_line(&self.address, line).await.expect("send request") {
            Response::Status(text) => text,
            Response::Data(payload) => panic!("expected status, got data {payload:?}"),
        }
    }

    /// Stops the daemon, handing back the log directory for inspection.
    async fn shutdown(self) -> TempDir {
        self.cancel_token.cancel();
        timeout(SHUTDOWN_TIMEOUT, self.task)
            .await
            .expect("daemon stops in time")
            .expect("daemon task")
            .expect("daemon result");
        self.log_dir
    }
}

#[tokio::test]
async fn test_client_that_disconnects_without_sending() {
    let daemon = TestDaemon::spawn(30).await;

    let stream = TcpStream::connect(&daemon.address).await.unwrap();
    drop(stream);

    // The acceptor moves on to the next client
    assert_eq!(daemon.status("kill ghost").await, "Error: Couldn't find process 'ghost'");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_client_that_resets_after_sending() {
    let daemon = TestDaemon::spawn(30).await;

    let mut stream = TcpStream::connect(&daemon.address).await.unwrap();
    stream.write_all(b"list").await.unwrap();
    // Zero linger makes the close send RST instead of FIN
    socket2::SockRef::from(&stream)
        .set_linger(Some(Duration::ZERO))
        .unwrap();
    drop(stream);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(daemon.status("start").await, "Warning: No processes to start");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_non_utf8_request() {
    let daemon = TestDaemon::spawn(30).await;

    let reply = send_bytes(&daemon.address, &[0xc3, 0x28, 0xff]).await.unwrap();
    assert_eq!(
        Response::decode(&reply).unwrap(),
        Response::Status("Error: Unrecognized command".to_string())
    );

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_oversized_request_is_truncated_not_fatal() {
    let daemon = TestDaemon::spawn(30).await;

    let huge = format!("add big '{}'", "x".repeat(READ_BUFFER_SIZE * 4));
    let reply = send_line(&daemon.address, &huge).await;
    // Whatever the truncated line decodes to, the reply is an error status
    // or the client saw the socket close early; the daemon survives either way.
    if let Ok(response) = reply {
        assert!(response.is_error(), "unexpected reply {response:?}");
    }

    assert_eq!(daemon.status("rem big").await, "Error: Couldn't find process 'big'");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_many_sequential_clients() {
    let daemon = TestDaemon::spawn(30).await;

    for i in 0..50 {
        let name = format!("p{i}");
        assert_eq!(
            daemon.status(&format!("add {name} 'sleep 1'")).await,
            format!("Successfully added process '{name}'")
        );
    }
    let list = send_line(&daemon.address, "list").await.unwrap();
    assert_eq!(pm_protocol::decode_list(list.as_data().unwrap()).unwrap().len(), 50);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_monitor_logs_while_serving() {
    // 600 samples/minute is a 100 ms period
    let daemon = TestDaemon::spawn(600).await;

    daemon.status("add logged 'sleep 100' True True").await;
    daemon.status("add unlogged 'sleep 100'").await;
    daemon.status("start").await;

    for _ in 0..5 {
        sleep(Duration::from_millis(80)).await;
        daemon.status("restart unlogged").await;
    }
    daemon.status("rem unlogged").await;

    let dir = daemon.shutdown().await;
    let log_dir = dir.path();

    let name = ProcessName::parse("logged").unwrap();
    let cpu = read_metric_log(&MetricLog::Cpu.path(log_dir, &name)).await.unwrap();
    let memory = read_metric_log(&MetricLog::Memory.path(log_dir, &name)).await.unwrap();
    assert!(cpu.len() >= 2, "only {} cpu samples", cpu.len());
    assert_eq!(cpu.len(), memory.len());
    assert!(cpu.iter().all(|v| *v >= 0.0));
    assert!(memory.iter().all(|v| *v > 0.0));

    let unlogged = ProcessName::parse("unlogged").unwrap();
    assert!(!MetricLog::Cpu.path(log_dir, &unlogged).exists());
}
