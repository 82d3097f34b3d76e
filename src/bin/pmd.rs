//! pmd - Process supervisor daemon
//!
//! Runs a set of named commands, samples their CPU and memory into log
//! files, and accepts control commands over TCP.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! pmd start --port 8080 --log-dir logs --log-frequency 30
//!
//! # Start with pre-configured processes, in the background
//! pmd start --config pm.toml -d
//!
//! # Stop the daemon
//! pmd stop
//!
//! # Check daemon status
//! pmd status
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pm_protocol::{Request, Severity};
use pmd::client::send_request;
use pmd::config::DaemonConfig;
use pmd::daemon::Daemon;
use pmd::process::OsSpawner;
use pmd::server::{DEFAULT_HOST, DEFAULT_PORT};

/// pm daemon - single-host process supervisor
#[derive(Parser, Debug)]
#[command(name = "pmd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// TCP port to listen on [default: 8080]
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind [default: localhost]
        #[arg(long)]
        host: Option<String>,

        /// Directory for CPU/memory log files [default: logs]
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Metric samples per minute [default: 30]
        #[arg(long)]
        log_frequency: Option<u32>,

        /// TOML file with [daemon] settings and [[process]] entries
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop {
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pm")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("pmd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("pmd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

/// Merges defaults, the config file and CLI flags, in that order.
fn build_config(
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    log_dir: Option<PathBuf>,
    log_frequency: Option<u32>,
) -> Result<DaemonConfig> {
    let mut merged = match config {
        Some(path) => DaemonConfig::load(&path)?,
        None => DaemonConfig::default(),
    };

    if let Some(host) = host {
        merged.host = host;
    }
    if let Some(port) = port {
        merged.port = port;
    }
    if let Some(log_dir) = log_dir {
        merged.log_dir = log_dir;
    }
    if let Some(log_frequency) = log_frequency {
        merged.log_frequency = log_frequency;
    }

    // Daemonizing changes directory to "/"; pin relative paths first
    if merged.log_dir.is_relative() {
        merged.log_dir = merged.workdir.join(&merged.log_dir);
    }

    merged.validate()?;
    Ok(merged)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        port: None,
        host: None,
        log_dir: None,
        log_frequency: None,
        config: None,
    });

    match command {
        Command::Start {
            daemon,
            port,
            host,
            log_dir,
            log_frequency,
            config,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'pmd stop' to stop it first.");
                process::exit(1);
            }

            let config = build_config(config, host, port, log_dir, log_frequency)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop { host, port } => stop_daemon(&host, port),
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

#[tokio::main]
async fn stop_daemon(host: &str, port: u16) -> Result<()> {
    let address = format!("{host}:{port}");
    let response = send_request(&address, &Request::Stop)
        .await
        .with_context(|| format!("Failed to reach pmd at {address}"))?;

    match (response.severity(), response.as_status()) {
        (Some(Severity::Success), Some(text)) => {
            println!("{text}");
            Ok(())
        }
        (_, Some(text)) => bail!("{text}"),
        (_, None) => bail!("Unexpected data reply to stop"),
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pmd=info".parse()?)
                .add_directive("pm_core=info".parse()?)
                .add_directive("pm_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pmd starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let daemon = Daemon::bind(config, Arc::new(OsSpawner), cancel_token)
        .await
        .context("Failed to start pmd")?;

    info!(address = %daemon.local_addr(), "pmd ready");

    if let Err(e) = daemon.run().await {
        error!(error = %e, "Daemon error");
        return Err(e.into());
    }

    info!("pmd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
