//! hapticd entry point.
//!
//! Loads the config, applies command line overrides and starts the socket
//! server.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use hapticd_core::config::{Config, Directories};
use hapticd_daemon::{DaemonOptions, default_socket_path};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// hapticd - haptic device hub
#[derive(Parser, Debug)]
#[command(name = "hapticd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Custom socket path (defaults to `$XDG_RUNTIME_DIR/hapticd.sock` or the temp dir)
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Config file (defaults to `~/.config/hapticd/config.json`)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the ping interval in milliseconds (0 disables it)
    #[arg(long, value_name = "MS")]
    max_ping_ms: Option<u32>,

    /// Override the name reported to clients
    #[arg(long)]
    server_name: Option<String>,

    /// Expose the configured simulated devices to every client
    #[arg(long)]
    simulate: bool,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const LOG_TARGETS: [&str; 4] = ["hapticd", "hapticd_daemon", "hapticd_core", "hapticd_proto"];

/// Default filter for the hapticd crates; `RUST_LOG` replaces it entirely.
fn log_filter(verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match (verbose, cfg!(debug_assertions)) {
        (0, false) => "info",
        (0, true) | (1, _) => "debug",
        _ => "trace",
    };
    let directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    EnvFilter::new(directives.join(","))
}

/// Log to stderr, plus a timestamped file when `log_dir` is set.
///
/// The returned guard flushes the file writer and must outlive the server.
fn setup_logging(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose > 0);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(log_filter(verbose))
            .init();
        return None;
    };

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("hapticd-{timestamp}.log");
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, &log_filename));

    #[cfg(unix)]
    {
        let latest = dir.join("hapticd.log");
        let _ = std::fs::remove_file(&latest);
        let _ = std::os::unix::fs::symlink(dir.join(&log_filename), &latest);
    }

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(file_layer.and_then(stderr_layer))
        .with(log_filter(verbose))
        .init();

    eprintln!("Logging to {}", dir.join(log_filename).display());
    Some(guard)
}

fn load_options(args: Args) -> anyhow::Result<DaemonOptions> {
    let config_path = match args.config {
        Some(path) => Some(path),
        None => Directories::new().map(|dirs| dirs.config_file),
    };
    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let mut server = config.server;
    if let Some(ms) = args.max_ping_ms {
        server.max_ping_time_ms = ms;
    }
    if let Some(name) = args.server_name {
        server.server_name = name;
    }

    Ok(DaemonOptions {
        socket_path: args.socket_path.unwrap_or_else(default_socket_path),
        server,
        simulation: args.simulate.then_some(config.simulation),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.verbose, args.log_dir.as_deref());

    let options = load_options(args)?;
    info!(
        socket = %options.socket_path.display(),
        "Starting hapticd as {:?} (ping {}ms, simulate: {})",
        options.server.server_name,
        options.server.max_ping_time_ms,
        options.simulation.is_some()
    );

    hapticd_daemon::run(options).await?;

    info!("hapticd stopped");
    Ok(())
}
