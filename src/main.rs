//! # IMU Mouse Bridge
//!
//! Use an M5 Atom Matrix (or any peripheral speaking the same packet format)
//! as an air mouse on Linux.
//!
//! This application bridges tilt, twist and button packets from the
//! peripheral to a uinput virtual mouse.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use imu_mouse_bridge::config::{Config, MotionConfig, TransportKind, DEFAULT_CONFIG_PATH};
use imu_mouse_bridge::link::simulated::SimulatedTransport;
use imu_mouse_bridge::link::{LinkStateMachine, Transport};
use imu_mouse_bridge::output::uinput::UinputMouse;
use imu_mouse_bridge::shutdown::{self, ShutdownTrigger};
use imu_mouse_bridge::telemetry::SampleRecorder;

#[cfg(feature = "ble")]
use imu_mouse_bridge::link::ble::BleTransport;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "imu-mouse-bridge", version)]
#[command(about = "Turn a BLE inertial-measurement peripheral into a Linux pointer device")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Override the configured transport
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,
}

/// Main entry point for IMU Mouse Bridge application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Read configuration (a missing file means defaults)
///    - Set up logging to stderr and optionally a file
///    - Create the uinput virtual mouse (fatal on failure)
///    - Pick the transport
///
/// 2. **Main Loop**
///    - The link state machine scans, connects and streams until shutdown
///    - SIGHUP reloads motion settings for the next connection
///
/// 3. **Graceful Shutdown**
///    - SIGINT / SIGTERM request shutdown
///    - The link is torn down and any held button released
///    - If that takes longer than `shutdown_grace_ms` the process exits with
///      status 1
///
/// # Errors
///
/// Returns error if:
/// - The configuration file exists but is invalid
/// - The virtual mouse cannot be created
/// - The requested transport is not compiled in
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging so the log file setting can apply
    let config = load_config(&cli)?;

    let _log_guard = init_logging(cli.verbose, config.logging.file.as_deref())?;

    info!("IMU Mouse Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    // Warnings from loading were emitted before the subscriber existed
    if cli.config.exists() {
        info!("Configuration loaded from {}", cli.config.display());
    } else {
        warn!("Config file {} not found, using defaults", cli.config.display());
    }

    let sink = UinputMouse::create(&config.output).context("Cannot create virtual mouse")?;
    let transport = build_transport(&config)?;
    info!("Using {} transport", config.transport.kind);

    let recorder = if config.telemetry.enabled {
        match SampleRecorder::new(&config.telemetry) {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                warn!("Sample recording disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let (trigger, token) = shutdown::channel();
    let (motion_tx, motion_rx) = watch::channel(config.motion.clone());

    let config_path = cli.config.clone();
    let grace = config.link.shutdown_grace();
    let signals = tokio::spawn(async move {
        if let Err(e) = handle_signals(trigger, config_path, motion_tx, grace).await {
            error!("Signal handling failed: {}", e);
        }
    });

    let mut machine = LinkStateMachine::new(
        transport,
        sink,
        config.link.clone(),
        config.motion.clone(),
        token,
    )
    .with_motion_updates(motion_rx);
    if let Some(recorder) = recorder {
        machine = machine.with_recorder(recorder);
    }

    info!("Press Ctrl+C to exit");
    machine.run().await;

    signals.abort();
    info!("IMU Mouse Bridge stopped");
    Ok(())
}

/// Read the config file (defaults if missing) and apply CLI overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    if let Some(kind) = cli.transport {
        config.transport.kind = kind;
    }
    Ok(config)
}

/// Set up the tracing subscriber
///
/// `RUST_LOG` is honored unless `--verbose` forces debug. The returned guard
/// must stay alive for the file writer to flush.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let mut guard = None;
    let file_layer = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("Log file path {} has no file name", path.display()))?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(name.to_string_lossy().into_owned())
                .build(dir)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);

            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn build_transport(config: &Config) -> Result<Box<dyn Transport>> {
    match config.transport.kind {
        TransportKind::Simulated => Ok(Box::new(SimulatedTransport::new(
            config.transport.simulated_drop_after,
        ))),
        #[cfg(feature = "ble")]
        TransportKind::Ble => Ok(Box::new(BleTransport::new())),
        #[cfg(not(feature = "ble"))]
        TransportKind::Ble => Err(anyhow!(
            "BLE transport requested but this build lacks the `ble` feature"
        )),
    }
}

/// Wait for signals: SIGHUP reloads, SIGINT/SIGTERM shut down
///
/// After requesting shutdown the hard-deadline thread is armed.
async fn handle_signals(
    trigger: ShutdownTrigger,
    config_path: PathBuf,
    motion_tx: watch::Sender<MotionConfig>,
    grace: Duration,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sighup.recv() => reload(&config_path, &motion_tx),
        }
    }

    trigger.trigger();
    if let Err(e) = shutdown::spawn_hard_deadline(grace) {
        error!("Cannot arm shutdown deadline: {}", e);
    }
    Ok(())
}

/// Re-read the config file and publish its motion settings
fn reload(path: &Path, motion_tx: &watch::Sender<MotionConfig>) {
    info!("Received SIGHUP, reloading {}", path.display());
    match Config::load_or_default(path) {
        Ok(config) => {
            motion_tx.send_replace(config.motion);
            info!("Motion settings reloaded, applied at next connection");
        }
        Err(e) => error!("Reload failed, keeping previous configuration: {}", e),
    }
}
