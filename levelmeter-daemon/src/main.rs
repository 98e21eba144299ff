//! Level Meter - live sound level in the terminal
//!
//! Captures the microphone (or replays a WAV file) in 20 ms frames, shows a
//! smoothed, calibrated dB level as a colored bar, and accepts control commands
//! on a Unix socket (`toggle`, `start`, `stop`, `gain <dB>`, `status`, `quit`).

use anyhow::{Context, Result};
use clap::Parser;
use levelmeter_audio::{list_devices, AudioSource, CpalBackend, PcmBackend, WavBackend};
use levelmeter_daemon::{IpcServer, Meter, MeterConfig, Overrides, TerminalDisplay};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "levelmeter", version, about = "Live sound level meter")]
struct Args {
    /// Configuration file (default: <config dir>/levelmeter/config.toml)
    #[arg(long, env = "LEVELMETER_CONFIG")]
    config: Option<PathBuf>,

    /// Capture rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Input preset: name (e.g. voice_recognition) or integer code
    #[arg(long)]
    source: Option<AudioSource>,

    /// Input device index, see --list-devices
    #[arg(long)]
    device: Option<usize>,

    /// Replay a 16-bit WAV file at real-time cadence instead of the microphone
    #[arg(long, value_name = "WAV")]
    input: Option<PathBuf>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Do not open the control socket
    #[arg(long)]
    no_socket: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    if args.list_devices {
        return print_devices();
    }

    info!("Starting Level Meter v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => MeterConfig::load_from(path),
        None => MeterConfig::load(),
    }
    .context("Failed to load configuration")?;

    info!("Configuration loaded from {}", config.config_path.display());

    let mut overrides = Overrides {
        sample_rate: args.sample_rate,
        audio_source: args.source,
        device_index: args.device,
    };

    match &args.input {
        Some(path) => {
            let backend = WavBackend::new(path);
            let file_rate = backend
                .sample_rate()
                .with_context(|| format!("Failed to open {}", path.display()))?;
            if file_rate != overrides.sample_rate.unwrap_or(config.sample_rate) {
                info!(file_rate, "Using the WAV file's sample rate");
            }
            overrides.sample_rate = Some(file_rate);
            overrides.apply(&mut config);
            run(config, overrides, backend, !args.no_socket, true).await
        }
        None => {
            overrides.apply(&mut config);
            run(config, overrides, CpalBackend::new(), !args.no_socket, false).await
        }
    }
}

async fn run<B: PcmBackend + 'static>(
    config: MeterConfig,
    overrides: Overrides,
    backend: B,
    with_socket: bool,
    until_exhausted: bool,
) -> Result<()> {
    config.validate()?;

    let (meter, updates) = Meter::new(&config, backend)?;
    let meter = Arc::new(meter.with_reload(config.config_path.clone(), overrides));

    let display = TerminalDisplay::new(config.segments, meter.last_reading_slot());
    let display_task = tokio::spawn(display.run(updates));

    meter.start().await.context("Failed to start audio capture")?;
    info!(
        sample_rate = config.sample_rate,
        source = %config.audio_source,
        "Level meter ready"
    );

    let ipc_server = if with_socket {
        let server = IpcServer::new(&config.socket_path, Arc::clone(&meter))
            .context("Failed to start IPC server")?;
        info!("   Use 'echo toggle | nc -U {}' to pause and resume", server.path().display());
        Some(server)
    } else {
        None
    };

    tokio::select! {
        result = serve(ipc_server) => {
            if let Err(e) = result {
                error!("IPC server error: {:#}", e);
            }
        }
        _ = input_exhausted(&meter), if until_exhausted => {
            info!("Input finished");
        }
        _ = meter.shutdown_requested() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down...");
    if let Err(e) = meter.stop().await {
        warn!("Failed to stop capture cleanly: {:#}", e);
    }

    display_task.abort();
    let _ = display_task.await;
    println!();

    let status = meter.status();
    info!(
        samples = status.total_samples,
        collisions = status.collisions,
        "Level meter stopped"
    );

    Ok(())
}

async fn serve(server: Option<IpcServer>) -> Result<()> {
    match server {
        Some(mut server) => server.run().await,
        None => std::future::pending().await,
    }
}

/// Resolves once a finite input has been played to the end
async fn input_exhausted(meter: &Meter) {
    while !meter.input_exhausted() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn print_devices() -> Result<()> {
    let devices = list_devices().context("Failed to list input devices")?;
    if devices.is_empty() {
        println!("No input devices found");
        return Ok(());
    }

    for device in devices {
        println!(
            "{}{:>3}  {}  ({} ch, {} Hz)",
            if device.is_default { "*" } else { " " },
            device.index,
            device.name,
            device.max_input_channels,
            device.default_sample_rate
        );
    }
    Ok(())
}
