//! Capture and level estimation wired together behind a start/stop switch

use anyhow::{Context, Result};
use levelmeter_audio::{AudioCapture, AudioError, AudioSource, CaptureMonitor, PcmBackend};
use levelmeter_level::{ChannelSink, DisplayUpdate, EstimatorHandle, LevelEstimator, LevelReading};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

use crate::config::{MeterConfig, Overrides};

/// Snapshot reported by the `status` command
#[derive(Debug, Clone, Serialize)]
pub struct MeterStatus {
    pub state: &'static str,
    pub input_exhausted: bool,
    pub sample_rate: u32,
    pub audio_source: AudioSource,
    pub total_samples: u64,
    pub frames_displayed: u64,
    pub collisions: u64,
    pub calibration_offset_db: f64,
    pub last_reading: Option<LevelReading>,
    pub last_error: Option<String>,
}

/// Rate and source the capture is (or will next be) opened with
#[derive(Debug, Clone, Copy, PartialEq)]
struct CaptureSettings {
    sample_rate: u32,
    audio_source: AudioSource,
}

impl CaptureSettings {
    fn from_config(config: &MeterConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            audio_source: config.audio_source,
        }
    }
}

/// Where capture settings are re-read from before each start
struct Reload {
    path: PathBuf,
    overrides: Overrides,
}

/// Configure for the next run, then start; a running capture is left as is
fn configure_and_start(
    capture: &mut AudioCapture,
    next: CaptureSettings,
    applied: &Mutex<CaptureSettings>,
) -> std::result::Result<(), AudioError> {
    if !capture.is_active() {
        capture.configure(next.sample_rate, next.audio_source)?;
        *applied.lock() = next;
    }
    capture.start()
}

/// The running meter
///
/// Owns the capture; the estimator lives inside the capture's frame handler
/// and is reached from here only through its [`EstimatorHandle`].
pub struct Meter {
    capture: Arc<Mutex<AudioCapture>>,
    monitor: CaptureMonitor,
    levels: EstimatorHandle,
    last_reading: Arc<Mutex<Option<LevelReading>>>,
    last_error: Arc<Mutex<Option<String>>>,
    settings: Arc<Mutex<CaptureSettings>>,
    reload: Option<Reload>,
    shutdown: Notify,
}

impl Meter {
    /// Build the pipeline; readings arrive on the returned receiver
    pub fn new<B: PcmBackend + 'static>(
        config: &MeterConfig,
        backend: B,
    ) -> Result<(Self, mpsc::Receiver<DisplayUpdate>)> {
        let (sink, updates) = ChannelSink::new();
        let mut estimator =
            LevelEstimator::new(config.level_config(), sink).context("Invalid level settings")?;
        let levels = estimator.handle();

        let last_error = Arc::new(Mutex::new(None));
        let mut capture = AudioCapture::with_backend(config.capture_config(), backend);
        capture.set_frame_handler(move |frame| {
            estimator.on_frame(frame);
        });
        let errors = Arc::clone(&last_error);
        capture.set_error_handler(move |e| *errors.lock() = Some(e.to_string()));

        let meter = Self {
            monitor: capture.monitor(),
            capture: Arc::new(Mutex::new(capture)),
            levels,
            last_reading: Arc::new(Mutex::new(None)),
            last_error,
            settings: Arc::new(Mutex::new(CaptureSettings::from_config(config))),
            reload: None,
            shutdown: Notify::new(),
        };

        Ok((meter, updates))
    }

    /// Re-read sample rate and source from `path` before every start
    ///
    /// `overrides` are applied on top of each read, so command-line choices
    /// keep winning over the file.
    pub fn with_reload(mut self, path: impl Into<PathBuf>, overrides: Overrides) -> Self {
        self.reload = Some(Reload {
            path: path.into(),
            overrides,
        });
        self
    }

    /// Settings for the next start: the file's, or the current ones when
    /// there is no file to read or it cannot be parsed
    fn next_settings(&self) -> CaptureSettings {
        let current = *self.settings.lock();
        let Some(reload) = &self.reload else {
            return current;
        };

        match MeterConfig::read(&reload.path) {
            Ok(mut config) => {
                reload.overrides.apply(&mut config);
                CaptureSettings::from_config(&config)
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Keeping previous capture settings");
                current
            }
        }
    }

    /// Open the input and start measuring; no-op if already running
    pub async fn start(&self) -> Result<()> {
        let capture = Arc::clone(&self.capture);
        let settings = Arc::clone(&self.settings);
        let next = self.next_settings();
        *self.last_error.lock() = None;
        tokio::task::spawn_blocking(move || {
            configure_and_start(&mut capture.lock(), next, &settings)
        })
        .await
            .context("Capture task panicked")??;
        Ok(())
    }

    /// Stop measuring; returns once the capture thread has exited
    pub async fn stop(&self) -> Result<()> {
        let capture = Arc::clone(&self.capture);
        tokio::task::spawn_blocking(move || capture.lock().stop())
            .await
            .context("Capture task panicked")??;
        Ok(())
    }

    pub async fn toggle(&self) -> Result<String> {
        let capture = Arc::clone(&self.capture);
        let settings = Arc::clone(&self.settings);
        let next = self.next_settings();
        let started = tokio::task::spawn_blocking(move || {
            let mut capture = capture.lock();
            if capture.is_active() {
                capture.stop().map(|_| false)
            } else {
                configure_and_start(&mut capture, next, &settings).map(|_| true)
            }
        })
        .await
        .context("Capture task panicked")??;

        if started {
            info!("Measuring");
            Ok("Capture started".to_string())
        } else {
            info!("Paused");
            Ok("Capture stopped".to_string())
        }
    }

    /// Shift the calibration by `delta_db`, returning the new offset
    pub fn adjust_gain(&self, delta_db: f64) -> f64 {
        self.levels.adjust_gain(delta_db)
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// True once a finite input ran out; stopping or pausing never sets it
    pub fn input_exhausted(&self) -> bool {
        self.monitor.is_exhausted()
    }

    pub fn status(&self) -> MeterStatus {
        let settings = *self.settings.lock();
        MeterStatus {
            state: if self.is_running() { "running" } else { "stopped" },
            input_exhausted: self.input_exhausted(),
            sample_rate: settings.sample_rate,
            audio_source: settings.audio_source,
            total_samples: self.monitor.total_samples_captured(),
            frames_displayed: self.levels.accepted_count(),
            collisions: self.levels.collision_count(),
            calibration_offset_db: self.levels.current_calibration_offset(),
            last_reading: *self.last_reading.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }

    /// Slot the display writes each shown reading into
    pub fn last_reading_slot(&self) -> Arc<Mutex<Option<LevelReading>>> {
        Arc::clone(&self.last_reading)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await
    }
}
