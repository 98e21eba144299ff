//! Capture loop on a dedicated thread
//!
//! The loop reads exactly one 20 ms frame per iteration from the input and
//! hands it synchronously to the registered frame handler. There is no queue
//! in between, so a slow handler throttles capture directly; the device-side
//! buffer absorbs the backlog.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::backend::cpal_device::CpalBackend;
use crate::backend::{PcmBackend, PcmSource};
use crate::error::{AudioError, Result};
use crate::{AudioSource, CaptureConfig};

/// Receives each captured frame, on the capture thread
pub type FrameHandler = Box<dyn FnMut(&[i16]) + Send>;

/// Called on the capture thread when the loop ends with an error
pub type ErrorHandler = Arc<dyn Fn(&AudioError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    Running,
}

/// Thread-safe view of a capture's progress
#[derive(Clone)]
pub struct CaptureMonitor {
    is_running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    total_samples: Arc<AtomicU64>,
}

impl CaptureMonitor {
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// True once the input reported end of data; a stop request never sets it
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    pub fn total_samples_captured(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }
}

/// Microphone capture driving a single frame handler
pub struct AudioCapture {
    config: CaptureConfig,
    backend: Arc<dyn PcmBackend>,
    handler: Arc<Mutex<Option<FrameHandler>>>,
    error_handler: Option<ErrorHandler>,
    is_running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    total_samples: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl AudioCapture {
    /// Capture from the default host's microphone
    pub fn new(config: CaptureConfig) -> Self {
        Self::with_backend(config, CpalBackend::new())
    }

    /// Capture from any PCM backend
    pub fn with_backend<B: PcmBackend + 'static>(config: CaptureConfig, backend: B) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
            handler: Arc::new(Mutex::new(None)),
            error_handler: None,
            is_running: Arc::new(AtomicBool::new(false)),
            exhausted: Arc::new(AtomicBool::new(false)),
            total_samples: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Set sample rate and source for the next `start()`
    pub fn configure(&mut self, sample_rate: u32, audio_source: AudioSource) -> Result<()> {
        let config = CaptureConfig {
            sample_rate,
            audio_source,
            ..self.config.clone()
        };
        self.set_config(config)
    }

    /// Replace the whole configuration; rejected while running
    pub fn set_config(&mut self, config: CaptureConfig) -> Result<()> {
        if self.is_active() {
            return Err(AudioError::invalid_state(
                "Cannot change configuration while capture is running",
            ));
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Register the frame handler, replacing any previous one
    pub fn set_frame_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&[i16]) + Send + 'static,
    {
        *self.handler.lock() = Some(Box::new(handler));
    }

    /// Register a callback for capture-loop failures
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&AudioError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
    }

    /// Open the input and start the capture thread
    ///
    /// No-op if already running. Open failures are returned as the backend
    /// reported them; the loop is not started and nothing is retried.
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            debug!("Capture already running");
            return Ok(());
        }

        self.config.validate()?;
        self.reap_finished_thread();
        self.total_samples.store(0, Ordering::Relaxed);
        self.exhausted.store(false, Ordering::Release);
        self.is_running.store(true, Ordering::Release);

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let capture_loop = CaptureLoop {
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
            handler: Arc::clone(&self.handler),
            error_handler: self.error_handler.clone(),
            is_running: Arc::clone(&self.is_running),
            exhausted: Arc::clone(&self.exhausted),
            total_samples: Arc::clone(&self.total_samples),
        };

        let handle = thread::Builder::new()
            .name("levelmeter-capture".to_string())
            .spawn(move || capture_loop.run(ready_tx))
            .map_err(|e| {
                self.is_running.store(false, Ordering::Release);
                AudioError::device(format!("Failed to spawn capture thread: {}", e))
            })?;

        match ready_rx.recv() {
            Ok(Ok(input)) => {
                info!(
                    input = %input,
                    sample_rate = self.config.sample_rate,
                    source = %self.config.audio_source,
                    frame_len = self.config.frame_len(),
                    "Audio capture started"
                );
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.is_running.store(false, Ordering::Release);
                error!(error = %e, "Failed to open audio input");
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.is_running.store(false, Ordering::Release);
                Err(AudioError::device("Capture thread exited before opening the input"))
            }
        }
    }

    /// Signal the loop to exit and join the capture thread
    ///
    /// Once this returns the frame handler will not be called again. No-op if
    /// not running.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        if self.is_running.swap(false, Ordering::AcqRel) {
            debug!("Stopping audio capture");
        }

        let result = handle
            .join()
            .map_err(|_| AudioError::stream("Capture thread panicked"));

        let total = self.total_samples_captured();
        info!(
            samples = total,
            seconds = total as f64 / self.config.sample_rate as f64,
            "Audio capture stopped"
        );
        result
    }

    /// Block until the loop ends on its own (input exhausted or failed)
    ///
    /// Does not signal the loop; on a live microphone this waits until the
    /// device fails.
    pub fn wait(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| AudioError::stream("Capture thread panicked")),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> CaptureState {
        if self.is_active() {
            CaptureState::Running
        } else {
            CaptureState::Stopped
        }
    }

    /// Check if the capture loop is running
    pub fn is_active(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Whether the last run ended because the input ran out of data
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// Samples read since the last `start()`
    pub fn total_samples_captured(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> CaptureMonitor {
        CaptureMonitor {
            is_running: Arc::clone(&self.is_running),
            exhausted: Arc::clone(&self.exhausted),
            total_samples: Arc::clone(&self.total_samples),
        }
    }

    /// Join a thread whose loop already ended by itself
    fn reap_finished_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Previous capture thread panicked");
            }
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Clears the running flag however the loop exits, panics included
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything the capture thread owns
struct CaptureLoop {
    config: CaptureConfig,
    backend: Arc<dyn PcmBackend>,
    handler: Arc<Mutex<Option<FrameHandler>>>,
    error_handler: Option<ErrorHandler>,
    is_running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    total_samples: Arc<AtomicU64>,
}

impl CaptureLoop {
    fn run(self, ready: mpsc::SyncSender<Result<String>>) {
        let _running = RunningGuard(Arc::clone(&self.is_running));

        let mut source = match self.backend.open(&self.config) {
            Ok(source) => source,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(source.describe()));

        let outcome = self.capture_frames(source.as_mut());

        // Release the device before anyone observes the loop as finished
        drop(source);

        match outcome {
            Ok(()) => debug!("Capture loop exited"),
            Err(e) => {
                error!(error = %e, "Capture loop failed");
                if let Some(handler) = &self.error_handler {
                    handler(&e);
                }
            }
        }
    }

    fn capture_frames(&self, source: &mut dyn PcmSource) -> Result<()> {
        let mut frame = vec![0i16; self.config.frame_len()];

        while self.is_running.load(Ordering::Acquire) {
            let Some(read) = source.read(&mut frame)? else {
                info!("Audio input exhausted");
                self.exhausted.store(true, Ordering::Release);
                break;
            };
            self.total_samples.fetch_add(read as u64, Ordering::Relaxed);

            if let Some(handler) = self.handler.lock().as_mut() {
                handler(&frame[..read]);
            }
        }

        Ok(())
    }
}
