//! Per-frame level estimation

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::calibration::Calibration;
use crate::display::Readout;
use crate::error::Result;
use crate::filter::{frame_rms, level_db, RmsSmoother};
use crate::sink::{Completion, DisplaySink};
use crate::LevelConfig;

/// One published level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelReading {
    /// Calibrated, smoothed level in dB
    pub raw_db: f64,
    /// Bar position; [0, 1] spans the bar, values outside are clamped by it
    pub display_value: f64,
}

impl LevelReading {
    /// Numeric display form of `raw_db`
    pub fn readout(&self) -> Readout {
        Readout::from_db(self.raw_db)
    }
}

/// What happened to a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Processed and handed to the sink
    Accepted(LevelReading),
    /// Skipped because the previous update was still being displayed
    Dropped { collisions: u64 },
}

impl FrameOutcome {
    pub fn reading(&self) -> Option<LevelReading> {
        match self {
            FrameOutcome::Accepted(reading) => Some(*reading),
            FrameOutcome::Dropped { .. } => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, FrameOutcome::Dropped { .. })
    }
}

/// Counters and calibration reachable from other threads
#[derive(Debug, Clone)]
pub struct EstimatorHandle {
    calibration: Calibration,
    collisions: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
}

impl EstimatorHandle {
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn adjust_gain(&self, delta_db: f64) -> f64 {
        self.calibration.adjust_gain(delta_db)
    }

    pub fn current_calibration_offset(&self) -> f64 {
        self.calibration.current_calibration_offset()
    }

    /// Frames dropped because the display was busy
    pub fn collision_count(&self) -> u64 {
        self.collisions.load(Ordering::Relaxed)
    }

    /// Frames turned into readings
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

/// Converts PCM frames into smoothed, calibrated readings
///
/// Owned by whoever calls [`on_frame`](Self::on_frame), normally the capture
/// thread. Only the gain is shared, through [`Calibration`].
pub struct LevelEstimator {
    config: LevelConfig,
    smoother: RmsSmoother,
    calibration: Calibration,
    sink: Arc<dyn DisplaySink>,
    in_flight: Arc<AtomicBool>,
    collisions: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
}

impl LevelEstimator {
    pub fn new<S: DisplaySink + 'static>(config: LevelConfig, sink: S) -> Result<Self> {
        Self::with_shared_sink(config, Arc::new(sink))
    }

    pub fn with_shared_sink(config: LevelConfig, sink: Arc<dyn DisplaySink>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            smoother: RmsSmoother::new(config.alpha),
            calibration: Calibration::new(config.nominal_gain()),
            sink,
            in_flight: Arc::new(AtomicBool::new(false)),
            collisions: Arc::new(AtomicU64::new(0)),
            accepted: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Process one frame
    ///
    /// If the previous reading is still being displayed the whole frame is
    /// skipped, filter state included, and the collision counter goes up.
    pub fn on_frame(&mut self, frame: &[i16]) -> FrameOutcome {
        let Some(completion) = Completion::acquire(&self.in_flight) else {
            let collisions = self.collisions.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                collisions,
                "Level display collision, update took longer than one frame"
            );
            return FrameOutcome::Dropped { collisions };
        };

        self.smoother.update(frame_rms(frame));
        let reading = self.current_reading();
        self.accepted.fetch_add(1, Ordering::Relaxed);

        self.sink.on_level_reading(reading, completion);
        FrameOutcome::Accepted(reading)
    }

    /// Reading for the current filter state and gain
    pub fn current_reading(&self) -> LevelReading {
        let raw_db = level_db(
            self.calibration.gain(),
            self.smoother.value(),
            self.config.rms_floor,
        );

        LevelReading {
            raw_db,
            display_value: (raw_db + self.config.offset_db) / self.config.span_db(),
        }
    }

    pub fn adjust_gain(&self, delta_db: f64) -> f64 {
        self.calibration.adjust_gain(delta_db)
    }

    pub fn current_calibration_offset(&self) -> f64 {
        self.calibration.current_calibration_offset()
    }

    /// Smoothed RMS (filter state)
    pub fn rms_smoothed(&self) -> f64 {
        self.smoother.value()
    }

    pub fn collision_count(&self) -> u64 {
        self.collisions.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration.clone()
    }

    pub fn handle(&self) -> EstimatorHandle {
        EstimatorHandle {
            calibration: self.calibration.clone(),
            collisions: Arc::clone(&self.collisions),
            accepted: Arc::clone(&self.accepted),
        }
    }

    /// Clear the filter state, e.g. between capture sessions
    pub fn reset(&mut self) {
        self.smoother.reset();
    }
}
