//! Sound level estimation for 20 ms PCM frames
//!
//! Turns raw 16-bit frames into a temporally smoothed, calibrated decibel
//! level and publishes it to a display sink that may run on another thread.
//!
//! # Pipeline
//!
//! ```text
//! frame ─> RMS ─> IIR smoothing (alpha) ─> 20·log10(gain · rms) ─> LevelReading
//!                                                                      │
//!                              in-flight guard (drop if busy) <────────┘
//!                                                                      │
//!                                                               DisplaySink
//! ```
//!
//! # Example
//!
//! ```
//! use levelmeter_level::{LevelConfig, LevelEstimator, LevelReading, Completion};
//!
//! let sink = |reading: LevelReading, done: Completion| {
//!     println!("{:.1} dB", reading.raw_db);
//!     done.complete();
//! };
//! let mut estimator = LevelEstimator::new(LevelConfig::default(), sink)?;
//!
//! let frame = vec![2500i16; 160];
//! let outcome = estimator.on_frame(&frame);
//! assert!(outcome.reading().is_some());
//! # Ok::<(), levelmeter_level::LevelError>(())
//! ```

mod calibration;
mod display;
mod error;
mod estimator;
mod filter;
mod sink;

pub use calibration::Calibration;
pub use display::{BarGraph, Readout, SegmentZone};
pub use error::{LevelError, Result};
pub use estimator::{EstimatorHandle, FrameOutcome, LevelEstimator, LevelReading};
pub use filter::{frame_rms, level_db, RmsSmoother};
pub use sink::{ChannelSink, Completion, DisplaySink, DisplayUpdate};

/// Reference sound pressure level used for calibration (dB SPL at 1 kHz)
pub const REFERENCE_SPL_DB: f64 = 90.0;

/// Frame RMS of 16-bit samples expected at the reference level
pub const REFERENCE_RMS: f64 = 2500.0;

/// Lowest smoothed RMS fed into the logarithm; silence reads as about -18 dB
pub const RMS_FLOOR: f64 = 0.01;

/// Level estimator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LevelConfig {
    /// IIR smoothing coefficient, exclusive range (0, 1) (default: 0.9)
    /// Time constant is roughly 20 ms / (1 - alpha)
    pub alpha: f64,

    /// Calibration reference level in dB SPL (default: 90.0)
    pub reference_db: f64,

    /// RMS that corresponds to `reference_db` (default: 2500.0)
    pub reference_rms: f64,

    /// Added to the level before normalizing for the bar (default: 10.0)
    pub offset_db: f64,

    /// Number of bar segments (default: 10)
    pub segments: usize,

    /// dB covered by each segment (default: 6.0)
    pub db_per_segment: f64,

    /// Floor applied to the smoothed RMS before taking the log
    pub rms_floor: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            reference_db: REFERENCE_SPL_DB,
            reference_rms: REFERENCE_RMS,
            offset_db: 10.0,
            segments: 10,
            db_per_segment: 6.0,
            rms_floor: RMS_FLOOR,
        }
    }
}

impl LevelConfig {
    /// Set smoothing coefficient
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set bar offset
    pub fn offset(mut self, offset_db: f64) -> Self {
        self.offset_db = offset_db;
        self
    }

    /// Set bar geometry
    pub fn bar(mut self, segments: usize, db_per_segment: f64) -> Self {
        self.segments = segments;
        self.db_per_segment = db_per_segment;
        self
    }

    /// Gain that maps `reference_rms` to `reference_db`
    pub fn nominal_gain(&self) -> f64 {
        10f64.powf(self.reference_db / 20.0) / self.reference_rms
    }

    /// Total dB range represented by the bar (60 dB by default)
    pub fn span_db(&self) -> f64 {
        self.segments as f64 * self.db_per_segment
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(LevelError::config("alpha must be strictly between 0.0 and 1.0"));
        }

        if !(self.reference_rms > 0.0) || !self.reference_db.is_finite() {
            return Err(LevelError::config("reference level must be positive and finite"));
        }

        if self.segments == 0 || !(self.db_per_segment > 0.0) {
            return Err(LevelError::config("bar must have at least one segment of positive width"));
        }

        if !(self.rms_floor > 0.0) {
            return Err(LevelError::config("rms_floor must be positive"));
        }

        Ok(())
    }
}
