//! Level Meter Audio Capture
//!
//! Continuous microphone capture on a dedicated thread, delivering fixed-size
//! 20 ms frames of 16-bit mono PCM to a single registered frame handler.
//!
//! ## Architecture
//!
//! ```text
//! Audio Device (cpal callback)
//!   │  first channel → i16 → Resampler (rubato, only if device rate differs)
//!   │
//!   ├─> DeviceBuffer (ringbuf behind a mutex + condvar, ≥ 1 s)
//!   │
//!   └─> AudioCapture loop thread
//!         blocking read of sample_rate / 50 samples
//!         └─> frame handler (synchronous, on the capture thread)
//! ```
//!
//! Any [`PcmBackend`] can stand in for the device: [`WavBackend`] replays a file
//! at real-time cadence and [`MockBackend`] scripts frames for tests.

pub mod backend;
pub mod buffer;
pub mod capture;
pub mod error;
pub mod resampler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use backend::cpal_device::{list_devices, CpalBackend, DeviceInfo};
pub use backend::mock::{MockBackend, MockSignal};
pub use backend::wav::WavBackend;
pub use backend::{PcmBackend, PcmSource};
pub use buffer::DeviceBuffer;
pub use capture::{AudioCapture, CaptureMonitor, CaptureState, ErrorHandler};
pub use error::{AudioError, Result};
pub use resampler::Resampler;

/// Default capture rate (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Frames per second; one frame holds 20 ms of audio
pub const FRAMES_PER_SECOND: u32 = 50;

/// Capture is always mono
pub const CHANNELS: u16 = 1;

/// Number of samples in one nominal frame at `sample_rate`
pub fn frame_len(sample_rate: u32) -> usize {
    (sample_rate / FRAMES_PER_SECOND) as usize
}

/// Device-side buffer size in samples: at least one second of audio
pub fn device_buffer_size(sample_rate: u32, driver_minimum: Option<u32>) -> usize {
    driver_minimum.unwrap_or(0).max(sample_rate) as usize
}

/// Input tuning requested from the platform.
///
/// Desktop hosts have no equivalent of these presets, so backends treat them as
/// a hint; the integer codes match the values persisted by older installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "AudioSourceRepr")]
pub enum AudioSource {
    Default,
    Mic,
    Camcorder,
    #[default]
    VoiceRecognition,
    VoiceCommunication,
    Unprocessed,
}

impl AudioSource {
    pub const ALL: [AudioSource; 6] = [
        AudioSource::Default,
        AudioSource::Mic,
        AudioSource::Camcorder,
        AudioSource::VoiceRecognition,
        AudioSource::VoiceCommunication,
        AudioSource::Unprocessed,
    ];

    /// Persisted integer code
    pub fn code(self) -> i32 {
        match self {
            AudioSource::Default => 0,
            AudioSource::Mic => 1,
            AudioSource::Camcorder => 5,
            AudioSource::VoiceRecognition => 6,
            AudioSource::VoiceCommunication => 7,
            AudioSource::Unprocessed => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|source| source.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            AudioSource::Default => "default",
            AudioSource::Mic => "mic",
            AudioSource::Camcorder => "camcorder",
            AudioSource::VoiceRecognition => "voice_recognition",
            AudioSource::VoiceCommunication => "voice_communication",
            AudioSource::Unprocessed => "unprocessed",
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioSource {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i32>() {
            return Self::from_code(code)
                .ok_or_else(|| AudioError::invalid_config(format!("Unknown audio source code {}", code)));
        }

        let normalized = s.to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|source| source.name() == normalized)
            .ok_or_else(|| AudioError::invalid_config(format!("Unknown audio source '{}'", s)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AudioSourceRepr {
    Code(i32),
    Name(String),
}

impl TryFrom<AudioSourceRepr> for AudioSource {
    type Error = AudioError;

    fn try_from(repr: AudioSourceRepr) -> Result<Self> {
        match repr {
            AudioSourceRepr::Code(code) => AudioSource::from_code(code)
                .ok_or_else(|| AudioError::invalid_config(format!("Unknown audio source code {}", code))),
            AudioSourceRepr::Name(name) => name.parse(),
        }
    }
}

/// Capture configuration
///
/// Channel layout (mono) and sample format (16-bit signed PCM) are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture sample rate (default: 8000 Hz)
    pub sample_rate: u32,
    /// Input tuning preset (default: voice recognition)
    pub audio_source: AudioSource,
    /// Input device index (None = default device)
    pub device_index: Option<usize>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            audio_source: AudioSource::default(),
            device_index: None,
        }
    }
}

impl CaptureConfig {
    pub fn new(sample_rate: u32, audio_source: AudioSource) -> Self {
        Self {
            sample_rate,
            audio_source,
            ..Default::default()
        }
    }

    /// Samples per 20 ms frame
    pub fn frame_len(&self) -> usize {
        frame_len(self.sample_rate)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < FRAMES_PER_SECOND {
            return Err(AudioError::invalid_config(format!(
                "Sample rate {} Hz is too low for 20 ms frames",
                self.sample_rate
            )));
        }
        Ok(())
    }
}
