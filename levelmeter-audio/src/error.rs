//! Error types for audio capture

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resampling error: {0}")]
    Resample(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Self::Stream(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for failures that happen before the capture loop produced anything
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}
