//! PCM input backends
//!
//! A backend opens a [`PcmSource`] for a [`CaptureConfig`]. Opening happens on
//! the capture thread itself, so a source never crosses threads and may wrap
//! handles that are not `Send` (cpal streams on some hosts).

pub mod cpal_device;
pub mod mock;
pub mod wav;

use crate::error::Result;
use crate::CaptureConfig;

/// Blocking source of mono 16-bit PCM
pub trait PcmSource {
    /// Block until `buf` is filled or the source can deliver no more for now.
    ///
    /// Returns the number of samples written, which may be short of
    /// `buf.len()`. `Ok(None)` means the source is exhausted.
    fn read(&mut self, buf: &mut [i16]) -> Result<Option<usize>>;

    /// Human-readable origin, for logs
    fn describe(&self) -> String;
}

/// Opens sources for the capture loop
pub trait PcmBackend: Send + Sync {
    /// Open and start the input
    ///
    /// A missing or unusable device is `DeviceUnavailable`; an input that
    /// exists but cannot serve the requested format (a file at another
    /// sample rate, say) is `InvalidConfig`.
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn PcmSource>>;
}
