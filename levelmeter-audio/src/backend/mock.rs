//! Mock input for testing without hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{PcmBackend, PcmSource};
use crate::error::{AudioError, Result};
use crate::CaptureConfig;

/// Waveform produced by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockSignal {
    Silence,
    /// Every sample equals the amplitude
    Constant(i16),
    Sine { amplitude: f64, frequency: f64 },
}

/// Scripted PCM backend
///
/// # Example
///
/// ```
/// use levelmeter_audio::{AudioCapture, CaptureConfig, MockBackend};
///
/// // Ten 20 ms frames of a constant 2500, then the source is exhausted
/// let backend = MockBackend::constant(2500).frames(10);
/// let mut capture = AudioCapture::with_backend(CaptureConfig::default(), backend);
/// capture.start()?;
/// capture.wait()?;
/// assert_eq!(capture.total_samples_captured(), 1600);
/// # Ok::<(), levelmeter_audio::AudioError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    signal: MockSignal,
    frame_limit: Option<usize>,
    short_reads: Vec<(usize, usize)>,
    fail_open: Option<String>,
    fail_after: Option<usize>,
    interval: Option<Duration>,
    opens: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(signal: MockSignal) -> Self {
        Self {
            signal,
            frame_limit: None,
            short_reads: Vec::new(),
            fail_open: None,
            fail_after: None,
            interval: None,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn silence() -> Self {
        Self::new(MockSignal::Silence)
    }

    pub fn constant(amplitude: i16) -> Self {
        Self::new(MockSignal::Constant(amplitude))
    }

    pub fn sine(amplitude: f64, frequency: f64) -> Self {
        Self::new(MockSignal::Sine {
            amplitude,
            frequency,
        })
    }

    /// Exhaust the source after `count` reads
    pub fn frames(mut self, count: usize) -> Self {
        self.frame_limit = Some(count);
        self
    }

    /// Make read number `index` (0-based) deliver only `len` samples
    pub fn short_read(mut self, index: usize, len: usize) -> Self {
        self.short_reads.push((index, len));
        self
    }

    /// Refuse to open
    pub fn fail_open<S: Into<String>>(mut self, message: S) -> Self {
        self.fail_open = Some(message.into());
        self
    }

    /// Fail with a stream error on read number `index`
    pub fn fail_after(mut self, index: usize) -> Self {
        self.fail_after = Some(index);
        self
    }

    /// Sleep between reads, standing in for the device cadence
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Number of times `open` has been called, across clones
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PcmBackend for MockBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn PcmSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_open {
            return Err(AudioError::device(message.clone()));
        }

        Ok(Box::new(MockSource {
            backend: self.clone(),
            sample_rate: config.sample_rate,
            reads: 0,
            position: 0,
        }))
    }
}

struct MockSource {
    backend: MockBackend,
    sample_rate: u32,
    reads: usize,
    position: u64,
}

impl MockSource {
    fn sample_at(&self, n: u64) -> i16 {
        match self.backend.signal {
            MockSignal::Silence => 0,
            MockSignal::Constant(amplitude) => amplitude,
            MockSignal::Sine {
                amplitude,
                frequency,
            } => {
                let t = n as f64 / self.sample_rate as f64;
                (amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()).round() as i16
            }
        }
    }
}

impl PcmSource for MockSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<Option<usize>> {
        let index = self.reads;
        if self.backend.frame_limit.is_some_and(|limit| index >= limit) {
            return Ok(None);
        }
        if self.backend.fail_after == Some(index) {
            return Err(AudioError::stream(format!("mock stream failed at read {}", index)));
        }
        if let Some(interval) = self.backend.interval {
            thread::sleep(interval);
        }

        let len = self
            .backend
            .short_reads
            .iter()
            .find(|(at, _)| *at == index)
            .map_or(buf.len(), |&(_, len)| len.min(buf.len()));

        for (offset, slot) in buf[..len].iter_mut().enumerate() {
            *slot = self.sample_at(self.position + offset as u64);
        }

        self.position += len as u64;
        self.reads += 1;
        Ok(Some(len))
    }

    fn describe(&self) -> String {
        format!("mock {:?}", self.backend.signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_frames_then_exhausted() {
        let mut source = MockBackend::constant(-300)
            .frames(2)
            .open(&CaptureConfig::default())
            .unwrap();
        let mut frame = vec![0i16; 160];

        assert_eq!(source.read(&mut frame).unwrap(), Some(160));
        assert!(frame.iter().all(|&s| s == -300));
        assert_eq!(source.read(&mut frame).unwrap(), Some(160));
        assert_eq!(source.read(&mut frame).unwrap(), None);
    }

    #[test]
    fn test_short_read_and_failure() {
        let mut source = MockBackend::silence()
            .short_read(1, 40)
            .fail_after(2)
            .open(&CaptureConfig::default())
            .unwrap();
        let mut frame = vec![1i16; 160];

        assert_eq!(source.read(&mut frame).unwrap(), Some(160));
        assert_eq!(source.read(&mut frame).unwrap(), Some(40));
        assert!(matches!(source.read(&mut frame), Err(AudioError::Stream(_))));
    }

    #[test]
    fn test_sine_peaks_at_amplitude() {
        let mut source = MockBackend::sine(1000.0, 100.0)
            .open(&CaptureConfig::default())
            .unwrap();
        let mut frame = vec![0i16; 160];
        source.read(&mut frame).unwrap();

        let peak = frame.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!((990..=1000).contains(&peak), "peak {}", peak);
    }

    #[test]
    fn test_sine_rms_over_whole_periods() {
        // 400 Hz at 8 kHz puts exactly 8 periods in one 20 ms frame
        let mut source = MockBackend::sine(1000.0, 400.0)
            .open(&CaptureConfig::default())
            .unwrap();
        let mut frame = vec![0i16; 160];
        source.read(&mut frame).unwrap();

        let rms = (frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / 160.0).sqrt();
        assert_relative_eq!(rms, 1000.0 / 2f64.sqrt(), max_relative = 1e-3);
    }

    #[test]
    fn test_fail_open_counts_attempts() {
        let backend = MockBackend::silence().fail_open("no mic");
        assert!(matches!(
            backend.open(&CaptureConfig::default()),
            Err(AudioError::DeviceUnavailable(_))
        ));
        assert_eq!(backend.opens(), 1);
    }
}
