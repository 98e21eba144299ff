//! WAV file input, replayed as if it were a microphone

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use super::{PcmBackend, PcmSource};
use crate::error::{AudioError, Result};
use crate::CaptureConfig;

/// Replays a 16-bit PCM WAV file through the capture loop
///
/// Multichannel files contribute their first channel. With pacing enabled each
/// read is released on the wall-clock schedule a live device would follow.
#[derive(Debug, Clone)]
pub struct WavBackend {
    path: PathBuf,
    paced: bool,
}

impl WavBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            paced: true,
        }
    }

    /// Deliver samples as fast as the loop asks for them
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample rate declared in the file header
    pub fn sample_rate(&self) -> Result<u32> {
        Ok(hound::WavReader::open(&self.path)?.spec().sample_rate)
    }
}

impl PcmBackend for WavBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn PcmSource>> {
        let reader = hound::WavReader::open(&self.path).map_err(|e| {
            AudioError::device(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(AudioError::invalid_config(format!(
                "{} is not 16-bit PCM",
                self.path.display()
            )));
        }
        if spec.sample_rate != config.sample_rate {
            return Err(AudioError::invalid_config(format!(
                "{} is {} Hz but capture is configured for {} Hz",
                self.path.display(),
                spec.sample_rate,
                config.sample_rate
            )));
        }

        info!(
            path = %self.path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            paced = self.paced,
            "Opening WAV input"
        );

        Ok(Box::new(WavSource {
            samples: reader.into_samples::<i16>(),
            channels: spec.channels.max(1) as usize,
            sample_rate: spec.sample_rate,
            paced: self.paced,
            started: Instant::now(),
            delivered: 0,
            name: self.path.display().to_string(),
        }))
    }
}

struct WavSource {
    samples: hound::WavIntoSamples<BufReader<File>, i16>,
    channels: usize,
    sample_rate: u32,
    paced: bool,
    started: Instant,
    delivered: u64,
    name: String,
}

impl WavSource {
    fn next_frame_sample(&mut self) -> Result<Option<i16>> {
        let first = match self.samples.next() {
            Some(sample) => sample?,
            None => return Ok(None),
        };
        for _ in 1..self.channels {
            if let Some(sample) = self.samples.next() {
                sample?;
            }
        }
        Ok(Some(first))
    }

    fn wait_for_schedule(&self, upto: u64) {
        let due = Duration::from_secs_f64(upto as f64 / self.sample_rate as f64);
        let elapsed = self.started.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
    }
}

impl PcmSource for WavSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<Option<usize>> {
        let mut read = 0;
        while read < buf.len() {
            match self.next_frame_sample()? {
                Some(sample) => {
                    buf[read] = sample;
                    read += 1;
                }
                None => break,
            }
        }

        if read == 0 && !buf.is_empty() {
            return Ok(None);
        }

        self.delivered += read as u64;
        if self.paced {
            self.wait_for_schedule(self.delivered);
        }
        Ok(Some(read))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_reads_frames_then_short_read_then_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, 1, &vec![2500; 400]);

        let backend = WavBackend::new(&path).unpaced();
        assert_eq!(backend.sample_rate().unwrap(), 8000);
        let mut source = backend.open(&CaptureConfig::default()).unwrap();

        let mut frame = vec![0i16; 160];
        assert_eq!(source.read(&mut frame).unwrap(), Some(160));
        assert!(frame.iter().all(|&s| s == 2500));
        assert_eq!(source.read(&mut frame).unwrap(), Some(160));
        assert_eq!(source.read(&mut frame).unwrap(), Some(80));
        assert_eq!(source.read(&mut frame).unwrap(), None);
    }

    #[test]
    fn test_stereo_takes_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let interleaved: Vec<i16> = (0..320).map(|i| if i % 2 == 0 { 100 } else { -7 }).collect();
        write_wav(&path, 8000, 2, &interleaved);

        let mut source = WavBackend::new(&path)
            .unpaced()
            .open(&CaptureConfig::default())
            .unwrap();
        let mut frame = vec![0i16; 160];
        assert_eq!(source.read(&mut frame).unwrap(), Some(160));
        assert!(frame.iter().all(|&s| s == 100));
    }

    #[test]
    fn test_rate_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.wav");
        write_wav(&path, 16000, 1, &[0; 10]);

        let result = WavBackend::new(&path).open(&CaptureConfig::default());
        assert!(matches!(result, Err(AudioError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_is_device_unavailable() {
        let result = WavBackend::new("/nonexistent/levelmeter.wav").open(&CaptureConfig::default());
        assert!(matches!(result, Err(AudioError::DeviceUnavailable(_))));
    }
}
