//! Microphone input through cpal

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::{PcmBackend, PcmSource};
use crate::buffer::DeviceBuffer;
use crate::error::{AudioError, Result};
use crate::resampler::{f32_to_i16, Resampler};
use crate::{device_buffer_size, CaptureConfig};

/// How long a read may wait without receiving a single sample
const STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// List all input devices on the default host
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Unknown Device {}", index));
            let (max_input_channels, default_sample_rate) = device
                .default_input_config()
                .map(|c| (c.channels(), c.sample_rate().0))
                .unwrap_or((0, 0));

            DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_input_channels,
                default_sample_rate,
            }
        })
        .collect())
}

/// Default-host microphone backend
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    fn select_device(&self, device_index: Option<usize>) -> Result<Device> {
        let host = cpal::default_host();
        match device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
                .nth(index)
                .ok_or_else(|| AudioError::device(format!("Device index {} not found", index))),
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::device("No default input device found")),
        }
    }
}

/// Stream parameters chosen for a device
struct StreamPlan {
    config: StreamConfig,
    format: SampleFormat,
    driver_minimum: Option<u32>,
}

/// Prefer opening the device at the capture rate; otherwise use its default
/// rate and resample.
fn plan_stream(device: &Device, sample_rate: u32) -> Result<StreamPlan> {
    let default = device
        .default_input_config()
        .map_err(|e| AudioError::device(format!("Failed to get device config: {}", e)))?;

    let native = device.supported_input_configs().ok().and_then(|mut ranges| {
        ranges.find(|range| {
            range.sample_format() == default.sample_format()
                && range.min_sample_rate().0 <= sample_rate
                && sample_rate <= range.max_sample_rate().0
        })
    });

    let chosen = match native {
        Some(range) => range.with_sample_rate(cpal::SampleRate(sample_rate)),
        None => default,
    };

    let driver_minimum = match chosen.buffer_size() {
        cpal::SupportedBufferSize::Range { min, .. } => Some(*min),
        cpal::SupportedBufferSize::Unknown => None,
    };

    Ok(StreamPlan {
        format: chosen.sample_format(),
        config: chosen.config(),
        driver_minimum,
    })
}

impl PcmBackend for CpalBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn PcmSource>> {
        let device = self.select_device(config.device_index)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let plan = plan_stream(&device, config.sample_rate)?;

        let device_rate = plan.config.sample_rate.0;
        let capacity = device_buffer_size(config.sample_rate, plan.driver_minimum);
        let shared = Arc::new(SharedInput::new(capacity));
        let resampler = Resampler::new(device_rate, config.sample_rate).map_err(|e| {
            AudioError::device(format!(
                "Cannot convert {} Hz input to {} Hz: {}",
                device_rate, config.sample_rate, e
            ))
        })?;

        info!(
            device = %device_name,
            source = %config.audio_source,
            device_rate,
            capture_rate = config.sample_rate,
            channels = plan.config.channels,
            buffer_samples = capacity,
            "Opening input device"
        );

        let stream = match plan.format {
            SampleFormat::F32 => build_stream::<f32>(&device, &plan.config, &shared, resampler),
            SampleFormat::I16 => build_stream::<i16>(&device, &plan.config, &shared, resampler),
            SampleFormat::U16 => build_stream::<u16>(&device, &plan.config, &shared, resampler),
            SampleFormat::I32 => build_stream::<i32>(&device, &plan.config, &shared, resampler),
            other => Err(AudioError::device(format!("Unsupported sample format {:?}", other))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::device(format!("Failed to start stream: {}", e)))?;

        Ok(Box::new(CpalSource {
            _stream: stream,
            shared,
            device_name,
            reported_overflow: 0,
        }))
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    shared: &Arc<SharedInput>,
    mut resampler: Resampler,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let data_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Left channel only; averaging would halve a one-sided mic
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| f32::from_sample(frame[0]))
                    .collect();

                match resampler.process(&mono) {
                    Ok(audio) => data_shared.push(&f32_to_i16(&audio)),
                    Err(e) => data_shared.fail(e.to_string()),
                }
            },
            move |err| {
                error_shared.fail(format!("Audio stream error: {}", err));
            },
            None,
        )
        .map_err(|e| AudioError::device(format!("Failed to build stream: {}", e)))
}

/// State shared between the cpal callback and the reading side
struct SharedInput {
    buffer: Mutex<DeviceBuffer>,
    ready: Condvar,
    error: Mutex<Option<String>>,
    overflowed: AtomicUsize,
}

impl SharedInput {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(DeviceBuffer::new(capacity)),
            ready: Condvar::new(),
            error: Mutex::new(None),
            overflowed: AtomicUsize::new(0),
        }
    }

    fn push(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        let written = self.buffer.lock().write(samples);
        if written < samples.len() {
            self.overflowed
                .fetch_add(samples.len() - written, Ordering::Relaxed);
        }
        self.ready.notify_one();
    }

    fn fail(&self, message: String) {
        let _guard = self.buffer.lock();
        *self.error.lock() = Some(message);
        self.ready.notify_one();
    }
}

/// Open microphone stream; dropping it stops the device
struct CpalSource {
    _stream: Stream,
    shared: Arc<SharedInput>,
    device_name: String,
    reported_overflow: usize,
}

impl PcmSource for CpalSource {
    fn read(&mut self, out: &mut [i16]) -> Result<Option<usize>> {
        let deadline = Instant::now() + STALL_TIMEOUT;

        let read = {
            let mut buffer = self.shared.buffer.lock();
            loop {
                if let Some(message) = self.shared.error.lock().take() {
                    return Err(AudioError::stream(message));
                }
                if buffer.available() >= out.len() {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.shared.ready.wait_for(&mut buffer, deadline - now);
            }
            buffer.read(out)
        };

        let overflowed = self.shared.overflowed.load(Ordering::Relaxed);
        if overflowed > self.reported_overflow {
            warn!(
                dropped = overflowed - self.reported_overflow,
                "Device buffer overflow, capture loop is falling behind"
            );
            self.reported_overflow = overflowed;
        }

        if read == 0 && !out.is_empty() {
            return Err(AudioError::stream(format!(
                "No audio from {} for {:?}",
                self.device_name, STALL_TIMEOUT
            )));
        }
        if read < out.len() {
            debug!(read, wanted = out.len(), "Short read from device");
        }

        Ok(Some(read))
    }

    fn describe(&self) -> String {
        self.device_name.clone()
    }
}
