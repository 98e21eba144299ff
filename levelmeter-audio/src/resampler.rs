//! Audio resampling with rubato
//!
//! Converts mono device audio to the configured capture rate when the device
//! cannot open at that rate directly (most desktop devices refuse 8 kHz).

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::error::{AudioError, Result};

/// Streaming mono resampler
///
/// Input arrives in arbitrary callback-sized pieces; it is accumulated into
/// 100 ms chunks at the source rate, which is what the fixed-input sinc
/// resampler consumes.
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    pending: Vec<f32>,
    resampler: Option<SincFixedIn<f32>>,
}

impl Resampler {
    /// Create new resampler
    ///
    /// # Arguments
    ///
    /// * `source_rate` - Device sample rate (e.g., 48000)
    /// * `target_rate` - Capture sample rate (typically 8000)
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        // If rates are the same, no resampling needed
        let resampler = if source_rate != target_rate {
            Some(Self::create_resampler(source_rate, target_rate)?)
        } else {
            None
        };

        Ok(Self {
            source_rate,
            target_rate,
            pending: Vec::new(),
            resampler,
        })
    }

    fn create_resampler(source_rate: u32, target_rate: u32) -> Result<SincFixedIn<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        SincFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0, // max_resample_ratio_relative
            params,
            Self::chunk_size(source_rate),
            1,
        )
        .map_err(|e| AudioError::Resample(format!("Failed to create resampler: {:?}", e)))
    }

    /// Source samples consumed per resampler pass (100 ms)
    fn chunk_size(source_rate: u32) -> usize {
        (source_rate as usize / 10).max(1)
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Feed device samples; returns whatever complete chunks produced
    ///
    /// May return an empty Vec while a chunk is still being accumulated.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let planar_input = vec![self.pending.drain(..needed).collect::<Vec<f32>>()];
            let mut planar_output = resampler
                .process(&planar_input, None)
                .map_err(|e| AudioError::Resample(format!("Resampling failed: {:?}", e)))?;

            if let Some(channel) = planar_output.pop() {
                output.extend_from_slice(&channel);
            }
        }

        Ok(output)
    }

    /// Drop accumulated input (stream restart)
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    /// Approximate output length for given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        if self.resampler.is_none() {
            return input_len;
        }
        (input_len as f64 * self.target_rate as f64 / self.source_rate as f64) as usize
    }
}

/// Convert normalized float samples to 16-bit PCM
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect()
}
