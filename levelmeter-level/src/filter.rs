//! Frame RMS and first-order smoothing

/// Root-mean-square of a frame, on raw signed samples (no DC removal)
///
/// An empty frame has an RMS of zero.
pub fn frame_rms(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / frame.len() as f64).sqrt()
}

/// `20·log10(gain · rms)` with `rms` held at or above `floor`
pub fn level_db(gain: f64, rms: f64, floor: f64) -> f64 {
    20.0 * (gain * rms.max(floor)).log10()
}

/// First-order IIR low-pass over successive frame RMS values
///
/// `smoothed = smoothed·alpha + rms·(1 - alpha)`. Each output is a convex
/// combination of the previous output and the new input, so it never leaves
/// the range spanned by the two and stays non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct RmsSmoother {
    alpha: f64,
    smoothed: f64,
}

impl RmsSmoother {
    /// Filter starting from zero
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            smoothed: 0.0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current smoothed RMS
    pub fn value(&self) -> f64 {
        self.smoothed
    }

    /// Feed one frame RMS, returning the new smoothed value
    pub fn update(&mut self, rms: f64) -> f64 {
        self.smoothed = self.smoothed * self.alpha + rms * (1.0 - self.alpha);
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rms_of_constant_frame() {
        assert_relative_eq!(frame_rms(&[2500; 160]), 2500.0);
        assert_relative_eq!(frame_rms(&[-2500; 160]), 2500.0);
    }

    #[test]
    fn test_rms_keeps_dc() {
        // 1000 DC plus a ±1000 square wave
        let frame: Vec<i16> = (0..160).map(|i| if i % 2 == 0 { 2000 } else { 0 }).collect();
        assert_relative_eq!(frame_rms(&frame), 2000.0 / 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_rms_of_silence_and_empty() {
        assert_eq!(frame_rms(&[0; 160]), 0.0);
        assert_eq!(frame_rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_does_not_overflow_at_full_scale() {
        assert_relative_eq!(frame_rms(&[i16::MIN; 882]), 32768.0);
    }

    #[test]
    fn test_level_db_floor_keeps_silence_finite() {
        let db = level_db(1.0, 0.0, 0.01);
        assert!(db.is_finite());
        assert_relative_eq!(db, -40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_smoother_step_response() {
        let mut smoother = RmsSmoother::new(0.9);
        assert_relative_eq!(smoother.update(100.0), 10.0, epsilon = 1e-12);
        assert_relative_eq!(smoother.update(100.0), 19.0, epsilon = 1e-12);
    }

    #[test]
    fn test_smoother_stays_between_previous_and_input() {
        let inputs = [0.0, 3000.0, 12.5, 12.5, 32768.0, 0.0, 1.0, 400.0, 0.0, 0.0];
        for alpha in [0.01, 0.3, 0.5, 0.9, 0.99] {
            let mut smoother = RmsSmoother::new(alpha);
            for &rms in &inputs {
                let previous = smoother.value();
                let next = smoother.update(rms);
                let (lo, hi) = (previous.min(rms), previous.max(rms));
                assert!(
                    next >= lo - 1e-9 && next <= hi + 1e-9,
                    "alpha {} moved {} -> {} outside [{}, {}]",
                    alpha,
                    previous,
                    next,
                    lo,
                    hi
                );
                assert!(next >= 0.0);
            }
        }
    }

    #[test]
    fn test_smoother_converges_to_constant_input() {
        let mut smoother = RmsSmoother::new(0.9);
        for _ in 0..400 {
            smoother.update(2500.0);
        }
        assert_relative_eq!(smoother.value(), 2500.0, epsilon = 1e-6);
    }
}
