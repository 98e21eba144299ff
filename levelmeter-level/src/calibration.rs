//! Gain calibration shared between the capture thread and control surfaces

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct CalibrationState {
    gain: f64,
    difference_from_nominal_db: f64,
}

/// Cloneable handle on the estimator's gain
///
/// Every clone refers to the same state. Reads and adjustments are serialized
/// by a lock, so the capture thread never sees a torn gain.
#[derive(Debug, Clone)]
pub struct Calibration {
    nominal_gain: f64,
    state: Arc<Mutex<CalibrationState>>,
}

impl Calibration {
    pub fn new(nominal_gain: f64) -> Self {
        Self {
            nominal_gain,
            state: Arc::new(Mutex::new(CalibrationState {
                gain: nominal_gain,
                difference_from_nominal_db: 0.0,
            })),
        }
    }

    /// Raise (positive) or lower (negative) the reading by `delta_db`
    ///
    /// The gain is multiplied by `10^(delta_db / 20)` and the offset from the
    /// nominal calibration moves the opposite way. Returns the offset as left
    /// by this adjustment.
    pub fn adjust_gain(&self, delta_db: f64) -> f64 {
        let offset = {
            let mut state = self.state.lock();
            state.gain *= 10f64.powf(delta_db / 20.0);
            state.difference_from_nominal_db -= delta_db;
            state.difference_from_nominal_db
        };
        info!(delta_db, offset_db = offset, "Gain adjusted");
        offset
    }

    /// Difference from the nominal calibration, in dB
    pub fn current_calibration_offset(&self) -> f64 {
        self.state.lock().difference_from_nominal_db
    }

    pub fn gain(&self) -> f64 {
        self.state.lock().gain
    }

    pub fn nominal_gain(&self) -> f64 {
        self.nominal_gain
    }

    /// Return to the nominal calibration
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.gain = self.nominal_gain;
        state.difference_from_nominal_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::thread;

    #[test]
    fn test_adjust_gain_tracks_offset() {
        let calibration = Calibration::new(1.0);
        assert_relative_eq!(calibration.adjust_gain(6.0), -6.0);

        assert_relative_eq!(calibration.gain(), 10f64.powf(0.3), epsilon = 1e-12);
        assert_relative_eq!(calibration.current_calibration_offset(), -6.0);
    }

    #[test]
    fn test_adjust_gain_round_trip() {
        let calibration = Calibration::new(12.649);
        for delta in [1.0, 5.0, -5.0, 0.25, 17.5] {
            let gain = calibration.gain();
            let offset = calibration.current_calibration_offset();

            calibration.adjust_gain(delta);
            calibration.adjust_gain(-delta);

            assert_relative_eq!(calibration.gain(), gain, max_relative = 1e-12);
            assert_relative_eq!(calibration.current_calibration_offset(), offset, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_concurrent_adjustments_each_see_their_own_offset() {
        let calibration = Calibration::new(1.0);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let calibration = calibration.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|_| calibration.adjust_gain(1.0))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut offsets: Vec<i64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .map(|offset| offset.round() as i64)
            .collect();
        offsets.sort_unstable();

        let expected: Vec<i64> = (-200..=-1).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_clones_share_state() {
        let calibration = Calibration::new(2.0);
        let remote = calibration.clone();

        thread::spawn(move || remote.adjust_gain(-1.0)).join().unwrap();
        assert_relative_eq!(calibration.current_calibration_offset(), 1.0);

        calibration.reset();
        assert_relative_eq!(calibration.gain(), 2.0);
        assert_relative_eq!(calibration.current_calibration_offset(), 0.0);
    }
}
