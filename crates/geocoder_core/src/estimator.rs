use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Highest value the estimator will ever report on its own.
pub const ESTIMATE_CEILING: f64 = 99.0;

/// `(upper bound of the band, exclusive max step)`, checked in order.
const BANDS: [(f64, f64); 4] = [(30.0, 8.0), (60.0, 5.0), (85.0, 2.0), (95.0, 0.5)];
const TAIL_STEP: f64 = 0.1;

/// Fabricates decelerating progress while a one-shot request is in flight.
///
/// Only the real completion signal may move progress to 100.
#[derive(Debug)]
pub struct ProgressEstimator<R = StdRng> {
    rng: R,
}

impl ProgressEstimator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for ProgressEstimator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ProgressEstimator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn tick(&mut self, current: f64) -> f64 {
        if current.is_nan() || current < 0.0 {
            return self.tick(0.0);
        }
        if current >= ESTIMATE_CEILING {
            return current;
        }
        let max_step = max_step_for(current);
        let step = self.rng.gen_range(0.0..max_step);
        (current + step).min(ESTIMATE_CEILING)
    }
}

pub(crate) fn max_step_for(current: f64) -> f64 {
    BANDS
        .iter()
        .find(|(upper, _)| current < *upper)
        .map(|(_, step)| *step)
        .unwrap_or(TAIL_STEP)
}
