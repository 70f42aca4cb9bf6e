use serde::{Deserialize, Serialize};

/// Scalar Kalman filter smoothing a track's running appearance cost, so a
/// single noisy embedding comparison doesn't swing the assignment cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnivariateKf {
    estimate: f32,
    variance: f32,
    process_variance: f32,
    measurement_variance: f32,
    initialized: bool,
}

impl UnivariateKf {
    pub fn new(process_variance: f32, measurement_variance: f32) -> Self {
        Self {
            estimate: 0.0,
            variance: 1.0,
            process_variance,
            measurement_variance,
            initialized: false,
        }
    }

    pub fn value(&self) -> f32 {
        self.estimate
    }

    pub fn observe(&mut self, measurement: f32) -> f32 {
        if !self.initialized {
            self.estimate = measurement;
            self.initialized = true;
            return self.estimate;
        }

        self.variance += self.process_variance;
        let gain = self.variance / (self.variance + self.measurement_variance);
        self.estimate += gain * (measurement - self.estimate);
        self.variance *= 1.0 - gain;
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_sets_estimate_directly() {
        let mut kf = UnivariateKf::new(0.05, 0.02);
        assert_eq!(kf.observe(0.4), 0.4);
    }

    #[test]
    fn converges_toward_repeated_measurement() {
        let mut kf = UnivariateKf::new(0.05, 0.02);
        kf.observe(0.0);
        for _ in 0..20 {
            kf.observe(1.0);
        }
        assert!(kf.value() > 0.9);
    }

    #[test]
    fn smooths_a_single_outlier() {
        let mut kf = UnivariateKf::new(0.01, 0.05);
        for _ in 0..10 {
            kf.observe(0.2);
        }
        let before = kf.value();
        kf.observe(0.9);
        assert!(kf.value() - before < 0.5);
    }
}
