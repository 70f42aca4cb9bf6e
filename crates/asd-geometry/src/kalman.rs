use crate::bbox::KfRect;
use serde::{Deserialize, Serialize};

/// Per-track motion filter over `[x, y, scale, aspect, vx, vy, scaleRate]`.
///
/// Aspect has no velocity term: faces don't change shape smoothly the way
/// they translate and grow, so the filter only tracks position and scale
/// velocity, same as the teacher's `FaceTrack` but trimmed to this state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanFilter {
    pub state: [f32; 7],
    /// Diagonal covariance approximation — no cross terms, matching the
    /// teacher's `FaceTrack` rather than a full matrix implementation.
    pub covariance: [f32; 7],
    valid: bool,
}

const IDX_X: usize = 0;
const IDX_Y: usize = 1;
const IDX_SCALE: usize = 2;
const IDX_ASPECT: usize = 3;
const IDX_VX: usize = 4;
const IDX_VY: usize = 5;
const IDX_VSCALE: usize = 6;

impl KalmanFilter {
    pub fn new(rect: KfRect, process_noise_pos: f32, process_noise_vel: f32) -> Self {
        let mut covariance = [process_noise_pos; 7];
        covariance[IDX_VX] = process_noise_vel;
        covariance[IDX_VY] = process_noise_vel;
        covariance[IDX_VSCALE] = process_noise_vel;

        Self {
            state: [
                rect.cx, rect.cy, rect.scale, rect.aspect, 0.0, 0.0, 0.0,
            ],
            covariance,
            valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn rect(&self) -> KfRect {
        KfRect::new(
            self.state[IDX_X],
            self.state[IDX_Y],
            self.state[IDX_SCALE],
            self.state[IDX_ASPECT],
        )
    }

    /// Step 1 of tracker control flow: advance position/scale by current
    /// velocity, clamp to the video bounds, and invalidate on a
    /// non-recoverable state (non-finite or collapsed scale/aspect).
    pub fn predict(&mut self, process_noise_pos: f32, process_noise_vel: f32, bounds_half_extent: (f32, f32)) {
        if !self.valid {
            return;
        }

        self.state[IDX_X] += self.state[IDX_VX];
        self.state[IDX_Y] += self.state[IDX_VY];
        self.state[IDX_SCALE] += self.state[IDX_VSCALE];

        for i in 0..7 {
            let q = if i == IDX_VX || i == IDX_VY || i == IDX_VSCALE {
                process_noise_vel
            } else {
                process_noise_pos
            };
            self.covariance[i] += q;
        }

        let (half_w, half_h) = bounds_half_extent;
        if self.state[IDX_X] < -half_w || self.state[IDX_X] > half_w {
            self.state[IDX_X] = self.state[IDX_X].clamp(-half_w, half_w);
            self.state[IDX_VX] = 0.0;
        }
        if self.state[IDX_Y] < -half_h || self.state[IDX_Y] > half_h {
            self.state[IDX_Y] = self.state[IDX_Y].clamp(-half_h, half_h);
            self.state[IDX_VY] = 0.0;
        }

        if !self.rect().is_finite() || self.state[IDX_SCALE] <= 0.0 || self.state[IDX_ASPECT] <= 0.0 {
            self.valid = false;
        }
    }

    /// Diagonal Kalman-gain update against a `[cx, cy, scale, aspect]`
    /// measurement. Velocity for x/y/scale is re-derived from the
    /// innovation; aspect has no velocity slot to feed.
    pub fn update(&mut self, measurement: KfRect, measurement_noise: f32) {
        if !self.valid {
            return;
        }

        let meas = [measurement.cx, measurement.cy, measurement.scale, measurement.aspect];
        for i in 0..4 {
            let p = self.covariance[i];
            let gain = p / (p + measurement_noise);
            let innovation = meas[i] - self.state[i];
            self.state[i] += gain * innovation;
            self.covariance[i] = (1.0 - gain) * p;

            if i == IDX_X {
                self.state[IDX_VX] += gain * innovation * 0.5;
            } else if i == IDX_Y {
                self.state[IDX_VY] += gain * innovation * 0.5;
            } else if i == IDX_SCALE {
                self.state[IDX_VSCALE] += gain * innovation * 0.5;
            }
        }

        if !self.rect().is_finite() || self.state[IDX_SCALE] <= 0.0 || self.state[IDX_ASPECT] <= 0.0 {
            self.valid = false;
        }
    }

    /// Velocity/growth damping applied on a miss, so an unmatched track
    /// coasts rather than keeps accelerating blind.
    pub fn dampen(&mut self, velocity_damping: f32, growth_damping: f32) {
        self.state[IDX_VX] *= velocity_damping;
        self.state[IDX_VY] *= velocity_damping;
        self.state[IDX_VSCALE] *= growth_damping;
    }

    pub fn velocity_direction(&self) -> Option<f32> {
        if self.state[IDX_VX].abs() < f32::EPSILON && self.state[IDX_VY].abs() < f32::EPSILON {
            None
        } else {
            Some(self.state[IDX_VY].atan2(self.state[IDX_VX]))
        }
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(cx: f32, cy: f32, scale: f32, aspect: f32) -> KfRect {
        KfRect::new(cx, cy, scale, aspect)
    }

    #[test]
    fn predict_advances_by_velocity() {
        let mut kf = KalmanFilter::new(rect(0.0, 0.0, 100.0, 1.0), 1.0, 1.0);
        kf.state[4] = 2.0;
        kf.state[5] = -1.0;
        kf.predict(1.0, 1.0, (1000.0, 1000.0));
        assert!((kf.state[0] - 2.0).abs() < 1e-6);
        assert!((kf.state[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn predict_clamps_position_and_zeroes_velocity() {
        let mut kf = KalmanFilter::new(rect(99.0, 0.0, 100.0, 1.0), 1.0, 1.0);
        kf.state[4] = 50.0;
        kf.predict(1.0, 1.0, (100.0, 100.0));
        assert_eq!(kf.state[0], 100.0);
        assert_eq!(kf.state[4], 0.0);
    }

    #[test]
    fn non_finite_scale_invalidates() {
        let mut kf = KalmanFilter::new(rect(0.0, 0.0, 100.0, 1.0), 1.0, 1.0);
        kf.state[2] = f32::NAN;
        kf.predict(1.0, 1.0, (1000.0, 1000.0));
        assert!(!kf.is_valid());
    }

    #[test]
    fn update_moves_state_toward_measurement() {
        let mut kf = KalmanFilter::new(rect(0.0, 0.0, 100.0, 1.0), 1.0, 1.0);
        kf.update(rect(10.0, 0.0, 100.0, 1.0), 0.5);
        assert!(kf.state[0] > 0.0 && kf.state[0] < 10.0);
    }

    #[test]
    fn dampen_reduces_velocity() {
        let mut kf = KalmanFilter::new(rect(0.0, 0.0, 100.0, 1.0), 1.0, 1.0);
        kf.state[4] = 10.0;
        kf.dampen(0.5, 0.9);
        assert!((kf.state[4] - 5.0).abs() < 1e-6);
    }
}
