use crate::bbox::{KfRect, NormalizedRect};

/// Camera orientation in degrees, clockwise, matching the four values a
/// mobile camera sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    pub fn from_degrees(angle: i32) -> Option<Self> {
        match angle.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }
}

/// Converts between image-normalized `[0,1]` rects and the centered,
/// pixel-space, rotation-normalized coordinates the Kalman filter tracks
/// in. Every cross-boundary conversion in the tracker goes through this
/// type so no caller has to reason about orientation/mirroring directly.
#[derive(Debug, Clone, Copy)]
pub struct CameraCoordinateTransformer {
    frame_width: f32,
    frame_height: f32,
    orientation: Orientation,
    mirrored: bool,
}

impl CameraCoordinateTransformer {
    pub fn new(frame_width: f32, frame_height: f32, orientation: Orientation, mirrored: bool) -> Self {
        Self {
            frame_width,
            frame_height,
            orientation,
            mirrored,
        }
    }

    /// Half-extent of the KF coordinate plane, used by the filter to
    /// clamp predicted positions to video bounds.
    pub fn bounds_half_extent(&self) -> (f32, f32) {
        match self.orientation {
            Orientation::Deg0 | Orientation::Deg180 => {
                (self.frame_width / 2.0, self.frame_height / 2.0)
            }
            Orientation::Deg90 | Orientation::Deg270 => {
                (self.frame_height / 2.0, self.frame_width / 2.0)
            }
        }
    }

    /// Image-normalized `[0,1]` rect → KF coordinates.
    pub fn to_kf(&self, rect: NormalizedRect) -> KfRect {
        let rect = if self.mirrored { rect.mirrored() } else { rect };

        // Pixel-space center, relative to the unrotated frame.
        let px_cx = rect.cx() * self.frame_width;
        let px_cy = rect.cy() * self.frame_height;
        let px_w = rect.width * self.frame_width;
        let px_h = rect.height * self.frame_height;

        let cx = px_cx - self.frame_width / 2.0;
        let cy = px_cy - self.frame_height / 2.0;

        let (rcx, rcy, rw, rh) = self.rotate_forward(cx, cy, px_w, px_h);

        let scale = rw.max(0.0) * rh.max(0.0);
        let aspect = if rh > 0.0 { rw / rh } else { 0.0 };

        KfRect::new(rcx, rcy, scale, aspect)
    }

    /// KF coordinates → image-normalized `[0,1]` rect (the inverse of
    /// `to_kf`, used when reporting speaker rects back to callers).
    pub fn to_track(&self, kf: KfRect) -> NormalizedRect {
        let rw = (kf.scale * kf.aspect).max(0.0).sqrt();
        let rh = if kf.aspect > 0.0 {
            (kf.scale / kf.aspect).max(0.0).sqrt()
        } else {
            0.0
        };

        let (cx, cy, px_w, px_h) = self.rotate_backward(kf.cx, kf.cy, rw, rh);

        let px_cx = cx + self.frame_width / 2.0;
        let px_cy = cy + self.frame_height / 2.0;

        let x = (px_cx - px_w / 2.0) / self.frame_width;
        let y = (px_cy - px_h / 2.0) / self.frame_height;
        let width = px_w / self.frame_width;
        let height = px_h / self.frame_height;

        let rect = NormalizedRect::new(x, y, width, height);
        if self.mirrored {
            rect.mirrored()
        } else {
            rect
        }
    }

    fn rotate_forward(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        match self.orientation {
            Orientation::Deg0 => (x, y, w, h),
            Orientation::Deg90 => (-y, x, h, w),
            Orientation::Deg180 => (-x, -y, w, h),
            Orientation::Deg270 => (y, -x, h, w),
        }
    }

    fn rotate_backward(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        match self.orientation {
            Orientation::Deg0 => (x, y, w, h),
            Orientation::Deg90 => (y, -x, h, w),
            Orientation::Deg180 => (-x, -y, w, h),
            Orientation::Deg270 => (-y, x, h, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn transformer_for(orientation: Orientation, mirrored: bool) -> CameraCoordinateTransformer {
        CameraCoordinateTransformer::new(1920.0, 1080.0, orientation, mirrored)
    }

    fn all_orientations() -> [Orientation; 4] {
        [
            Orientation::Deg0,
            Orientation::Deg90,
            Orientation::Deg180,
            Orientation::Deg270,
        ]
    }

    proptest! {
        #[test]
        fn round_trip_is_identity(
            x in 0.0f32..0.9,
            y in 0.0f32..0.9,
            w in 0.01f32..0.1,
            h in 0.01f32..0.1,
            orientation_idx in 0usize..4,
            mirrored in any::<bool>(),
        ) {
            let rect = NormalizedRect::new(x, y, w, h);
            let orientation = all_orientations()[orientation_idx];
            let transformer = transformer_for(orientation, mirrored);

            let kf = transformer.to_kf(rect);
            let back = transformer.to_track(kf);

            prop_assert!((back.x - rect.x).abs() < 1e-3);
            prop_assert!((back.y - rect.y).abs() < 1e-3);
            prop_assert!((back.width - rect.width).abs() < 1e-3);
            prop_assert!((back.height - rect.height).abs() < 1e-3);
        }
    }

    #[test]
    fn orientation_from_degrees_normalizes_negative_angles() {
        assert_eq!(Orientation::from_degrees(-90), Some(Orientation::Deg270));
    }

    #[test]
    fn unsupported_angle_is_none() {
        assert_eq!(Orientation::from_degrees(45), None);
    }
}
