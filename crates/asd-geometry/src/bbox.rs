use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in normalized `[0,1]` image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn cx(&self) -> f32 {
        self.x + self.width / 2.0
    }

    #[inline]
    pub fn cy(&self) -> f32 {
        self.y + self.height / 2.0
    }

    #[inline]
    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f32 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    pub fn iou(&self, other: &NormalizedRect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Mirror horizontally within the unit square, for preview rendering of
    /// a front-facing camera.
    pub fn mirrored(&self) -> Self {
        Self {
            x: 1.0 - self.x - self.width,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// A box in "Kalman-filter coordinates": centered at the origin region,
/// expressed in pixels, with rotation already normalized out by a
/// `CameraCoordinateTransformer`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KfRect {
    pub cx: f32,
    pub cy: f32,
    /// width * height (area) — the SORT-style "scale" used as a single
    /// size scalar so the filter can treat size as one state dimension.
    pub scale: f32,
    /// width / height.
    pub aspect: f32,
}

impl KfRect {
    pub fn new(cx: f32, cy: f32, scale: f32, aspect: f32) -> Self {
        Self {
            cx,
            cy,
            scale,
            aspect,
        }
    }

    pub fn width(&self) -> f32 {
        (self.scale * self.aspect).max(0.0).sqrt()
    }

    pub fn height(&self) -> f32 {
        if self.aspect <= 0.0 {
            0.0
        } else {
            (self.scale / self.aspect).max(0.0).sqrt()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.scale.is_finite() && self.aspect.is_finite()
    }

    pub fn iou(&self, other: &KfRect) -> f32 {
        let (aw, ah) = (self.width(), self.height());
        let (bw, bh) = (other.width(), other.height());
        let a = NormalizedRect::new(self.cx - aw / 2.0, self.cy - ah / 2.0, aw, ah);
        let b = NormalizedRect::new(other.cx - bw / 2.0, other.cy - bh / 2.0, bw, bh);
        a.iou(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_rects_is_one() {
        let r = NormalizedRect::new(0.1, 0.1, 0.2, 0.3);
        assert!((r.iou(&r) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_rects_is_zero() {
        let a = NormalizedRect::new(0.0, 0.0, 0.1, 0.1);
        let b = NormalizedRect::new(0.9, 0.9, 0.1, 0.1);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn mirrored_twice_is_identity() {
        let r = NormalizedRect::new(0.2, 0.3, 0.15, 0.25);
        let m = r.mirrored().mirrored();
        assert!((m.x - r.x).abs() < 1e-6);
        assert!((m.y - r.y).abs() < 1e-6);
    }
}
