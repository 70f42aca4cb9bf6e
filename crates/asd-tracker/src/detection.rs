use asd_geometry::{KfRect, NormalizedRect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Head pose derived from landmarks. Either component may be `NaN` when the
/// detector couldn't estimate pose for this crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub pitch: f32,
    pub yaw: f32,
}

impl Attitude {
    pub const INVALID: Attitude = Attitude {
        pitch: f32::NAN,
        yaw: f32::NAN,
    };

    pub fn is_valid(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite()
    }
}

/// Immutable per-frame observation from the external face detector/embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: Uuid,
    pub bbox_normalized: NormalizedRect,
    pub bbox_kf: KfRect,
    pub confidence: f32,
    pub landmarks: [f32; 10],
    pub attitude: Attitude,
    /// 512-dim L2-normalized embedding; absent when the embedder refused a
    /// low-quality crop.
    pub embedding: Option<Vec<f32>>,
    pub is_full_face: bool,
}

impl Detection {
    pub fn new(
        bbox_normalized: NormalizedRect,
        bbox_kf: KfRect,
        confidence: f32,
        landmarks: [f32; 10],
        is_full_face: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bbox_normalized,
            bbox_kf,
            confidence,
            landmarks,
            attitude: Attitude::INVALID,
            embedding: None,
            is_full_face,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    1.0 - dot.clamp(-1.0, 1.0)
}

pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_of_identical_vectors_is_zero() {
        let v = vec![0.6, 0.8];
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn cosine_distance_of_orthogonal_vectors_is_one() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
