use asd_buffer::AsdModel;
use asd_geometry::NormalizedRect;
use asd_tracker::{Detection, FaceDetector, FaceEmbedder, RawPrediction};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Detector standing in for the real CNN: drifts a single synthetic face
/// slowly across the frame so the tracker has something to follow.
pub struct SyntheticFaceDetector {
    frame_counter: AtomicU64,
}

impl SyntheticFaceDetector {
    pub fn new() -> Self {
        Self {
            frame_counter: AtomicU64::new(0),
        }
    }
}

impl Default for SyntheticFaceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceDetector for SyntheticFaceDetector {
    async fn detect(&self, _pixel_buffer: &[u8]) -> Vec<RawPrediction> {
        let t = self.frame_counter.fetch_add(1, Ordering::Relaxed) as f32;
        let cx = 0.5 + 0.1 * (t / 30.0).sin();
        let cy = 0.4;
        vec![RawPrediction {
            bbox_normalized: NormalizedRect::new(cx - 0.1, cy - 0.15, 0.2, 0.3),
            confidence: 0.92,
            landmarks: [0.0; 10],
            is_full_face: true,
        }]
    }
}

/// Embedder standing in for the real face-recognition network: returns a
/// fixed unit embedding so the demo tracker always recognizes the same
/// synthetic identity.
pub struct SyntheticFaceEmbedder;

#[async_trait]
impl FaceEmbedder for SyntheticFaceEmbedder {
    async fn embed(&self, _pixel_buffer: &[u8], detections: &mut [Detection]) {
        for d in detections.iter_mut() {
            let mut embedding = vec![0.0f32; 512];
            embedding[0] = 1.0;
            d.embedding = Some(embedding);
        }
    }
}

/// Model standing in for the real ASD CNN: emits a mildly noisy "speaking"
/// logit so the demo's score stream has something to show.
pub struct SyntheticAsdModel;

#[async_trait]
impl AsdModel for SyntheticAsdModel {
    async fn predict(&self, input: Vec<f32>) -> Vec<f32> {
        let frames_per_update = 5;
        let mut rng = rand::thread_rng();
        let base = if input.iter().any(|v| v.abs() > 1e-3) { 1.5 } else { -1.5 };
        (0..frames_per_update)
            .map(|_| base + rng.gen_range(-0.3..0.3))
            .collect()
    }
}
