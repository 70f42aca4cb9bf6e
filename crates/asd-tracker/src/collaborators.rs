use crate::detection::Detection;
use async_trait::async_trait;
use asd_geometry::NormalizedRect;

/// A raw detector prediction before it's been lifted into KF coordinates
/// and assigned an id.
#[derive(Debug, Clone)]
pub struct RawPrediction {
    pub bbox_normalized: NormalizedRect,
    pub confidence: f32,
    pub landmarks: [f32; 10],
    pub is_full_face: bool,
}

/// Black-box face detector: a CNN fixed-I/O predictor living outside this
/// crate's scope.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, pixel_buffer: &[u8]) -> Vec<RawPrediction>;
}

/// Black-box face embedder. May refuse a low-quality crop, in which case
/// the corresponding detection's `embedding` stays `None`.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    async fn embed(&self, pixel_buffer: &[u8], detections: &mut [Detection]);
}
