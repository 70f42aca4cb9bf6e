use asd_assign::KuhnMunkresRlapSolver;
use asd_buffer::{AsdBufferPool, AsdModel};
use asd_engine::{AsdEngine, Frame};
use asd_foundation::AsdConfig;
use asd_geometry::{NormalizedRect, Orientation};
use asd_telemetry::PipelineMetrics;
use asd_tracker::{Detection, FaceDetector, FaceEmbedder, RawPrediction, Tracker};
use async_trait::async_trait;
use std::sync::Arc;

struct SteadyFaceDetector;

#[async_trait]
impl FaceDetector for SteadyFaceDetector {
    async fn detect(&self, _pixel_buffer: &[u8]) -> Vec<RawPrediction> {
        vec![RawPrediction {
            bbox_normalized: NormalizedRect::new(0.4, 0.3, 0.2, 0.3),
            confidence: 0.9,
            landmarks: [0.0; 10],
            is_full_face: true,
        }]
    }
}

struct UnitEmbedder;

#[async_trait]
impl FaceEmbedder for UnitEmbedder {
    async fn embed(&self, _pixel_buffer: &[u8], detections: &mut [Detection]) {
        for d in detections.iter_mut() {
            d.embedding = Some(vec![1.0, 0.0]);
        }
    }
}

struct FixedLogitModel;

#[async_trait]
impl AsdModel for FixedLogitModel {
    async fn predict(&self, _input: Vec<f32>) -> Vec<f32> {
        vec![2.0; 5]
    }
}

fn solid_frame(width: usize, height: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(width * height * 4);
    for _ in 0..(width * height) {
        buf.extend_from_slice(&[255, 200, 200, 200]);
    }
    buf
}

#[tokio::test(flavor = "multi_thread")]
async fn single_steady_face_confirms_a_track_and_scores_it() {
    let mut config = AsdConfig::default();
    config.tracker.confirmation_threshold = 30;
    config.min_frames = 12;
    config.video_length = 25;

    let tracker = Tracker::new(
        config.tracker,
        Arc::new(SteadyFaceDetector),
        Arc::new(UnitEmbedder),
        Arc::new(KuhnMunkresRlapSolver),
    );

    let models: Vec<Arc<dyn AsdModel>> = vec![Arc::new(FixedLogitModel), Arc::new(FixedLogitModel)];
    let model_pool = Arc::new(asd_buffer::ModelPool::new(models));
    let pool = Arc::new(
        AsdBufferPool::new(
            &config.pool,
            config.video_length,
            config.crop.frame_width,
            config.crop.frame_height,
            config.min_frames as u32,
            config.min_segment_gap,
            config.framerate,
            model_pool,
            PipelineMetrics::default(),
        )
        .unwrap(),
    );

    let mut engine = AsdEngine::new(config, tracker, pool, PipelineMetrics::default());

    let frame_bytes = solid_frame(640, 480);
    for _ in 0..60 {
        let frame = Frame {
            pixel_buffer: &frame_bytes,
            source_width: 640,
            source_height: 480,
            timestamp: 0.0,
            orientation: Orientation::Deg0,
            mirrored: false,
            drop_frame: false,
        };
        engine.update(frame).await.unwrap();
    }

    assert_eq!(engine.active_speaker_count(), 1);
}
