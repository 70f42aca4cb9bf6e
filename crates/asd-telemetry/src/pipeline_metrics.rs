use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-task pipeline monitoring. Counters are atomics
/// so the tracker, pool and scheduler can all update them without going
/// through the pool's lock.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Pipeline stage tracking
    pub stage_tracker: Arc<AtomicBool>,
    pub stage_pool: Arc<AtomicBool>,
    pub stage_inference: Arc<AtomicBool>,
    pub stage_score: Arc<AtomicBool>,

    // Frame rate tracking (fps * 10, matching the teacher's fixed-point style)
    pub tracker_fps: Arc<AtomicU64>,

    // Event counters
    pub frames_processed: Arc<AtomicU64>,
    pub tracks_confirmed: Arc<AtomicU64>,
    pub tracks_terminated: Arc<AtomicU64>,
    pub speakers_created: Arc<AtomicU64>,
    pub speakers_deleted: Arc<AtomicU64>,
    pub speakers_merged: Arc<AtomicU64>,

    // Pool/scheduler
    pub buffers_reserved: Arc<AtomicU64>,
    pub buffers_recycled: Arc<AtomicU64>,
    pub reservations_pending: Arc<AtomicUsize>,
    pub scheduler_cycles: Arc<AtomicU64>,

    // Inference
    pub inference_dispatched: Arc<AtomicU64>,
    pub inference_completed: Arc<AtomicU64>,
    pub last_inference_latency_ms: Arc<AtomicU64>,

    // Errors
    pub rlap_warnings: Arc<AtomicU64>,
    pub write_failed_outdated: Arc<AtomicU64>,

    pub last_speaking_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            stage_tracker: Arc::new(AtomicBool::new(false)),
            stage_pool: Arc::new(AtomicBool::new(false)),
            stage_inference: Arc::new(AtomicBool::new(false)),
            stage_score: Arc::new(AtomicBool::new(false)),

            tracker_fps: Arc::new(AtomicU64::new(0)),

            frames_processed: Arc::new(AtomicU64::new(0)),
            tracks_confirmed: Arc::new(AtomicU64::new(0)),
            tracks_terminated: Arc::new(AtomicU64::new(0)),
            speakers_created: Arc::new(AtomicU64::new(0)),
            speakers_deleted: Arc::new(AtomicU64::new(0)),
            speakers_merged: Arc::new(AtomicU64::new(0)),

            buffers_reserved: Arc::new(AtomicU64::new(0)),
            buffers_recycled: Arc::new(AtomicU64::new(0)),
            reservations_pending: Arc::new(AtomicUsize::new(0)),
            scheduler_cycles: Arc::new(AtomicU64::new(0)),

            inference_dispatched: Arc::new(AtomicU64::new(0)),
            inference_completed: Arc::new(AtomicU64::new(0)),
            last_inference_latency_ms: Arc::new(AtomicU64::new(0)),

            rlap_warnings: Arc::new(AtomicU64::new(0)),
            write_failed_outdated: Arc::new(AtomicU64::new(0)),

            last_speaking_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn mark_stage_active(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Tracker => self.stage_tracker.store(true, Ordering::Relaxed),
            PipelineStage::Pool => self.stage_pool.store(true, Ordering::Relaxed),
            PipelineStage::Inference => self.stage_inference.store(true, Ordering::Relaxed),
            PipelineStage::Score => self.stage_score.store(true, Ordering::Relaxed),
        }
    }

    pub fn update_tracker_fps(&self, fps: f64) {
        self.tracker_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn increment_frames_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tracks_confirmed(&self) {
        self.tracks_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tracks_terminated(&self) {
        self.tracks_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_buffers_reserved(&self) {
        self.buffers_reserved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_buffers_recycled(&self) {
        self.buffers_recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_reservations_pending(&self, n: usize) {
        self.reservations_pending.store(n, Ordering::Relaxed);
    }

    pub fn increment_scheduler_cycles(&self) {
        self.scheduler_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self, latency_ms: u64) {
        self.inference_completed.fetch_add(1, Ordering::Relaxed);
        self.last_inference_latency_ms
            .store(latency_ms, Ordering::Relaxed);
    }

    pub fn increment_rlap_warnings(&self) {
        self.rlap_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pool_saturation(&self, num_video_buffers: usize) -> f32 {
        if num_video_buffers == 0 {
            return 1.0;
        }
        let reserved = self.buffers_reserved.load(Ordering::Relaxed) as i64
            - self.buffers_recycled.load(Ordering::Relaxed) as i64;
        (reserved.max(0) as f32 / num_video_buffers as f32).min(1.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PipelineStage {
    Tracker,
    Pool,
    Inference,
    Score,
}

/// Frames-per-second tracker shared by any stage that wants a periodic
/// rate without timestamping every single frame.
#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_saturation_clamped() {
        let metrics = PipelineMetrics::default();
        for _ in 0..5 {
            metrics.increment_buffers_reserved();
        }
        assert_eq!(metrics.pool_saturation(4), 1.0);
    }

    #[test]
    fn pool_saturation_partial() {
        let metrics = PipelineMetrics::default();
        metrics.increment_buffers_reserved();
        metrics.increment_buffers_reserved();
        assert!((metrics.pool_saturation(4) - 0.5).abs() < 1e-6);
    }
}
