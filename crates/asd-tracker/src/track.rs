use crate::detection::{cosine_distance, normalize, Detection};
use asd_foundation::TrackerConfig;
use asd_geometry::{KalmanFilter, KfRect, UnivariateKf};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Pending,
    Active,
    Terminated,
}

/// Per-candidate cost breakdown from the most recent assignment attempt,
/// kept for diagnostics and for the OCM term's velocity comparison.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Costs {
    pub iou: f32,
    pub appearance: f32,
    pub ocm: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: Uuid,
    pub name: Option<String>,
    pub mean_embedding: Vec<f32>,
    pub expected_confidence: f32,
    pub status: TrackStatus,
    pub state_transition_counter: u32,
    pub kf: KalmanFilter,
    pub last_costs: Costs,
    pub appearance_kf: UnivariateKf,
    pub average_appearance_cost: f32,
}

impl Track {
    pub fn new(id: Uuid, rect: KfRect, embedding: Vec<f32>, confidence: f32, config: &TrackerConfig) -> Self {
        let mut mean_embedding = embedding;
        normalize(&mut mean_embedding);
        Self {
            id,
            name: None,
            mean_embedding,
            expected_confidence: confidence,
            status: TrackStatus::Pending,
            state_transition_counter: 0,
            kf: KalmanFilter::new(rect, 1.0, 1.0),
            last_costs: Costs::default(),
            appearance_kf: UnivariateKf::new(
                config.appearance_cost_variance,
                config.appearance_cost_measurement_variance,
            ),
            average_appearance_cost: config.max_appearance_cost / 2.0,
        }
    }

    pub fn requires_embedding_refresh(&self, iterations_per_embedding_update: u32, frame_index: u64) -> bool {
        iterations_per_embedding_update == 0
            || frame_index % iterations_per_embedding_update as u64 == 0
    }

    /// Applies a hit: updates motion, appearance mean, and the
    /// pending→active / active-reset state machine.
    pub fn register_hit(
        &mut self,
        detection: &Detection,
        costs: Costs,
        config: &TrackerConfig,
        gallery_name: Option<String>,
    ) {
        self.last_costs = costs;

        if !self.kf.is_valid() {
            self.kf = KalmanFilter::new(detection.bbox_kf, 1.0, 1.0);
        } else {
            self.kf.update(detection.bbox_kf, 1.0);
        }

        self.expected_confidence = detection.confidence;

        if let Some(embedding) = &detection.embedding {
            let running_mean = self.average_appearance_cost.max(f32::EPSILON);
            let alpha_eff = config.embedding_alpha
                * ((detection.confidence - config.embedding_confidence_threshold)
                    / (1.0 - config.embedding_confidence_threshold))
                    .clamp(0.0, 1.0)
                * (-costs.appearance / running_mean).exp();

            for (m, e) in self.mean_embedding.iter_mut().zip(embedding.iter()) {
                *m += alpha_eff * (e - *m);
            }
            normalize(&mut self.mean_embedding);

            self.average_appearance_cost = self.appearance_kf.observe(costs.appearance);
        }

        match self.status {
            TrackStatus::Pending => {
                if detection.is_full_face {
                    self.state_transition_counter += 1;
                }
                if self.state_transition_counter >= config.confirmation_threshold {
                    self.status = TrackStatus::Active;
                    self.state_transition_counter = 0;
                    if self.name.is_none() {
                        self.name = gallery_name;
                    }
                }
            }
            TrackStatus::Active => {
                self.state_transition_counter = 0;
            }
            TrackStatus::Terminated => {}
        }
    }

    /// Applies a miss: damps motion, advances the termination counter.
    pub fn register_miss(&mut self, config: &TrackerConfig) {
        match self.status {
            TrackStatus::Pending => {
                self.status = TrackStatus::Terminated;
            }
            TrackStatus::Active => {
                self.kf.dampen(config.velocity_damping, config.growth_damping);
                self.state_transition_counter += 1;
                if self.state_transition_counter >= config.deactivation_threshold || !self.kf.is_valid() {
                    self.status = TrackStatus::Terminated;
                }
            }
            TrackStatus::Terminated => {}
        }
    }

    pub fn appearance_distance(&self, embedding: &[f32]) -> f32 {
        cosine_distance(&self.mean_embedding, embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asd_geometry::NormalizedRect;

    fn config() -> TrackerConfig {
        TrackerConfig::default()
    }

    fn detection_at(cx: f32, cy: f32, confidence: f32) -> Detection {
        let mut d = Detection::new(
            NormalizedRect::new(cx - 0.05, cy - 0.05, 0.1, 0.1),
            KfRect::new(cx * 1000.0, cy * 1000.0, 1000.0, 1.0),
            confidence,
            [0.0; 10],
            true,
        );
        d.embedding = Some(vec![1.0, 0.0]);
        d
    }

    #[test]
    fn pending_never_terminates_from_a_single_miss_count_below_threshold() {
        let cfg = config();
        let mut track = Track::new(Uuid::new_v4(), KfRect::new(0.0, 0.0, 1000.0, 1.0), vec![1.0, 0.0], 0.9, &cfg);
        track.status = TrackStatus::Active;
        track.register_miss(&cfg);
        assert_eq!(track.status, TrackStatus::Active);
    }

    #[test]
    fn pending_terminates_on_any_miss() {
        let cfg = config();
        let mut track = Track::new(Uuid::new_v4(), KfRect::new(0.0, 0.0, 1000.0, 1.0), vec![1.0, 0.0], 0.9, &cfg);
        track.register_miss(&cfg);
        assert_eq!(track.status, TrackStatus::Terminated);
    }

    #[test]
    fn confirms_after_confirmation_threshold_full_face_hits() {
        let mut cfg = config();
        cfg.confirmation_threshold = 3;
        let mut track = Track::new(Uuid::new_v4(), KfRect::new(0.0, 0.0, 1000.0, 1.0), vec![1.0, 0.0], 0.9, &cfg);
        for _ in 0..3 {
            let det = detection_at(0.0, 0.0, 0.9);
            track.register_hit(&det, Costs::default(), &cfg, None);
        }
        assert_eq!(track.status, TrackStatus::Active);
    }

    #[test]
    fn embedding_stays_unit_norm_after_update() {
        let cfg = config();
        let mut track = Track::new(Uuid::new_v4(), KfRect::new(0.0, 0.0, 1000.0, 1.0), vec![1.0, 0.0], 0.9, &cfg);
        let det = detection_at(0.1, 0.1, 0.9);
        track.register_hit(&det, Costs::default(), &cfg, None);
        let norm = track.mean_embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
