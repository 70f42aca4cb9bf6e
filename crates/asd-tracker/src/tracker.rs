use crate::collaborators::{FaceDetector, FaceEmbedder};
use crate::detection::{cosine_distance, Detection};
use crate::gallery::FaceGallery;
use crate::track::{Costs, Track, TrackStatus};
use asd_assign::{Assignment, RlapExit, RlapSolver};
use asd_foundation::TrackerConfig;
use asd_geometry::{CameraCoordinateTransformer, NormalizedRect};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Immutable snapshot of a track, handed back to the engine after
/// `Tracker::update` so the caller never touches live track state.
#[derive(Debug, Clone)]
pub struct TrackState {
    pub id: Uuid,
    pub name: Option<String>,
    pub rect_normalized: NormalizedRect,
    pub status: TrackStatus,
    pub confidence: f32,
    pub embedding: Vec<f32>,
}

struct Candidate {
    track_idx: usize,
    detection_idx: usize,
    costs: Costs,
}

pub struct Tracker {
    config: TrackerConfig,
    tracks: HashMap<Uuid, Track>,
    gallery: FaceGallery,
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn FaceEmbedder>,
    solver: Arc<dyn RlapSolver>,
    frame_index: u64,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn FaceEmbedder>,
        solver: Arc<dyn RlapSolver>,
    ) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            gallery: FaceGallery::new(),
            detector,
            embedder,
            solver,
            frame_index: 0,
        }
    }

    pub fn gallery_mut(&mut self) -> &mut FaceGallery {
        &mut self.gallery
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub async fn update(
        &mut self,
        pixel_buffer: &[u8],
        transformer: &CameraCoordinateTransformer,
    ) -> HashMap<Uuid, TrackState> {
        self.frame_index += 1;

        // 1. Predict.
        let bounds = transformer.bounds_half_extent();
        for track in self.tracks.values_mut() {
            if track.status != TrackStatus::Terminated {
                track.kf.predict(1.0, 1.0, bounds);
            }
        }

        // 2. Detect.
        let raw = self.detector.detect(pixel_buffer).await;
        let mut detections: Vec<Detection> = raw
            .into_iter()
            .map(|p| {
                let bbox_kf = transformer.to_kf(p.bbox_normalized);
                Detection::new(p.bbox_normalized, bbox_kf, p.confidence, p.landmarks, p.is_full_face)
            })
            .collect();
        self.embedder.embed(pixel_buffer, &mut detections).await;

        // 3. Cascaded assignment.
        let active_ids: Vec<Uuid> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.status == TrackStatus::Active)
            .map(|(id, _)| *id)
            .collect();
        let pending_ids: Vec<Uuid> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.status == TrackStatus::Pending)
            .map(|(id, _)| *id)
            .collect();

        let mut assigned_detections: HashSet<usize> = HashSet::new();
        let mut assigned_tracks: HashSet<Uuid> = HashSet::new();
        let mut assignments: HashMap<Uuid, usize> = HashMap::new();

        self.assign_cascade(
            &active_ids,
            &detections,
            &mut assigned_tracks,
            &mut assigned_detections,
            &mut assignments,
            self.config.max_appearance_cost,
        );

        // Teleport pass: appearance-only, tighter gate, for still-unassigned
        // active tracks (catches rapid motion the IoU gate would reject).
        for &track_id in &active_ids {
            if assigned_tracks.contains(&track_id) {
                continue;
            }
            let track = &self.tracks[&track_id];
            let mut best: Option<(usize, f32)> = None;
            for (d_idx, det) in detections.iter().enumerate() {
                if assigned_detections.contains(&d_idx) {
                    continue;
                }
                if let Some(embedding) = &det.embedding {
                    let cost = track.appearance_distance(embedding);
                    if cost < self.config.max_teleport_cost
                        && best.map(|(_, c)| cost < c).unwrap_or(true)
                    {
                        best = Some((d_idx, cost));
                    }
                }
            }
            if let Some((d_idx, cost)) = best {
                assigned_tracks.insert(track_id);
                assigned_detections.insert(d_idx);
                assignments.insert(track_id, d_idx);
                self.tracks.get_mut(&track_id).unwrap().last_costs = Costs {
                    appearance: cost,
                    ..Costs::default()
                };
            }
        }

        // Pending assignment pass: motion + appearance gating, RLAP.
        self.assign_cascade(
            &pending_ids,
            &detections,
            &mut assigned_tracks,
            &mut assigned_detections,
            &mut assignments,
            self.config.max_appearance_cost,
        );

        // 4. Apply results.
        let mut track_states = HashMap::new();
        let all_ids: Vec<Uuid> = self.tracks.keys().copied().collect();
        for track_id in all_ids {
            if let Some(&d_idx) = assignments.get(&track_id) {
                let det = detections[d_idx].clone();
                let costs = self.tracks[&track_id].last_costs;
                let gallery_name = det
                    .embedding
                    .as_ref()
                    .and_then(|e| self.gallery.nearest(e));
                let track = self.tracks.get_mut(&track_id).unwrap();
                track.register_hit(&det, costs, &self.config, gallery_name);
            } else {
                let track = self.tracks.get_mut(&track_id).unwrap();
                track.register_miss(&self.config);
            }
        }

        self.tracks.retain(|_, t| t.status != TrackStatus::Terminated);

        for (id, track) in &self.tracks {
            track_states.insert(
                *id,
                TrackState {
                    id: *id,
                    name: track.name.clone(),
                    rect_normalized: transformer.to_track(track.kf.rect()),
                    status: track.status,
                    confidence: track.expected_confidence,
                    embedding: track.mean_embedding.clone(),
                },
            );
        }

        // 5. Spawn new tracks from unassigned detections that have an
        // embedding (missing_embedding: detection is dropped otherwise).
        for (d_idx, det) in detections.iter().enumerate() {
            if assigned_detections.contains(&d_idx) {
                continue;
            }
            if let Some(embedding) = det.embedding.clone() {
                let id = Uuid::new_v4();
                let track = Track::new(id, det.bbox_kf, embedding, det.confidence, &self.config);
                self.tracks.insert(id, track);
            }
        }

        track_states
    }

    /// Runs the motion-gate → greedy-unique → embed-gate → greedy-unique →
    /// RLAP cascade over a subset of track ids against the still-available
    /// detections, mutating the shared assignment state.
    fn assign_cascade(
        &mut self,
        track_ids: &[Uuid],
        detections: &[Detection],
        assigned_tracks: &mut HashSet<Uuid>,
        assigned_detections: &mut HashSet<usize>,
        assignments: &mut HashMap<Uuid, usize>,
        max_appearance_cost: f32,
    ) {
        let mut candidates: Vec<Candidate> = Vec::new();
        for (t_idx, &track_id) in track_ids.iter().enumerate() {
            if assigned_tracks.contains(&track_id) {
                continue;
            }
            let track = &self.tracks[&track_id];
            for (d_idx, det) in detections.iter().enumerate() {
                if assigned_detections.contains(&d_idx) {
                    continue;
                }
                let iou = track.kf.rect().iou(&det.bbox_kf);
                if iou < self.config.min_iou {
                    continue;
                }
                let confidence_cost = (track.expected_confidence - det.confidence).abs();
                let ocm_cost = match track.kf.velocity_direction() {
                    Some(vel_dir) => {
                        let dx = det.bbox_kf.cx - track.kf.rect().cx;
                        let dy = det.bbox_kf.cy - track.kf.rect().cy;
                        let theta_intent = dy.atan2(dx);
                        wrap_angle(vel_dir - theta_intent).abs()
                    }
                    None => 0.0,
                };
                candidates.push(Candidate {
                    track_idx: t_idx,
                    detection_idx: d_idx,
                    costs: Costs {
                        iou,
                        appearance: 0.0,
                        ocm: ocm_cost,
                        confidence: confidence_cost,
                    },
                });
            }
        }

        {
            let tracks = &self.tracks;
            let iterations_per_embedding_update = self.config.iterations_per_embedding_update;
            let frame_index = self.frame_index;
            greedy_unique_commit(
                &candidates,
                track_ids,
                assigned_tracks,
                assigned_detections,
                assignments,
                |idx| !tracks[&track_ids[idx]].requires_embedding_refresh(iterations_per_embedding_update, frame_index),
            );
        }

        // Appearance gate: drop pairs whose cosine distance exceeds the
        // configured threshold, then greedy-commit uniques again.
        let mut gated: Vec<Candidate> = Vec::new();
        for c in candidates {
            if assigned_tracks.contains(&track_ids[c.track_idx])
                || assigned_detections.contains(&c.detection_idx)
            {
                continue;
            }
            let track = &self.tracks[&track_ids[c.track_idx]];
            let det = &detections[c.detection_idx];
            let appearance = match &det.embedding {
                Some(e) => track.appearance_distance(e),
                None => continue,
            };
            if appearance > max_appearance_cost {
                continue;
            }
            gated.push(Candidate {
                costs: Costs {
                    appearance,
                    ..c.costs
                },
                ..c
            });
        }

        {
            let tracks = &self.tracks;
            let iterations_per_embedding_update = self.config.iterations_per_embedding_update;
            let frame_index = self.frame_index;
            greedy_unique_commit(
                &gated,
                track_ids,
                assigned_tracks,
                assigned_detections,
                assignments,
                |idx| !tracks[&track_ids[idx]].requires_embedding_refresh(iterations_per_embedding_update, frame_index),
            );
        }

        // RLAP over whatever remains.
        let remaining: Vec<&Candidate> = gated
            .iter()
            .filter(|c| {
                !assigned_tracks.contains(&track_ids[c.track_idx])
                    && !assigned_detections.contains(&c.detection_idx)
            })
            .collect();
        if remaining.is_empty() {
            return;
        }

        let remaining_track_idxs: Vec<usize> = {
            let mut v: Vec<usize> = remaining.iter().map(|c| c.track_idx).collect();
            v.sort_unstable();
            v.dedup();
            v
        };
        let remaining_det_idxs: Vec<usize> = {
            let mut v: Vec<usize> = remaining.iter().map(|c| c.detection_idx).collect();
            v.sort_unstable();
            v.dedup();
            v
        };

        let mut cost_matrix = vec![vec![f32::INFINITY; remaining_det_idxs.len()]; remaining_track_idxs.len()];
        for c in &remaining {
            let row = remaining_track_idxs.iter().position(|&t| t == c.track_idx).unwrap();
            let col = remaining_det_idxs.iter().position(|&d| d == c.detection_idx).unwrap();
            let total = -c.costs.iou
                + self.config.appearance_weight * c.costs.appearance
                + self.config.ocm_weight * c.costs.ocm
                + self.config.confidence_weight * c.costs.confidence;
            cost_matrix[row][col] = total;
        }
        // Replace unreachable pairs with a large but finite sentinel so the
        // solver still receives a dense matrix.
        for row in cost_matrix.iter_mut() {
            for cell in row.iter_mut() {
                if !cell.is_finite() {
                    *cell = 1.0e4;
                }
            }
        }

        let (exit, solved) = self.solver.solve(&cost_matrix);
        if exit.is_warning() {
            warn!(code = exit.code(), "rlap solver returned a warning exit code");
        }
        self.commit_rlap(
            solved,
            &remaining_track_idxs,
            &remaining_det_idxs,
            track_ids,
            &gated,
            assigned_tracks,
            assigned_detections,
            assignments,
        );
    }

    fn commit_rlap(
        &mut self,
        solved: Vec<Assignment>,
        remaining_track_idxs: &[usize],
        remaining_det_idxs: &[usize],
        track_ids: &[Uuid],
        candidates: &[Candidate],
        assigned_tracks: &mut HashSet<Uuid>,
        assigned_detections: &mut HashSet<usize>,
        assignments: &mut HashMap<Uuid, usize>,
    ) {
        for a in solved {
            let t_idx = remaining_track_idxs[a.row];
            let d_idx = remaining_det_idxs[a.col];
            let track_id = track_ids[t_idx];
            if assigned_tracks.contains(&track_id) || assigned_detections.contains(&d_idx) {
                continue;
            }
            assigned_tracks.insert(track_id);
            assigned_detections.insert(d_idx);
            assignments.insert(track_id, d_idx);
            if let Some(c) = candidates
                .iter()
                .find(|c| c.track_idx == t_idx && c.detection_idx == d_idx)
            {
                self.tracks.get_mut(&track_id).unwrap().last_costs = c.costs;
            }
        }
    }
}

/// Commits sole-candidate pairs (unique on both sides) whose track does not
/// currently require an embedding refresh, repeating until no more such
/// pairs remain.
fn greedy_unique_commit(
    candidates: &[Candidate],
    track_ids: &[Uuid],
    assigned_tracks: &mut HashSet<Uuid>,
    assigned_detections: &mut HashSet<usize>,
    assignments: &mut HashMap<Uuid, usize>,
    embedding_not_stale: impl Fn(usize) -> bool,
) {
    loop {
        let mut track_counts: HashMap<usize, usize> = HashMap::new();
        let mut det_counts: HashMap<usize, usize> = HashMap::new();
        for c in candidates {
            if assigned_tracks.contains(&track_ids[c.track_idx]) || assigned_detections.contains(&c.detection_idx) {
                continue;
            }
            *track_counts.entry(c.track_idx).or_insert(0) += 1;
            *det_counts.entry(c.detection_idx).or_insert(0) += 1;
        }

        let unique = candidates.iter().find(|c| {
            !assigned_tracks.contains(&track_ids[c.track_idx])
                && !assigned_detections.contains(&c.detection_idx)
                && track_counts.get(&c.track_idx) == Some(&1)
                && det_counts.get(&c.detection_idx) == Some(&1)
                && embedding_not_stale(c.track_idx)
        });

        match unique {
            Some(c) => {
                assigned_tracks.insert(track_ids[c.track_idx]);
                assigned_detections.insert(c.detection_idx);
                assignments.insert(track_ids[c.track_idx], c.detection_idx);
            }
            None => break,
        }
    }
}

fn wrap_angle(angle: f32) -> f32 {
    let two_pi = std::f32::consts::PI * 2.0;
    let wrapped = (angle + std::f32::consts::PI).rem_euclid(two_pi) - std::f32::consts::PI;
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RawPrediction;
    use asd_geometry::Orientation;
    use async_trait::async_trait;

    struct FixedDetector(Vec<RawPrediction>);

    #[async_trait]
    impl FaceDetector for FixedDetector {
        async fn detect(&self, _pixel_buffer: &[u8]) -> Vec<RawPrediction> {
            self.0.clone()
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

    fn transformer() -> CameraCoordinateTransformer {
        CameraCoordinateTransformer::new(1000.0, 1000.0, Orientation::Deg0, false)
    }

    #[tokio::test]
    async fn unassigned_detection_spawns_a_pending_track() {
        let config = TrackerConfig::default();
        let pred = RawPrediction {
            bbox_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            confidence: 0.9,
            landmarks: [0.0; 10],
            is_full_face: true,
        };
        let mut tracker = Tracker::new(
            config,
            Arc::new(FixedDetector(vec![pred])),
            Arc::new(UnitEmbedder),
            Arc::new(asd_assign::KuhnMunkresRlapSolver),
        );
        let states = tracker.update(&[], &transformer()).await;
        assert_eq!(states.len(), 0);
        assert_eq!(tracker.tracks().count(), 1);
    }

    #[tokio::test]
    async fn steady_detections_confirm_a_track() {
        let mut config = TrackerConfig::default();
        config.confirmation_threshold = 3;
        let pred = RawPrediction {
            bbox_normalized: NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            confidence: 0.9,
            landmarks: [0.0; 10],
            is_full_face: true,
        };
        let mut tracker = Tracker::new(
            config,
            Arc::new(FixedDetector(vec![pred.clone()])),
            Arc::new(UnitEmbedder),
            Arc::new(asd_assign::KuhnMunkresRlapSolver),
        );
        for _ in 0..4 {
            tracker.update(&[], &transformer()).await;
        }
        assert!(tracker.tracks().any(|t| t.status == TrackStatus::Active));
    }
}
