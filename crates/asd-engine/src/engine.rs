use crate::frame::Frame;
use crate::output::{MergeRequest, SendableSpeaker};
use asd_buffer::AsdBufferPool;
use asd_foundation::{AsdConfig, AsdError};
use asd_geometry::CameraCoordinateTransformer;
use asd_speaker::{SpeakerStatus, VisualSpeaker};
use asd_telemetry::PipelineMetrics;
use asd_tracker::Tracker;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const REIDENTIFY_THRESHOLD: f32 = 0.35;

/// Drives the tracker, reconciles tracks with long-lived `VisualSpeaker`
/// entities, and fans out per-frame results.
pub struct AsdEngine {
    config: AsdConfig,
    tracker: Tracker,
    pool: Arc<AsdBufferPool>,
    metrics: PipelineMetrics,
    active_speakers: HashMap<Uuid, VisualSpeaker>,
    inactive_speakers: HashMap<Uuid, VisualSpeaker>,
    next_created_order: u64,
    callback: Option<Box<dyn FnMut(Vec<SendableSpeaker>) + Send>>,
    on_merge: Option<Box<dyn FnMut(MergeRequest) + Send>>,
}

impl AsdEngine {
    pub fn new(config: AsdConfig, tracker: Tracker, pool: Arc<AsdBufferPool>, metrics: PipelineMetrics) -> Self {
        Self {
            config,
            tracker,
            pool,
            metrics,
            active_speakers: HashMap::new(),
            inactive_speakers: HashMap::new(),
            next_created_order: 0,
            callback: None,
            on_merge: None,
        }
    }

    pub fn set_callback(&mut self, callback: impl FnMut(Vec<SendableSpeaker>) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn set_merge_callback(&mut self, callback: impl FnMut(MergeRequest) + Send + 'static) {
        self.on_merge = Some(Box::new(callback));
    }

    pub async fn update(&mut self, frame: Frame<'_>) -> Result<(), AsdError> {
        let transformer = CameraCoordinateTransformer::new(
            frame.source_width as f32,
            frame.source_height as f32,
            frame.orientation,
            frame.mirrored,
        );

        let track_states = self.tracker.update(frame.pixel_buffer, &transformer).await;

        let mut claimed_tracks: std::collections::HashSet<Uuid> = std::collections::HashSet::new();

        // 1. Active speakers: feed or miss, demote to inactive on loss.
        let active_ids: Vec<Uuid> = self.active_speakers.keys().copied().collect();
        for speaker_id in active_ids {
            let track_match = self
                .active_speakers
                .get(&speaker_id)
                .and_then(|s| s.current_track_id)
                .and_then(|id| track_states.get(&id).cloned());

            let speaker = self.active_speakers.get_mut(&speaker_id).unwrap();
            if let Some(state) = track_match {
                claimed_tracks.insert(state.id);
                let face_size = (state.rect_normalized.width.max(state.rect_normalized.height)).max(0.01);
                speaker.name = state.name.clone();
                speaker.register_new_frame(
                    frame.pixel_buffer,
                    frame.source_width,
                    frame.source_height,
                    state.id,
                    state.rect_normalized,
                    state.embedding.clone(),
                    face_size,
                    frame.drop_frame,
                    &self.pool,
                    &self.config.crop,
                    self.config.video_length as u64,
                );
            } else {
                speaker.register_missed_frame(&self.pool, &self.config.crop);
            }

            if self.active_speakers[&speaker_id].status == SpeakerStatus::Inactive {
                let speaker = self.active_speakers.remove(&speaker_id).unwrap();
                self.inactive_speakers.insert(speaker_id, speaker);
            }
        }

        // 2. Inactive speakers: keep missing them, drop once deletable.
        let inactive_ids: Vec<Uuid> = self.inactive_speakers.keys().copied().collect();
        for speaker_id in inactive_ids {
            let speaker = self.inactive_speakers.get_mut(&speaker_id).unwrap();
            speaker.register_missed_frame(&self.pool, &self.config.crop);
            if speaker.is_deletable(self.config.deletion_age as u32) {
                self.inactive_speakers.remove(&speaker_id);
                self.metrics.increment_tracks_terminated();
                info!(speaker = %speaker_id, "speaker deleted after deletion age elapsed");
            }
        }

        // 3. Unclaimed tracks: re-identify against an inactive speaker or
        // spawn a new one.
        for (track_id, state) in track_states.iter() {
            if claimed_tracks.contains(track_id) {
                continue;
            }

            let reidentified = self
                .inactive_speakers
                .iter()
                .find(|(_, s)| s.is_similar_to(&state.embedding, REIDENTIFY_THRESHOLD))
                .map(|(id, _)| *id);

            let speaker_id = if let Some(id) = reidentified {
                let mut speaker = self.inactive_speakers.remove(&id).unwrap();
                speaker.current_track_id = Some(*track_id);
                speaker.status = SpeakerStatus::Pairing;
                self.active_speakers.insert(id, speaker);
                id
            } else {
                let id = Uuid::new_v4();
                let order = self.next_created_order;
                self.next_created_order += 1;
                let speaker = VisualSpeaker::new(id, *track_id, state.embedding.clone(), self.config.framerate, order);
                self.active_speakers.insert(id, speaker);
                self.metrics.increment_tracks_confirmed();
                id
            };

            let face_size = (state.rect_normalized.width.max(state.rect_normalized.height)).max(0.01);
            let speaker = self.active_speakers.get_mut(&speaker_id).unwrap();
            speaker.name = state.name.clone();
            speaker.register_new_frame(
                frame.pixel_buffer,
                frame.source_width,
                frame.source_height,
                *track_id,
                state.rect_normalized,
                state.embedding.clone(),
                face_size,
                frame.drop_frame,
                &self.pool,
                &self.config.crop,
                self.config.video_length as u64,
            );
        }

        // 4. Drive the buffer pool's scheduler/inference dispatch.
        self.pool.advance_frame(frame.timestamp, frame.drop_frame).await?;

        // 5. Fan out results.
        if let Some(callback) = &mut self.callback {
            let snapshot: Vec<SendableSpeaker> = self
                .active_speakers
                .values()
                .map(|speaker| {
                    let last_segment = speaker.scores.segments.last();
                    let probability = last_segment
                        .and_then(|s| s.scores.last())
                        .map(|s| s.probability())
                        .unwrap_or(0.0);
                    SendableSpeaker {
                        id: speaker.id,
                        name: speaker.name.clone(),
                        rect: speaker.last_rect,
                        status: speaker.status,
                        misses: speaker.missed_frames(),
                        is_speaking: probability > 0.5,
                        probability,
                        speech_history: last_segment
                            .map(|s| s.scores.iter().map(|score| score.probability()).collect()),
                    }
                })
                .collect();
            callback(snapshot);
        }

        Ok(())
    }

    /// Merges `from` into `into`, absorbing its timeline and notifying the
    /// merge callback. Both ids must refer to inactive, non-permanent
    /// speakers.
    pub fn merge_speakers(&mut self, from: Uuid, into: Uuid) {
        if from == into {
            return;
        }
        let Some(source) = self.inactive_speakers.remove(&from) else {
            return;
        };
        if let Some(target) = self.inactive_speakers.get_mut(&into) {
            target.absorb(&source);
            if let Some(on_merge) = &mut self.on_merge {
                on_merge(MergeRequest { from, into });
            }
        } else {
            self.inactive_speakers.insert(from, source);
        }
    }

    pub fn active_speaker_count(&self) -> usize {
        self.active_speakers.len()
    }
}
