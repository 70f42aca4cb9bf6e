use asd_buffer::AsdBufferPool;
use asd_foundation::CropConfig;
use asd_geometry::NormalizedRect;
use asd_score::ScoreStream;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerStatus {
    Inactive,
    Pairing,
    Paired,
}

/// One per identity while on-screen. Exclusively owns its buffer
/// reservation for its entire held lifetime.
pub struct VisualSpeaker {
    pub id: Uuid,
    pub name: Option<String>,
    pub current_track_id: Option<Uuid>,
    pub embedding: Vec<f32>,
    pub last_rect: Option<NormalizedRect>,
    pub status: SpeakerStatus,
    held_buffer: Option<Uuid>,
    pub scores: ScoreStream,
    pub was_track_missed: bool,
    pub permanent: bool,
    missed_frames: u32,
    created_order: u64,
}

impl VisualSpeaker {
    pub fn new(id: Uuid, track_id: Uuid, embedding: Vec<f32>, framerate: u32, created_order: u64) -> Self {
        Self {
            id,
            name: None,
            current_track_id: Some(track_id),
            embedding,
            last_rect: None,
            status: SpeakerStatus::Pairing,
            held_buffer: None,
            scores: ScoreStream::new(framerate),
            was_track_missed: false,
            permanent: false,
            missed_frames: 0,
            created_order,
        }
    }

    pub fn held_buffer(&self) -> Option<Uuid> {
        self.held_buffer
    }

    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }

    pub fn is_deletable(&self, deletion_age: u32) -> bool {
        !self.permanent && self.status == SpeakerStatus::Inactive && self.missed_frames >= deletion_age
    }

    /// A live frame for this speaker's track arrived. Rejects frames whose
    /// track id doesn't match the speaker's current track.
    #[allow(clippy::too_many_arguments)]
    pub fn register_new_frame(
        &mut self,
        pixel_buffer: &[u8],
        source_width: usize,
        source_height: usize,
        track_id: Uuid,
        rect: NormalizedRect,
        embedding: Vec<f32>,
        face_size: f32,
        drop_frame: bool,
        pool: &AsdBufferPool,
        crop: &CropConfig,
        video_length: u64,
    ) {
        if let Some(expected) = self.current_track_id {
            if expected != track_id {
                warn!(speaker = %self.id, "register_new_frame track id mismatch; ignoring");
                return;
            }
        }

        self.current_track_id = Some(track_id);
        self.last_rect = Some(rect);
        self.embedding = embedding;
        self.status = SpeakerStatus::Paired;
        self.missed_frames = 0;
        self.was_track_missed = false;

        if self.held_buffer.is_none() {
            self.held_buffer = pool.request(self.id);
        }

        if self.held_buffer.is_some() {
            let drained = pool.with_buffer_mut(self.id, |buffer| {
                if !drop_frame {
                    let _ = buffer.write_hit(
                        pixel_buffer,
                        source_width,
                        source_height,
                        (rect.cx(), rect.cy()),
                        face_size,
                        crop,
                    );
                } else {
                    buffer.write_miss(crop);
                }
                buffer.pop_new_logits()
            });
            if let Some(logits) = drained {
                for logit_data in logits {
                    if let Err(err) = self.scores.write_scores(&logit_data, video_length) {
                        warn!(speaker = %self.id, ?err, "dropping outdated score write");
                    }
                }
            }
        }
    }

    /// The speaker's track was absent this frame.
    pub fn register_missed_frame(&mut self, pool: &AsdBufferPool, crop: &CropConfig) {
        self.current_track_id = None;
        self.last_rect = None;
        self.status = SpeakerStatus::Inactive;
        self.was_track_missed = true;
        self.missed_frames += 1;

        if self.held_buffer.is_some() {
            let became_empty = pool
                .with_buffer_mut(self.id, |buffer| {
                    let _ = buffer.pop_new_logits();
                    buffer.write_miss(crop);
                    buffer.history().is_empty()
                })
                .unwrap_or(true);

            if became_empty {
                pool.recycle(self.id);
                self.held_buffer = None;
            }
        }
    }

    /// Merges a younger, non-permanent speaker's timeline into this one.
    /// Requires this speaker to not currently hold a buffer.
    pub fn absorb(&mut self, other: &VisualSpeaker) {
        if other.permanent {
            warn!(from = %other.id, into = %self.id, "refusing to absorb a permanent speaker");
            return;
        }
        if other.created_order <= self.created_order {
            warn!(from = %other.id, into = %self.id, "refusing to absorb a non-younger speaker");
            return;
        }
        if self.held_buffer.is_some() {
            warn!(into = %self.id, "refusing to absorb while holding a buffer");
            return;
        }
        self.scores.absorb(&other.scores);
    }

    pub fn is_similar_to(&self, embedding: &[f32], threshold: f32) -> bool {
        asd_tracker_cosine_distance(&self.embedding, embedding) <= threshold
    }
}

fn asd_tracker_cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    1.0 - dot.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_within_threshold() {
        let speaker = VisualSpeaker::new(Uuid::new_v4(), Uuid::new_v4(), vec![1.0, 0.0], 30, 0);
        assert!(speaker.is_similar_to(&[0.99, 0.14], 0.1));
    }

    #[test]
    fn not_deletable_while_permanent() {
        let mut speaker = VisualSpeaker::new(Uuid::new_v4(), Uuid::new_v4(), vec![1.0, 0.0], 30, 0);
        speaker.permanent = true;
        speaker.status = SpeakerStatus::Inactive;
        assert!(!speaker.is_deletable(0));
    }
}
