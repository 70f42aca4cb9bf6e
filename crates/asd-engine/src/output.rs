use asd_geometry::NormalizedRect;
use asd_speaker::SpeakerStatus;
use uuid::Uuid;

/// Value-type snapshot of a speaker, safe to hand to a callback that may
/// hop threads.
#[derive(Debug, Clone)]
pub struct SendableSpeaker {
    pub id: Uuid,
    pub name: Option<String>,
    pub rect: Option<NormalizedRect>,
    pub status: SpeakerStatus,
    pub misses: u32,
    pub is_speaking: bool,
    pub probability: f32,
    pub speech_history: Option<Vec<f32>>,
}

/// Signals that `from` has been re-identified as the same person as
/// `into` and its timeline was absorbed.
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest {
    pub from: Uuid,
    pub into: Uuid,
}
