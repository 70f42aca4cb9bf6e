use crate::frame_history::FrameHistory;
use asd_foundation::{BufferError, CropConfig};
use asd_geometry::NormalizedRect;
use std::collections::VecDeque;
use uuid::Uuid;

/// A dispatched inference request's identity: the frame the clip ends on,
/// and a snapshot of which of its frames were real hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsdRequest {
    pub call_frame: u64,
    pub hit_history: u64,
}

/// Logits returned asynchronously by a `ModelPool` worker, still tagged
/// with the request identity so `VisualSpeaker`/`ScoreStream` can align
/// them to absolute frames.
#[derive(Debug, Clone)]
pub struct LogitData {
    pub call_frame: u64,
    pub hit_history: u64,
    pub logits: Vec<f32>,
}

/// Default gray value used both for out-of-image padding during resize and
/// for blank frames written on a skip/reactivation.
pub const DEFAULT_GRAY: u8 = 128;

/// Fixed-capacity ring of grayscale, pre-normalized clip frames feeding the
/// ASD model, plus the bookkeeping needed to dispatch and collect
/// inference for it.
pub struct AsdBuffer {
    pub id: Uuid,
    pub crop_rect: NormalizedRect,
    history: FrameHistory,
    frames: VecDeque<Vec<f32>>,
    capacity: usize,
    frame_width: usize,
    frame_height: usize,
    min_frames: u32,
    pending_logits: VecDeque<LogitData>,
}

impl AsdBuffer {
    pub fn new(id: Uuid, capacity: usize, frame_width: usize, frame_height: usize, min_frames: u32, min_segment_gap: usize) -> Self {
        Self {
            id,
            crop_rect: NormalizedRect::new(0.0, 0.0, 0.0, 0.0),
            history: FrameHistory::new(capacity, min_segment_gap),
            frames: VecDeque::with_capacity(capacity),
            capacity,
            frame_width,
            frame_height,
            min_frames,
            pending_logits: VecDeque::new(),
        }
    }

    pub fn has_enough_frames(&self) -> bool {
        self.history.hit_streak() >= self.min_frames
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    /// Wipes frames to the default gray value and resets history; used on
    /// a speaker re-acquiring a recycled buffer.
    pub fn activate(&mut self) {
        self.frames.clear();
        let blank = vec![Self::normalize_luma(DEFAULT_GRAY, 0.5, 2.0); self.frame_width * self.frame_height];
        for _ in 0..self.capacity {
            self.frames.push_back(blank.clone());
        }
        self.history.reset();
        self.pending_logits.clear();
    }

    fn normalize_luma(luma: u8, bias: f32, scale: f32) -> f32 {
        (luma as f32 / 255.0 - bias) * scale
    }

    /// Writes a detected-face crop into the ring. `pixel_buffer` is an
    /// ARGB8888 frame of `source_width x source_height`; `face_center` and
    /// `face_size` are in normalized `[0,1]` image coordinates.
    pub fn write_hit(
        &mut self,
        pixel_buffer: &[u8],
        source_width: usize,
        source_height: usize,
        face_center: (f32, f32),
        face_size: f32,
        crop: &CropConfig,
    ) -> Result<(), BufferError> {
        if pixel_buffer.len() < source_width * source_height * 4 {
            return Err(BufferError::ConvertFailed("pixel buffer shorter than source dimensions imply".into()));
        }

        let crop_side = face_size * crop.crop_scale;
        let offset_y = face_size * crop.crop_scale * 0.15;
        let cx = face_center.0;
        let cy = face_center.1 + offset_y;

        self.crop_rect = NormalizedRect::new(cx - crop_side / 2.0, cy - crop_side / 2.0, crop_side, crop_side);

        let mut frame = vec![0f32; self.frame_width * self.frame_height];
        for row in 0..self.frame_height {
            for col in 0..self.frame_width {
                let u = self.crop_rect.x + (col as f32 + 0.5) / self.frame_width as f32 * self.crop_rect.width;
                let v = self.crop_rect.y + (row as f32 + 0.5) / self.frame_height as f32 * self.crop_rect.height;

                let luma = if (0.0..1.0).contains(&u) && (0.0..1.0).contains(&v) {
                    sample_luma_bilinear(pixel_buffer, source_width, source_height, u, v)
                } else {
                    DEFAULT_GRAY
                };

                frame[row * self.frame_width + col] = Self::normalize_luma(luma, crop.bias, crop.scale);
            }
        }

        self.push_frame(frame);
        self.history.register_hit();
        Ok(())
    }

    /// Skips this frame: writes a uniform default-gray frame and records a
    /// miss.
    pub fn write_miss(&mut self, crop: &CropConfig) {
        let blank = vec![Self::normalize_luma(DEFAULT_GRAY, crop.bias, crop.scale); self.frame_width * self.frame_height];
        self.push_frame(blank);
        self.history.register_miss();
    }

    fn push_frame(&mut self, frame: Vec<f32>) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Flattens the ring into a single `width * height * capacity` tensor
    /// in oldest-to-newest order, as the model expects.
    pub fn as_tensor(&self) -> Vec<f32> {
        self.frames.iter().flatten().copied().collect()
    }

    pub fn enqueue_logits(&mut self, logits: LogitData) {
        self.pending_logits.push_back(logits);
    }

    /// Drains all logits accumulated since the last drain.
    pub fn pop_new_logits(&mut self) -> Vec<LogitData> {
        self.pending_logits.drain(..).collect()
    }
}

fn sample_luma_bilinear(pixel_buffer: &[u8], width: usize, height: usize, u: f32, v: f32) -> u8 {
    let x = (u * width as f32).clamp(0.0, width as f32 - 1.0);
    let y = (v * height as f32).clamp(0.0, height as f32 - 1.0);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |px: usize, py: usize| -> f32 {
        let idx = (py * width + px) * 4;
        let r = pixel_buffer[idx + 1] as f32;
        let g = pixel_buffer[idx + 2] as f32;
        let b = pixel_buffer[idx + 3] as f32;
        0.299 * r + 0.587 * g + 0.114 * b
    };

    let top = sample(x0, y0) * (1.0 - fx) + sample(x1, y0) * fx;
    let bottom = sample(x0, y1) * (1.0 - fx) + sample(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: usize, height: usize, argb: [u8; 4]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(width * height * 4);
        for _ in 0..(width * height) {
            buf.extend_from_slice(&argb);
        }
        buf
    }

    #[test]
    fn buffer_is_ready_once_hit_streak_meets_min_frames() {
        let crop = CropConfig::default();
        let mut buffer = AsdBuffer::new(Uuid::new_v4(), 25, 4, 4, 3, 2);
        buffer.activate();
        let frame = solid_frame(16, 16, [255, 200, 200, 200]);
        for _ in 0..3 {
            buffer.write_hit(&frame, 16, 16, (0.5, 0.5), 0.3, &crop).unwrap();
        }
        assert!(buffer.has_enough_frames());
    }

    #[test]
    fn miss_resets_hit_streak() {
        let crop = CropConfig::default();
        let mut buffer = AsdBuffer::new(Uuid::new_v4(), 25, 4, 4, 3, 0);
        buffer.activate();
        let frame = solid_frame(16, 16, [255, 200, 200, 200]);
        buffer.write_hit(&frame, 16, 16, (0.5, 0.5), 0.3, &crop).unwrap();
        buffer.write_miss(&crop);
        assert!(!buffer.has_enough_frames());
    }

    #[test]
    fn logits_drain_exactly_once() {
        let mut buffer = AsdBuffer::new(Uuid::new_v4(), 25, 4, 4, 3, 0);
        buffer.enqueue_logits(LogitData {
            call_frame: 10,
            hit_history: 0b111,
            logits: vec![1.0, 2.0],
        });
        assert_eq!(buffer.pop_new_logits().len(), 1);
        assert_eq!(buffer.pop_new_logits().len(), 0);
    }
}
