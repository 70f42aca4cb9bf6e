use crate::score::ScoreSegment;
use asd_buffer::LogitData;
use asd_foundation::ScoreError;

/// Decodes a `FrameHistory`-style raw bitmask into oldest-first `[lo, hi)`
/// hit ranges, mirroring `asd_buffer::FrameHistory::chunks`.
fn decode_chunks(mask: u64, width: usize) -> Vec<std::ops::Range<usize>> {
    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;
    for offset in (0..width).rev() {
        let idx = width - 1 - offset;
        let bit = (mask >> offset) & 1;
        if bit == 1 {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            chunks.push(s..idx);
        }
    }
    if let Some(s) = start {
        chunks.push(s..width);
    }
    chunks
}

/// Ordered, non-overlapping list of `ScoreSegment`s sharing a frame grid
/// tied to a fixed `framerate`.
#[derive(Debug, Clone, Default)]
pub struct ScoreStream {
    pub segments: Vec<ScoreSegment>,
    pub framerate: u32,
}

impl ScoreStream {
    pub fn new(framerate: u32) -> Self {
        Self {
            segments: Vec::new(),
            framerate,
        }
    }

    pub fn duration(&self) -> u64 {
        self.segments.iter().map(|s| s.duration()).sum()
    }

    /// Writes the logits from one inference result into the stream.
    /// `callFrame` is the index of the last frame in the clip window;
    /// `hitHistory` names which of the trailing `videoLength` frames were
    /// real hits. Only hit frames receive scores, consumed from the tail
    /// of `logits` backward across chunks newest-first.
    pub fn write_scores(&mut self, logits: &LogitData, video_length: u64) -> Result<(), ScoreError> {
        if logits.logits.is_empty() {
            return Ok(());
        }

        if let Some(last) = self.segments.last() {
            if logits.call_frame + 1 <= last.end_index() {
                return Err(ScoreError::WriteFailedOutdatedSegment);
            }
        }

        let window_start = logits.call_frame.saturating_sub(video_length.saturating_sub(1));
        let chunks = decode_chunks(logits.hit_history, video_length as usize);

        let mut cursor = logits.logits.len();
        for chunk in chunks.iter().rev() {
            if cursor == 0 {
                break;
            }
            let abs_start = window_start + chunk.start as u64;
            let abs_end = window_start + chunk.end as u64;
            let chunk_len = (abs_end - abs_start) as usize;
            let take = chunk_len.min(cursor);
            let slice_start = cursor - take;
            let frame_start = abs_end - take as u64;
            let frame_end = abs_end;

            self.insert_or_extend(frame_start, frame_end, &logits.logits[slice_start..cursor]);
            cursor = slice_start;
        }

        Ok(())
    }

    fn insert_or_extend(&mut self, frame_start: u64, frame_end: u64, values: &[f32]) {
        if frame_start >= frame_end {
            return;
        }

        for i in (0..self.segments.len()).rev() {
            let seg_end = self.segments[i].end_index();
            let seg_start = self.segments[i].start_index;

            if frame_start > seg_end {
                self.segments
                    .insert(i + 1, ScoreSegment::new(frame_start, values));
                self.coalesce_around(i + 1);
                return;
            }

            if frame_start <= seg_end && frame_end >= seg_start {
                self.segments[i].extend(frame_start, frame_end, values);
                self.coalesce_around(i);
                return;
            }
        }

        self.segments.insert(0, ScoreSegment::new(frame_start, values));
        self.coalesce_around(0);
    }

    /// Merges the segment at `idx` with its neighbors if they've become
    /// adjacent or overlapping.
    fn coalesce_around(&mut self, idx: usize) {
        if idx + 1 < self.segments.len() {
            let next = self.segments[idx + 1].clone();
            if next.start_index <= self.segments[idx].end_index() {
                self.segments[idx].try_absorb(&next);
                self.segments.remove(idx + 1);
            }
        }
        if idx > 0 {
            let current = self.segments[idx].clone();
            if current.start_index <= self.segments[idx - 1].end_index() {
                self.segments[idx - 1].try_absorb(&current);
                self.segments.remove(idx);
            }
        }
    }

    /// Merges another stream's segments into this one, a merge-sort pass
    /// over both already-sorted lists.
    pub fn absorb(&mut self, other: &ScoreStream) {
        if other.segments.is_empty() {
            return;
        }
        let mine = std::mem::take(&mut self.segments);
        let mut merged: Vec<ScoreSegment> = Vec::with_capacity(mine.len() + other.segments.len());

        let mut a = mine.into_iter().peekable();
        let mut b = other.segments.iter().cloned().peekable();

        while a.peek().is_some() || b.peek().is_some() {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => {
                    if x.start_index <= y.start_index {
                        a.next().unwrap()
                    } else {
                        b.next().unwrap()
                    }
                }
                (Some(_), None) => a.next().unwrap(),
                (None, Some(_)) => b.next().unwrap(),
                (None, None) => unreachable!(),
            };

            match merged.last_mut() {
                Some(last) if next.start_index <= last.end_index() => {
                    last.try_absorb(&next);
                }
                _ => merged.push(next),
            }
        }

        self.segments = merged;
    }

    /// Sorts and coalesces the segment list if it has become unsorted or
    /// overlapping (should only happen after a bulk import).
    pub fn repair(&mut self) {
        self.segments.sort_by_key(|s| s.start_index);
        let mut repaired: Vec<ScoreSegment> = Vec::with_capacity(self.segments.len());
        for seg in self.segments.drain(..) {
            match repaired.last_mut() {
                Some(last) if seg.start_index <= last.end_index() => {
                    last.try_absorb(&seg);
                }
                _ => repaired.push(seg),
            }
        }
        self.segments = repaired;
    }

    pub fn find_segment_for_index(&self, frame: u64) -> Option<&ScoreSegment> {
        self.segments
            .binary_search_by(|seg| {
                if frame < seg.start_index {
                    std::cmp::Ordering::Greater
                } else if frame >= seg.end_index() {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
            .map(|idx| &self.segments[idx])
    }

    pub fn find_segments_in_range(&self, from_index: u64, to_index: u64) -> Vec<&ScoreSegment> {
        self.segments
            .iter()
            .filter(|s| s.start_index < to_index && s.end_index() > from_index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logits(call_frame: u64, hit_history: u64, values: &[f32]) -> LogitData {
        LogitData {
            call_frame,
            hit_history,
            logits: values.to_vec(),
        }
    }

    #[test]
    fn segments_stay_ordered_and_non_overlapping() {
        let mut stream = ScoreStream::new(30);
        stream.write_scores(&logits(4, 0b11111, &[1.0, 2.0, 3.0, 4.0, 5.0]), 25).unwrap();
        stream.write_scores(&logits(9, 0b11111, &[1.0, 2.0, 3.0, 4.0, 5.0]), 25).unwrap();
        for w in stream.segments.windows(2) {
            assert!(w[0].end_index() <= w[1].start_index);
        }
    }

    #[test]
    fn writing_an_empty_logit_list_is_a_no_op() {
        let mut stream = ScoreStream::new(30);
        stream.write_scores(&logits(4, 0, &[]), 25).unwrap();
        assert!(stream.segments.is_empty());
    }

    #[test]
    fn outdated_call_frame_is_rejected() {
        let mut stream = ScoreStream::new(30);
        stream.write_scores(&logits(10, 0b11111, &[1.0, 2.0, 3.0, 4.0, 5.0]), 25).unwrap();
        let result = stream.write_scores(&logits(2, 0b11111, &[1.0, 2.0, 3.0, 4.0, 5.0]), 25);
        assert!(result.is_err());
    }

    #[test]
    fn absorb_of_empty_stream_is_identity() {
        let mut stream = ScoreStream::new(30);
        stream.write_scores(&logits(4, 0b11111, &[1.0, 2.0, 3.0, 4.0, 5.0]), 25).unwrap();
        let before = stream.duration();
        stream.absorb(&ScoreStream::new(30));
        assert_eq!(stream.duration(), before);
    }

    #[test]
    fn duration_sums_segment_lengths() {
        let mut stream = ScoreStream::new(30);
        stream.write_scores(&logits(4, 0b11111, &[1.0, 2.0, 3.0, 4.0, 5.0]), 25).unwrap();
        assert_eq!(stream.duration(), 5);
    }
}
