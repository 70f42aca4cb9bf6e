use serde::{Deserialize, Serialize};

/// A single accumulated logit. `update` only folds in additional evidence
/// when both the existing and incoming values are finite — the "additive
/// when both finite" rule chosen among the source's several drafts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score(pub f32);

impl Score {
    pub fn new(logit: f32) -> Self {
        Self(logit)
    }

    pub fn update(&mut self, logit: f32) {
        if self.0.is_finite() && logit.is_finite() {
            self.0 += logit;
        } else if logit.is_finite() {
            self.0 = logit;
        }
    }

    pub fn probability(&self) -> f32 {
        1.0 / (1.0 + (-self.0).exp())
    }
}

/// Contiguous run of `Score`s over absolute frame indices `[start_index,
/// end_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSegment {
    pub start_index: u64,
    pub scores: Vec<Score>,
}

impl ScoreSegment {
    pub fn new(start_index: u64, logits: &[f32]) -> Self {
        Self {
            start_index,
            scores: logits.iter().map(|l| Score::new(*l)).collect(),
        }
    }

    pub fn end_index(&self) -> u64 {
        self.start_index + self.scores.len() as u64
    }

    pub fn duration(&self) -> u64 {
        self.scores.len() as u64
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.start_index && frame < self.end_index()
    }

    /// Extends this segment to cover `[frame_start, frame_end)`, overlaying
    /// any already-covered frames via `Score::update` and appending the
    /// rest. `logits[i]` corresponds to absolute frame `frame_start + i`.
    pub fn extend(&mut self, frame_start: u64, frame_end: u64, logits: &[f32]) {
        debug_assert_eq!((frame_end - frame_start) as usize, logits.len());

        let old_start = self.start_index;
        let old_end = self.end_index();

        // Prepend whatever falls before the segment's current start.
        if frame_start < old_start {
            let prepend_count = (old_start - frame_start) as usize;
            let mut prefix: Vec<Score> = logits[..prepend_count].iter().map(|l| Score::new(*l)).collect();
            prefix.append(&mut self.scores);
            self.scores = prefix;
            self.start_index = frame_start;
        }

        // Overlay the portion that overlaps the segment's original range.
        let overlay_start = frame_start.max(old_start);
        let overlay_end = frame_end.min(old_end);
        for frame in overlay_start..overlay_end {
            let logit_idx = (frame - frame_start) as usize;
            let score_idx = (frame - self.start_index) as usize;
            self.scores[score_idx].update(logits[logit_idx]);
        }

        // Append whatever falls after the segment's original end.
        if frame_end > old_end {
            let append_from = old_end.max(frame_start);
            for frame in append_from..frame_end {
                let logit_idx = (frame - frame_start) as usize;
                self.scores.push(Score::new(logits[logit_idx]));
            }
        }
    }

    /// Absorbs `other` if it is adjacent to or overlaps this segment's
    /// tail, returning whether the merge happened.
    pub fn try_absorb(&mut self, other: &ScoreSegment) -> bool {
        if other.start_index > self.end_index() {
            return false;
        }
        let overlap = self.end_index().saturating_sub(other.start_index) as usize;
        if overlap > 0 {
            for (i, score) in other.scores.iter().take(overlap).enumerate() {
                let idx = self.scores.len() - overlap + i;
                self.scores[idx].update(score.0);
            }
            self.scores.extend(other.scores.iter().skip(overlap));
        } else {
            self.scores.extend(other.scores.iter().copied());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_accumulates_when_both_finite() {
        let mut s = Score::new(1.0);
        s.update(2.0);
        assert!((s.0 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn probability_of_zero_logit_is_half() {
        let s = Score::new(0.0);
        assert!((s.probability() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn segment_duration_equals_span() {
        let seg = ScoreSegment::new(10, &[1.0, 2.0, 3.0]);
        assert_eq!(seg.end_index() - seg.start_index, seg.scores.len() as u64);
    }

    #[test]
    fn adjacent_segments_absorb() {
        let mut a = ScoreSegment::new(0, &[1.0, 2.0]);
        let b = ScoreSegment::new(2, &[3.0]);
        assert!(a.try_absorb(&b));
        assert_eq!(a.scores.len(), 3);
    }

    #[test]
    fn overlapping_seam_accumulates_shared_frame() {
        let mut a = ScoreSegment::new(0, &[1.0, 2.0]);
        let b = ScoreSegment::new(1, &[5.0, 6.0]);
        assert!(a.try_absorb(&b));
        assert_eq!(a.scores.len(), 3);
        assert!((a.scores[1].0 - 7.0).abs() < 1e-6);
    }
}
