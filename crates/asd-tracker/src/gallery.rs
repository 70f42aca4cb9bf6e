use crate::detection::cosine_distance;

/// A small pre-registered set of named faces, used to assign a name to a
/// track the moment it is confirmed.
#[derive(Debug, Clone, Default)]
pub struct FaceGallery {
    entries: Vec<(String, Vec<f32>)>,
}

const NAME_MATCH_THRESHOLD: f32 = 0.5;

impl FaceGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, embedding: Vec<f32>) {
        self.entries.push((name.into(), embedding));
    }

    /// Nearest registered face by cosine distance, if within the match
    /// threshold.
    pub fn nearest(&self, embedding: &[f32]) -> Option<String> {
        self.entries
            .iter()
            .map(|(name, e)| (name, cosine_distance(embedding, e)))
            .filter(|(_, d)| *d < NAME_MATCH_THRESHOLD)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(name, _)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_closest_registered_face() {
        let mut gallery = FaceGallery::new();
        gallery.register("alice", vec![1.0, 0.0]);
        gallery.register("bob", vec![0.0, 1.0]);
        assert_eq!(gallery.nearest(&[0.99, 0.14]), Some("alice".to_string()));
    }

    #[test]
    fn no_match_beyond_threshold() {
        let mut gallery = FaceGallery::new();
        gallery.register("alice", vec![1.0, 0.0]);
        assert_eq!(gallery.nearest(&[0.0, 1.0]), None);
    }
}
