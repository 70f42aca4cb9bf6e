use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Crop/normalization settings for writing a detection into an `AsdBuffer`
/// frame (spec.md §6 "Crop").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub crop_scale: f32,
    pub frame_width: usize,
    pub frame_height: usize,
    pub bias: f32,
    pub scale: f32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            crop_scale: 1.5,
            frame_width: 112,
            frame_height: 112,
            bias: 0.5,
            scale: 2.0,
        }
    }
}

/// Tracker tuning knobs (spec.md §6 "Tracker").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub confirmation_threshold: u32,
    pub deactivation_threshold: u32,
    pub iterations_per_embedding_update: u32,
    pub embedding_confidence_threshold: f32,
    pub embedding_alpha: f32,
    pub min_iou: f32,
    pub max_appearance_cost: f32,
    pub max_teleport_cost: f32,
    pub ocm_weight: f32,
    pub confidence_weight: f32,
    pub appearance_weight: f32,
    pub velocity_damping: f32,
    pub growth_damping: f32,
    pub appearance_cost_variance: f32,
    pub appearance_cost_measurement_variance: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 30,
            deactivation_threshold: 15,
            iterations_per_embedding_update: 1,
            embedding_confidence_threshold: 0.5,
            embedding_alpha: 0.3,
            min_iou: 0.1,
            max_appearance_cost: 0.6,
            max_teleport_cost: 0.35,
            ocm_weight: 0.2,
            confidence_weight: 0.1,
            appearance_weight: 0.5,
            velocity_damping: 0.8,
            growth_damping: 0.9,
            appearance_cost_variance: 0.05,
            appearance_cost_measurement_variance: 0.02,
        }
    }
}

/// Buffer pool / scheduler sizing (spec.md §6 "Pool").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub num_video_buffers: usize,
    pub num_asd_models: usize,
    pub cooldown: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_video_buffers: 4,
            num_asd_models: 2,
            cooldown: 5,
        }
    }
}

/// Top-level configuration, matching spec.md §6's enumerated options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AsdConfig {
    pub framerate: u32,
    pub frames_per_update: usize,
    pub video_length: usize,
    pub min_frames: usize,
    pub min_segment_gap: usize,
    pub deletion_age: u32,
    pub tracker: TrackerConfig,
    pub pool: PoolConfig,
    pub crop: CropConfig,
}

impl Default for AsdConfig {
    fn default() -> Self {
        Self {
            framerate: 30,
            frames_per_update: 5,
            video_length: 25,
            min_frames: 12,
            min_segment_gap: 3,
            deletion_age: 30,
            tracker: TrackerConfig::default(),
            pool: PoolConfig::default(),
            crop: CropConfig::default(),
        }
    }
}

impl AsdConfig {
    /// Load from a TOML file, overridable by `ASD_`-prefixed environment
    /// variables, same layering as the teacher's settings loader.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("ASD").separator("__"))
            .build()?;
        let cfg: AsdConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_length != 25 && self.video_length != 50 {
            return Err(ConfigError::Validation {
                field: "video_length".into(),
                reason: "must be 25 or 50".into(),
            });
        }
        if self.min_frames > self.video_length {
            return Err(ConfigError::Validation {
                field: "min_frames".into(),
                reason: "cannot exceed video_length".into(),
            });
        }
        if self.pool.num_video_buffers == 0 {
            return Err(ConfigError::Validation {
                field: "pool.num_video_buffers".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.pool.num_asd_models == 0 {
            return Err(ConfigError::Validation {
                field: "pool.num_asd_models".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        AsdConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_video_length() {
        let mut cfg = AsdConfig::default();
        cfg.video_length = 30;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asd.toml");
        std::fs::write(
            &path,
            "framerate = 25\nmin_frames = 10\nvideo_length = 50\n",
        )
        .unwrap();
        let cfg = AsdConfig::load_from(&path).unwrap();
        assert_eq!(cfg.framerate, 25);
        assert_eq!(cfg.min_frames, 10);
        assert_eq!(cfg.video_length, 50);
    }
}
