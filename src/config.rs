//! # Configuration
//!
//! Pipeline parameters, loadable from a TOML file with `VOLSTITCH_`-prefixed
//! environment overrides layered on top of the defaults.
//!
//! ```toml
//! cc_threshold = 0.4
//! size_threshold = 100
//! dilation_radius = 5
//! dist_threshold = 1000.0
//! voxel_res = [4.0, 4.0, 40.0]
//! chunk_shape = [1152, 1152, 128]
//! hashmax = 32
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Parameters for a consolidation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Score threshold for chunk labeling.
    pub cc_threshold: f32,
    /// Minimum voxel count a merged segment must reach to survive.
    pub size_threshold: u64,
    /// In-plane dilation radius for the labeling bridge; 0 disables it.
    pub dilation_radius: usize,
    /// Maximum physical distance between duplicate records, in the units of
    /// `voxel_res`.
    pub dist_threshold: f64,
    /// Physical extent of one voxel along each axis.
    pub voxel_res: [f64; 3],
    /// Chunk extent along each axis, in voxels.
    pub chunk_shape: [usize; 3],
    /// Number of hash shards for the parallel merge stages.
    pub hashmax: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cc_threshold: 0.5,
            size_threshold: 100,
            dilation_radius: 0,
            dist_threshold: 1000.0,
            voxel_res: [4.0, 4.0, 40.0],
            chunk_shape: [1152, 1152, 128],
            hashmax: 32,
        }
    }
}

impl PipelineConfig {
    /// Load with precedence: env vars > config file > defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(PipelineConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("VOLSTITCH_")).extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PipelineConfig::default();
        assert!(config.cc_threshold > 0.0);
        assert!(config.size_threshold > 0);
        assert!(config.hashmax > 0);
        assert!(config.chunk_shape.iter().all(|&w| w > 0));
    }

    #[test]
    fn load_without_file_matches_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
