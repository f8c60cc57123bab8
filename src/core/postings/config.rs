use std::path::Path;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::common::errors::PostingsError;
use crate::common::file_ops::{atomic_save_json, read_json};
use crate::core::compress::CompressorKind;

pub const DEFAULT_MAX_BLOCK_SIZE: usize = 32;
pub const DEFAULT_BLOCK_SKIP_INTERVAL: usize = 2;
pub const DEFAULT_MAX_SKIP_LEVELS: usize = 10;

pub const POSTINGS_CONFIG_FILE: &str = "postings_config.json";

/// Codec parameters, persisted next to the stream files so a reader decodes
/// with exactly the parameters the writer used.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy, TypedBuilder)]
#[serde(rename_all = "snake_case")]
pub struct PostingsConfig {
    /// Documents per doc block.
    #[serde(default = "default_max_block_size")]
    #[builder(default = DEFAULT_MAX_BLOCK_SIZE)]
    pub max_block_size: usize,

    /// Flushed doc blocks between two level-0 skip entries.
    #[serde(default = "default_block_skip_interval")]
    #[builder(default = DEFAULT_BLOCK_SKIP_INTERVAL)]
    pub block_skip_interval: usize,

    /// Terms with fewer doc blocks than this carry no skip data.
    #[serde(default = "default_block_skip_interval")]
    #[builder(default = DEFAULT_BLOCK_SKIP_INTERVAL)]
    pub block_skip_minimum: usize,

    #[serde(default = "default_max_skip_levels")]
    #[builder(default = DEFAULT_MAX_SKIP_LEVELS)]
    pub max_skip_levels: usize,

    #[serde(default)]
    #[builder(default)]
    pub compressor: CompressorKind,
}

fn default_max_block_size() -> usize {
    DEFAULT_MAX_BLOCK_SIZE
}

fn default_block_skip_interval() -> usize {
    DEFAULT_BLOCK_SKIP_INTERVAL
}

fn default_max_skip_levels() -> usize {
    DEFAULT_MAX_SKIP_LEVELS
}

impl Default for PostingsConfig {
    fn default() -> PostingsConfig {
        PostingsConfig::builder().build()
    }
}

impl PostingsConfig {
    pub fn validate(&self) -> Result<(), PostingsError> {
        if self.max_block_size == 0 {
            return Err(PostingsError::InvalidConfig(
                "max_block_size must be at least 1".to_string(),
            ));
        }
        if self.block_skip_interval < 2 {
            return Err(PostingsError::InvalidConfig(
                "block_skip_interval must be at least 2".to_string(),
            ));
        }
        if self.block_skip_minimum < self.block_skip_interval {
            // skip data presence is keyed on the minimum, and a term below
            // the interval never buffers an entry
            return Err(PostingsError::InvalidConfig(
                "block_skip_minimum must not be below block_skip_interval".to_string(),
            ));
        }
        if self.max_skip_levels == 0 || self.max_skip_levels > 30 {
            return Err(PostingsError::InvalidConfig(
                "max_skip_levels must be between 1 and 30".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, dir: &Path) -> Result<(), PostingsError> {
        atomic_save_json(&dir.join(POSTINGS_CONFIG_FILE), self)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<PostingsConfig, PostingsError> {
        let config: PostingsConfig = read_json(&dir.join(POSTINGS_CONFIG_FILE))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PostingsConfig::default();
        assert_eq!(config.max_block_size, 32);
        assert_eq!(config.block_skip_interval, 2);
        assert_eq!(config.block_skip_minimum, 2);
        assert_eq!(config.max_skip_levels, 10);
        assert_eq!(config.compressor, CompressorKind::AFor);
        config.validate().unwrap();
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let config = PostingsConfig::builder()
            .max_block_size(64)
            .compressor(CompressorKind::VInt)
            .build();
        config.save(dir.path()).unwrap();
        let loaded = PostingsConfig::load(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let zero_block = PostingsConfig::builder().max_block_size(0).build();
        assert!(matches!(
            zero_block.validate(),
            Err(PostingsError::InvalidConfig(_))
        ));

        let low_minimum = PostingsConfig::builder()
            .block_skip_interval(4)
            .block_skip_minimum(2)
            .build();
        assert!(low_minimum.validate().is_err());

        let no_levels = PostingsConfig::builder().max_skip_levels(0).build();
        assert!(no_levels.validate().is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: PostingsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PostingsConfig::default());
        let config: PostingsConfig =
            serde_json::from_str(r#"{"compressor": "vint"}"#).unwrap();
        assert_eq!(config.compressor, CompressorKind::VInt);
        assert_eq!(config.max_block_size, 32);
    }
}
