//! Tuning configuration, loaded from `audioflow.toml` when present.

use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::constants::{
    DEFAULT_CACHE_BYTES, DEFAULT_FRAME_BYTES, DEFAULT_MAX_ITEMS, DEFAULT_SEGMENT_ALIGN,
    DEFAULT_SEGMENT_BYTES, DEFAULT_SEGMENT_COUNT,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Segment topology for a [`crate::stream::Stream`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,
    #[serde(default = "default_segment_bytes")]
    pub segment_bytes: usize,
    #[serde(default = "default_segment_align")]
    pub align: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            segment_count: default_segment_count(),
            segment_bytes: default_segment_bytes(),
            align: default_segment_align(),
        }
    }
}

/// Pool budgets for a [`crate::cache::SampleCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_bytes")]
    pub byte_budget: usize,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_frame_bytes")]
    pub frame_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            byte_budget: default_cache_bytes(),
            max_items: default_max_items(),
            frame_bytes: default_frame_bytes(),
        }
    }
}

fn default_segment_count() -> usize {
    DEFAULT_SEGMENT_COUNT
}

fn default_segment_bytes() -> usize {
    DEFAULT_SEGMENT_BYTES
}

fn default_segment_align() -> usize {
    DEFAULT_SEGMENT_ALIGN
}

fn default_cache_bytes() -> usize {
    DEFAULT_CACHE_BYTES
}

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

fn default_frame_bytes() -> usize {
    DEFAULT_FRAME_BYTES
}

impl Config {
    /// Read `audioflow.toml` from the working directory, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> AnyResult<Self> {
        let config_path = "audioflow.toml";
        if std::path::Path::new(config_path).exists() {
            let raw = std::fs::read_to_string(config_path)?;
            Ok(toml::from_str(&raw)?)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.stream.segment_count, DEFAULT_SEGMENT_COUNT);
        assert_eq!(config.cache.frame_bytes, DEFAULT_FRAME_BYTES);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[stream]\nsegment_count = 8\n").unwrap();
        assert_eq!(config.stream.segment_count, 8);
        assert_eq!(config.stream.segment_bytes, DEFAULT_SEGMENT_BYTES);
        assert_eq!(config.cache.max_items, DEFAULT_MAX_ITEMS);
    }
}
