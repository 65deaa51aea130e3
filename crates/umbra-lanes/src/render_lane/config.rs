// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Renderer configuration, stored on disk as RON.

use super::quality::QualityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use umbra_core::math::LinearRgba;

/// Default number of non-blocking polls spent waiting for timestamp results.
pub const DEFAULT_READBACK_POLL_BUDGET: u32 = 4;

/// Errors raised while loading or saving a [`RendererConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("Failed to access renderer config '{path}': {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The text is not a valid RON renderer config.
    #[error("Failed to parse renderer config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The config could not be serialized.
    #[error("Failed to serialize renderer config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Every setting the deferred lane reads at construction.
///
/// Missing fields take their default value, so a config file only needs the
/// settings it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Quality tiers and ambient occlusion parameters.
    pub quality: QualityConfig,
    /// Run ambient occlusion at full resolution.
    pub high_res_effects: bool,
    /// Enables GPU timestamp instrumentation when the device supports it.
    pub gpu_timestamps: bool,
    /// Non-blocking polls spent on the previous frame's timestamps before
    /// reporting them unavailable.
    pub readback_poll_budget: u32,
    /// Background color of the attribute channels.
    pub clear_color: LinearRgba,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            quality: QualityConfig::default(),
            high_res_effects: false,
            gpu_timestamps: true,
            readback_poll_budget: DEFAULT_READBACK_POLL_BUDGET,
            clear_color: LinearRgba::TRANSPARENT,
        }
    }
}

impl RendererConfig {
    /// Parses a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Serializes the config as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Loads a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?;
        log::info!("Loaded renderer config from '{}'", path.display());
        Ok(config)
    }

    /// Writes the config to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_ron_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::quality::{LightingQuality, PostEffectQuality};

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = RendererConfig::from_ron_str("(high_res_effects: true)").unwrap();
        assert!(config.high_res_effects);
        assert_eq!(config.quality, QualityConfig::default());
        assert_eq!(config.readback_poll_budget, DEFAULT_READBACK_POLL_BUDGET);
    }

    #[test]
    fn test_round_trip_through_ron() {
        let config = RendererConfig {
            quality: QualityConfig {
                lighting: LightingQuality::Ultra,
                post_effects: PostEffectQuality::Off,
                ao_sample_count: 32,
                ao_radius: 1.5,
                anti_aliasing: false,
            },
            gpu_timestamps: false,
            clear_color: LinearRgba::rgb(0.1, 0.2, 0.3),
            ..Default::default()
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(RendererConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_nested_quality_section() {
        let text = "(quality: (lighting: High, post_effects: Medium, ao_sample_count: 8))";
        let config = RendererConfig::from_ron_str(text).unwrap();
        assert_eq!(config.quality.lighting, LightingQuality::High);
        assert_eq!(config.quality.ao_sample_count, 8);
        assert!(config.quality.anti_aliasing);
    }

    #[test]
    fn test_malformed_text_is_a_parse_error() {
        assert!(matches!(
            RendererConfig::from_ron_str("(quality: 12"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = RendererConfig::load("/definitely/not/here/umbra.ron");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
