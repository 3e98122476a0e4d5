use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::node::archive::ArchiveMode;
use crate::node::error::{EncodeError, ScaleError};
use crate::node::pixel::scale::Interpolator;

/// Tuning of the partitioning process.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuadtreeConfig {
	/// Minimal similarity of base and upsampled image required to be a leaf.
	#[serde(rename = "SimilarityCutoff")]
	pub similarity_cutoff: f64,
	/// Interpolation algorithm used to downsample the base image.
	#[serde(rename = "DownsamplingInterpolator")]
	pub downsampling_interpolator: String,
	/// Interpolation algorithm used to upsample the downsampled image.
	#[serde(rename = "UpsamplingInterpolator")]
	pub upsampling_interpolator: String,
}

impl Default for QuadtreeConfig {
	fn default() -> QuadtreeConfig {
		QuadtreeConfig {
			similarity_cutoff: 0.95,
			downsampling_interpolator: "CatmullRom".to_owned(),
			upsampling_interpolator: "CatmullRom".to_owned(),
		}
	}
}

/// Should blocks that are not visible be skipped during encoding?
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SkipOutOfBoundsBlocksConfig {
	#[serde(rename = "Enable")]
	pub enable: bool,
}

/// Should similar blocks be deduplicated during encoding?
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DeduplicateBlocksConfig {
	#[serde(rename = "Enable")]
	pub enable: bool,
	/// How similar blocks have to be to be deduplicated.
	#[serde(rename = "MinimalSimilarity")]
	pub minimal_similarity: f64,
}

impl Default for DeduplicateBlocksConfig {
	fn default() -> DeduplicateBlocksConfig {
		DeduplicateBlocksConfig {
			enable: false,
			minimal_similarity: 0.95,
		}
	}
}

/// Tuning of the encoding process.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
	/// Underlying archive format of the encoded file (`gzip` or `zip`).
	#[serde(rename = "ArchiveFormat")]
	pub archive_format: String,
	#[serde(rename = "SkipOutOfBoundsBlocks")]
	pub skip_out_of_bounds_blocks: SkipOutOfBoundsBlocksConfig,
	#[serde(rename = "DeduplicateBlocks")]
	pub deduplicate_blocks: DeduplicateBlocksConfig,
	/// Partition child subtrees on parallel tasks?
	#[serde(rename = "Parallelism")]
	pub parallelism: bool,
}

impl Default for EncodingConfig {
	fn default() -> EncodingConfig {
		EncodingConfig {
			archive_format: "gzip".to_owned(),
			skip_out_of_bounds_blocks: SkipOutOfBoundsBlocksConfig::default(),
			deduplicate_blocks: DeduplicateBlocksConfig::default(),
			parallelism: false,
		}
	}
}

/// Tuning of the decoding process.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DecodingConfig {
	/// Decode archive entries on parallel tasks?
	#[serde(rename = "Parallelism")]
	pub parallelism: bool,
}

/// Should the analytics visualizations be created?
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
	#[serde(rename = "Enable")]
	pub enable: bool,
}

/// Parameters that influence the partitioning, encoding and decoding
/// of a quadtree image, loaded once per run.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	#[serde(rename = "Quadtree")]
	pub quadtree: QuadtreeConfig,
	#[serde(rename = "Encoding")]
	pub encoding: EncodingConfig,
	#[serde(rename = "Decoding")]
	pub decoding: DecodingConfig,
	#[serde(rename = "Visualization")]
	pub visualization: VisualizationConfig,
}

impl Config {
	/// Constructs a `Config` from a YAML file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let bytes = std::fs::read(path)?;
		Config::from_bytes(&bytes)
	}

	/// Constructs a `Config` from YAML bytes.
	pub fn from_bytes(bytes: &[u8]) -> Result<Config, ConfigError> {
		Ok(serde_yaml::from_slice(bytes)?)
	}

	/// Checks that every name-valued knob resolves to a known algorithm.
	pub fn validate(&self) -> Result<(), ConfigError> {
		Interpolator::from_name(&self.quadtree.downsampling_interpolator)?;
		Interpolator::from_name(&self.quadtree.upsampling_interpolator)?;
		ArchiveMode::from_name(&self.encoding.archive_format).map_err(|error| match error {
			EncodeError::UnknownArchiveFormat(name) => ConfigError::UnknownArchiveFormat(name),
			other => ConfigError::Invalid(other.to_string()),
		})?;
		Ok(())
	}
}

/// Reason why a configuration couldn't be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The configuration file could not be read.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// The configuration is not valid YAML.
	#[error(transparent)]
	Yaml(#[from] serde_yaml::Error),
	/// An interpolator name matches no known algorithm.
	#[error("interpolator name not found: {0:?}")]
	UnknownInterpolator(String),
	/// An archive format name matches no known container.
	#[error("no archive container found for format {0:?}")]
	UnknownArchiveFormat(String),
	/// Any other invalid setting.
	#[error("invalid configuration: {0}")]
	Invalid(String),
}

impl From<ScaleError> for ConfigError {
	fn from(error: ScaleError) -> ConfigError {
		match error {
			ScaleError::UnknownInterpolator(name) => ConfigError::UnknownInterpolator(name),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const FULL_CONFIG: &str = "
Quadtree:
  SimilarityCutoff: 0.8
  DownsamplingInterpolator: NearestNeighbor
  UpsamplingInterpolator: BiLinear
Encoding:
  ArchiveFormat: zip
  SkipOutOfBoundsBlocks:
    Enable: true
  DeduplicateBlocks:
    Enable: true
    MinimalSimilarity: 0.99
  Parallelism: true
Decoding:
  Parallelism: true
Visualization:
  Enable: false
";

	#[test]
	fn full_configs_parse() {
		let config = Config::from_bytes(FULL_CONFIG.as_bytes()).unwrap();
		assert_eq!(config.quadtree.similarity_cutoff, 0.8);
		assert_eq!(config.quadtree.downsampling_interpolator, "NearestNeighbor");
		assert_eq!(config.encoding.archive_format, "zip");
		assert!(config.encoding.skip_out_of_bounds_blocks.enable);
		assert!(config.encoding.deduplicate_blocks.enable);
		assert_eq!(config.encoding.deduplicate_blocks.minimal_similarity, 0.99);
		assert!(config.encoding.parallelism);
		assert!(config.decoding.parallelism);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn missing_sections_fall_back_to_defaults() {
		let config = Config::from_bytes(b"Quadtree:\n  SimilarityCutoff: 0.5\n").unwrap();
		assert_eq!(config.quadtree.similarity_cutoff, 0.5);
		assert_eq!(config.quadtree.downsampling_interpolator, "CatmullRom");
		assert_eq!(config.encoding.archive_format, "gzip");
		assert!(!config.encoding.parallelism);
	}

	#[test]
	fn malformed_yaml_is_rejected() {
		assert!(matches!(
			Config::from_bytes(b"Quadtree: ["),
			Err(ConfigError::Yaml(_))
		));
	}

	#[test]
	fn unknown_names_fail_validation() {
		let mut config = Config::default();
		config.quadtree.upsampling_interpolator = "Bicubic".to_owned();
		assert!(matches!(
			config.validate(),
			Err(ConfigError::UnknownInterpolator(name)) if name == "Bicubic"
		));

		let mut config = Config::default();
		config.encoding.archive_format = "rar".to_owned();
		assert!(matches!(
			config.validate(),
			Err(ConfigError::UnknownArchiveFormat(name)) if name == "rar"
		));
	}
}
