/*!
This module defines the `Config` struct, which optionally overrides training settings from a yaml file.
*/

use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
	pub test_fraction: Option<f32>,
	pub seed: Option<u64>,
	pub forest: Option<ForestConfig>,
	pub boosted: Option<BoostedConfig>,
	pub network: Option<NetworkConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ForestConfig {
	pub n_trees: Option<usize>,
	pub max_depth: Option<usize>,
	pub min_examples_split: Option<usize>,
	pub min_examples_leaf: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct BoostedConfig {
	pub n_rounds: Option<usize>,
	pub max_depth: Option<usize>,
	pub learning_rate: Option<f32>,
	pub row_subsample: Option<f32>,
	pub feature_subsample: Option<f32>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct NetworkConfig {
	pub max_epochs: Option<usize>,
	pub n_examples_per_batch: Option<usize>,
	pub learning_rate: Option<f32>,
	pub validation_fraction: Option<f32>,
	pub early_stopping_patience: Option<usize>,
}

pub fn load_config(config_path: Option<&Path>) -> Result<Option<Config>> {
	match config_path {
		Some(config_path) => {
			let config = std::fs::read(config_path)
				.with_context(|| format!("failed to read {}", config_path.display()))?;
			let config = serde_yaml::from_slice(&config)
				.with_context(|| format!("failed to parse {}", config_path.display()))?;
			Ok(Some(config))
		}
		None => Ok(None),
	}
}

#[test]
fn test_parse_config() {
	let yaml = "test_fraction: 0.25\nseed: 7\nboosted:\n  n_rounds: 50\n  learning_rate: 0.05\n";
	let config: Config = serde_yaml::from_str(yaml).unwrap();
	assert_eq!(config.test_fraction, Some(0.25));
	assert_eq!(config.seed, Some(7));
	let boosted = config.boosted.unwrap();
	assert_eq!(boosted.n_rounds, Some(50));
	assert_eq!(boosted.learning_rate, Some(0.05));
	assert!(config.forest.is_none());
}
