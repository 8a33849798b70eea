/*!
This module persists and loads the trained bundle. Every artifact lives under one directory with a fixed file name and is written as a single format version byte followed by the messagepack encoding of an envelope carrying the train run id and the artifact's state. All artifacts written by one training run share the same run id, and the loader refuses bundles whose ids disagree.
*/

use crate::id::Id;
use anyhow::{format_err, Context, Result};
use std::{
	io::{Read, Write},
	path::Path,
};
use thiserror::Error;

/// Bump this when the serialized layout of any artifact changes.
pub const FORMAT_VERSION: u8 = 0;

pub const IMPUTER_FILE_NAME: &str = "imputer.waterline";
pub const SCALER_FILE_NAME: &str = "scaler.waterline";
pub const LABEL_ENCODER_FILE_NAME: &str = "label_encoder.waterline";
pub const FEATURE_NAMES_FILE_NAME: &str = "feature_names.waterline";

/// The three model families. Each one trains a classifier and a regressor over the same prepared features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
	Forest,
	Boosted,
	Network,
}

impl ModelFamily {
	pub const ALL: [ModelFamily; 3] = [ModelFamily::Forest, ModelFamily::Boosted, ModelFamily::Network];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Forest => "forest",
			Self::Boosted => "boosted",
			Self::Network => "network",
		}
	}
}

impl std::fmt::Display for ModelFamily {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("unknown model family \"{input}\", expected \"forest\", \"boosted\", or \"network\"")]
pub struct ParseModelFamilyError {
	pub input: String,
}

impl std::str::FromStr for ModelFamily {
	type Err = ParseModelFamilyError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"forest" => Ok(Self::Forest),
			"boosted" => Ok(Self::Boosted),
			"network" => Ok(Self::Network),
			_ => Err(ParseModelFamilyError {
				input: s.to_owned(),
			}),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
	Classifier,
	Regressor,
}

impl TaskKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Classifier => "classifier",
			Self::Regressor => "regressor",
		}
	}
}

pub fn model_file_name(family: ModelFamily, task: TaskKind) -> &'static str {
	match (family, task) {
		(ModelFamily::Forest, TaskKind::Classifier) => "forest_classifier.waterline",
		(ModelFamily::Forest, TaskKind::Regressor) => "forest_regressor.waterline",
		(ModelFamily::Boosted, TaskKind::Classifier) => "boosted_classifier.waterline",
		(ModelFamily::Boosted, TaskKind::Regressor) => "boosted_regressor.waterline",
		(ModelFamily::Network, TaskKind::Classifier) => "network_classifier.waterline",
		(ModelFamily::Network, TaskKind::Regressor) => "network_regressor.waterline",
	}
}

/// The envelope every artifact is wrapped in before encoding.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Artifact<T> {
	pub train_run_id: Id,
	pub value: T,
}

/// Write one artifact under `dir`, creating the directory if needed.
pub fn write_artifact<T>(dir: &Path, file_name: &str, train_run_id: Id, value: &T) -> Result<()>
where
	T: serde::Serialize,
{
	std::fs::create_dir_all(dir)
		.with_context(|| format!("failed to create directory {}", dir.display()))?;
	let path = dir.join(file_name);
	let file = std::fs::File::create(&path)
		.with_context(|| format!("failed to create {}", path.display()))?;
	let mut writer = std::io::BufWriter::new(file);
	writer.write_all(&[FORMAT_VERSION])?;
	rmp_serde::encode::write_named(
		&mut writer,
		&Artifact {
			train_run_id,
			value,
		},
	)?;
	Ok(())
}

/// Read one artifact, verifying the format version byte.
pub fn read_artifact<T>(dir: &Path, file_name: &str) -> Result<Artifact<T>>
where
	T: serde::de::DeserializeOwned,
{
	let path = dir.join(file_name);
	let file = std::fs::File::open(&path)
		.with_context(|| format!("failed to open {}", path.display()))?;
	let mut reader = std::io::BufReader::new(file);
	let mut format_version = [0u8; 1];
	reader.read_exact(&mut format_version)?;
	if format_version[0] != FORMAT_VERSION {
		return Err(format_err!(
			"{} has unknown format version {}",
			path.display(),
			format_version[0]
		));
	}
	let artifact = rmp_serde::from_read(&mut reader)
		.with_context(|| format!("failed to decode {}", path.display()))?;
	Ok(artifact)
}

#[cfg(test)]
mod test {
	use super::*;
	use ndarray::prelude::*;
	use waterline_features::{LabelEncoder, MedianImputer, StandardScaler};
	use waterline_tree::{ForestRegressor, ForestTrainOptions};

	fn test_dir(name: &str) -> std::path::PathBuf {
		let dir = std::env::temp_dir().join(format!("waterline_model_test_{}_{}", name, std::process::id()));
		let _ = std::fs::remove_dir_all(&dir);
		dir
	}

	#[test]
	fn test_artifact_round_trip_is_bit_identical() {
		let dir = test_dir("round_trip");
		let features = Array2::from_shape_fn((30, 3), |(i, j)| (i * 3 + j) as f32 / 10.0);
		let labels: Array1<f32> = features.column(0).mapv(|x| x * 2.0 + 0.5);
		let options = ForestTrainOptions {
			n_trees: 10,
			max_depth: 4,
			min_examples_split: 2,
			min_examples_leaf: 1,
			seed: 42,
		};
		let model = ForestRegressor::train(features.view(), labels.view(), &options);
		let imputer = MedianImputer::fit(features.view()).unwrap();
		let scaler = StandardScaler::fit(features.view());
		let encoder = LabelEncoder::fit(&["a".to_owned(), "b".to_owned()]);
		let train_run_id = Id::new();
		write_artifact(&dir, "model.waterline", train_run_id, &model).unwrap();
		write_artifact(&dir, IMPUTER_FILE_NAME, train_run_id, &imputer).unwrap();
		write_artifact(&dir, SCALER_FILE_NAME, train_run_id, &scaler).unwrap();
		write_artifact(&dir, LABEL_ENCODER_FILE_NAME, train_run_id, &encoder).unwrap();
		let loaded_model: Artifact<ForestRegressor> = read_artifact(&dir, "model.waterline").unwrap();
		let loaded_imputer: Artifact<MedianImputer> = read_artifact(&dir, IMPUTER_FILE_NAME).unwrap();
		let loaded_scaler: Artifact<StandardScaler> = read_artifact(&dir, SCALER_FILE_NAME).unwrap();
		let loaded_encoder: Artifact<LabelEncoder> =
			read_artifact(&dir, LABEL_ENCODER_FILE_NAME).unwrap();
		assert_eq!(loaded_model.train_run_id, train_run_id);
		assert_eq!(loaded_imputer.value, imputer);
		assert_eq!(loaded_scaler.value, scaler);
		assert_eq!(loaded_encoder.value, encoder);
		// Reloaded models must predict bit for bit what the originals predict.
		let mut predictions = Array1::zeros(30);
		let mut loaded_predictions = Array1::zeros(30);
		model.predict(features.view(), predictions.view_mut());
		loaded_model
			.value
			.predict(features.view(), loaded_predictions.view_mut());
		assert_eq!(predictions, loaded_predictions);
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn test_unknown_format_version_is_rejected() {
		let dir = test_dir("format_version");
		std::fs::create_dir_all(&dir).unwrap();
		std::fs::write(dir.join("bad.waterline"), [9u8, 0, 0]).unwrap();
		let result: Result<Artifact<Vec<String>>> = read_artifact(&dir, "bad.waterline");
		assert!(result.is_err());
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn test_parse_model_family() {
		assert_eq!("forest".parse::<ModelFamily>().unwrap(), ModelFamily::Forest);
		assert_eq!("boosted".parse::<ModelFamily>().unwrap(), ModelFamily::Boosted);
		assert_eq!("network".parse::<ModelFamily>().unwrap(), ModelFamily::Network);
		let error = "xgb".parse::<ModelFamily>().unwrap_err();
		assert!(error.to_string().contains("forest"));
	}
}
